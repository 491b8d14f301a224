use crate::error::InstallError;
use std::{
	io::Write,
	process::{Command, Output, Stdio},
};

fn command_line(program: &str, args: &[&str]) -> String {
	std::iter::once(program)
		.chain(args.iter().copied())
		.collect::<Vec<_>>()
		.join(" ")
}

fn stderr_of(output: &Output) -> Option<String> {
	if output.stderr.is_empty() {
		None
	} else {
		Some(String::from_utf8_lossy(&output.stderr).trim().to_owned())
	}
}

/// Runs a command with inherited stdio and fails on a non-zero exit.
pub fn status(program: &str, args: &[&str]) -> Result<(), InstallError> {
	let full_cmd = command_line(program, args);
	let status = Command::new(program)
		.args(args)
		.status()
		.map_err(|source| InstallError::CommandLaunch {
			cmd: full_cmd.clone(),
			source,
		})?;
	if !status.success() {
		return Err(InstallError::CommandFailed {
			cmd: full_cmd,
			status,
			stderr: None,
		});
	}
	Ok(())
}

/// Runs a command capturing its output and fails on a non-zero exit.
pub fn output(program: &str, args: &[&str]) -> Result<Output, InstallError> {
	let full_cmd = command_line(program, args);
	let output = raw_output(program, args)?;
	if !output.status.success() {
		return Err(InstallError::CommandFailed {
			cmd: full_cmd,
			status: output.status,
			stderr: stderr_of(&output),
		});
	}
	Ok(output)
}

/// Captured stdout of a successful command, trimmed.
pub fn stdout(program: &str, args: &[&str]) -> Result<String, InstallError> {
	let output = output(program, args)?;
	Ok(String::from_utf8(output.stdout)?.trim().to_owned())
}

/// Runs a command capturing its output without judging the exit status.
pub fn raw_output(program: &str, args: &[&str]) -> Result<Output, InstallError> {
	Command::new(program)
		.args(args)
		.output()
		.map_err(|source| InstallError::CommandLaunch {
			cmd: command_line(program, args),
			source,
		})
}

/// Whether a command exits zero, with all output discarded.
pub fn succeeds(program: &str, args: &[&str]) -> bool {
	Command::new(program)
		.args(args)
		.stdout(Stdio::null())
		.stderr(Stdio::null())
		.status()
		.is_ok_and(|status| status.success())
}

/// Runs a bash script with pipefail, feeding it through stdin.
pub fn script(description: &str, body: &str) -> Result<(), InstallError> {
	let mut child = Command::new("bash")
		.args(["-euo", "pipefail", "-s"])
		.stdin(Stdio::piped())
		.stdout(Stdio::piped())
		.stderr(Stdio::piped())
		.spawn()
		.map_err(|source| InstallError::CommandLaunch {
			cmd: description.to_owned(),
			source,
		})?;
	if let Some(mut stdin) = child.stdin.take() {
		stdin.write_all(body.as_bytes())?;
	}
	let output = child
		.wait_with_output()
		.map_err(|source| InstallError::CommandLaunch {
			cmd: description.to_owned(),
			source,
		})?;
	if !output.status.success() {
		return Err(InstallError::CommandFailed {
			cmd: description.to_owned(),
			status: output.status,
			stderr: stderr_of(&output),
		});
	}
	Ok(())
}
