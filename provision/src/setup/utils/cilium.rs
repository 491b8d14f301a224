use crate::error::InstallError;
use crate::setup::host::CniCli;
use crate::setup::utils::kubeadm::Kubeadm;
use std::process::{Command, Output, Stdio};

/// Drives the cilium CLI installed at `/usr/local/bin/cilium`.
pub struct CiliumCli;

impl CiliumCli {
	const BINARY: &str = "/usr/local/bin/cilium";

	fn command() -> Command {
		let mut command = Command::new(CiliumCli::BINARY);
		command.env("KUBECONFIG", Kubeadm::KUBECONFIG);
		command
	}

	fn run(args: &[String]) -> Result<Output, InstallError> {
		let full_cmd = format!("cilium {}", args.join(" "));
		let output = CiliumCli::command()
			.args(args)
			.output()
			.map_err(|source| InstallError::CommandLaunch {
				cmd: full_cmd.clone(),
				source,
			})?;
		if !output.status.success() {
			let stderr = String::from_utf8_lossy(&output.stderr).trim().to_owned();
			return Err(InstallError::CommandFailed {
				cmd: full_cmd,
				status: output.status,
				stderr: Some(stderr).filter(|stderr| !stderr.is_empty()),
			});
		}
		Ok(output)
	}

	pub fn install_args(version: &str, pod_cidr: &str) -> Vec<String> {
		let pod_pool = format!("ipam.operator.clusterPoolIPv4PodCIDRList={{{pod_cidr}}}");
		[
			"install",
			"--version",
			version,
			"--set",
			"ipam.mode=cluster-pool",
			"--set",
			&pod_pool,
			"--set",
			"hubble.enabled=true",
			"--set",
			"hubble.relay.enabled=true",
		]
		.iter()
		.map(|arg| (*arg).to_owned())
		.collect()
	}

	/// Version from the `cilium image (running): v1.18.4` line of `cilium version`.
	pub fn parse_running_version(output: &str) -> Option<String> {
		output
			.lines()
			.find_map(|line| line.trim().strip_prefix("cilium image (running):"))
			.map(|version| version.trim().trim_start_matches('v').to_owned())
			.filter(|version| version.starts_with(|c: char| c.is_ascii_digit()))
	}
}

impl CniCli for CiliumCli {
	fn running_version(&self) -> Result<Option<String>, InstallError> {
		let output = CiliumCli::run(&["version".to_owned()])?;
		Ok(CiliumCli::parse_running_version(&String::from_utf8(
			output.stdout,
		)?))
	}

	fn install(&self, version: &str, pod_cidr: &str) -> Result<(), InstallError> {
		CiliumCli::run(&CiliumCli::install_args(version, pod_cidr)).map(drop)
	}

	fn is_ready(&self) -> bool {
		CiliumCli::command()
			.arg("status")
			.stdout(Stdio::null())
			.stderr(Stdio::null())
			.status()
			.is_ok_and(|status| status.success())
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn parses_running_version() {
		let output = "cilium-cli: v0.18.9 compiled with go1.24.5 on linux/amd64\n\
			cilium image (default): v1.18.4\n\
			cilium image (stable): v1.18.4\n\
			cilium image (running): v1.17.2\n";
		assert_eq!(
			CiliumCli::parse_running_version(output).as_deref(),
			Some("1.17.2")
		);
	}

	#[test]
	fn missing_running_image_means_not_installed() {
		let output = "cilium-cli: v0.18.9\ncilium image (running): unknown. Unable to obtain cilium version. Reason: release: not found\n";
		assert_eq!(CiliumCli::parse_running_version(output), None);
	}

	#[test]
	fn install_enables_hubble_and_sets_pool() {
		let args = CiliumCli::install_args("1.18.4", "10.0.0.0/16");
		assert_eq!(&args[..3], ["install", "--version", "1.18.4"]);
		assert!(args.contains(&"ipam.operator.clusterPoolIPv4PodCIDRList={10.0.0.0/16}".to_owned()));
		assert!(args.contains(&"hubble.enabled=true".to_owned()));
		assert!(args.contains(&"hubble.relay.enabled=true".to_owned()));
	}
}
