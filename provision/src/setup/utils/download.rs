use crate::error::InstallError;
use crate::setup::host::Downloader;
use crate::setup::utils::exec;

/// HTTPS downloads through curl.
pub struct Curl;

impl Curl {
	/// curl exit codes for DNS, connect, timeout, TLS handshake and mid-transfer failures.
	const TRANSIENT_EXIT_CODES: [i32; 8] = [5, 6, 7, 18, 28, 35, 52, 56];

	pub fn is_transient(exit_code: Option<i32>) -> bool {
		exit_code.is_some_and(|code| Curl::TRANSIENT_EXIT_CODES.contains(&code))
	}
}

impl Downloader for Curl {
	fn fetch(&self, url: &str) -> Result<Vec<u8>, InstallError> {
		let output = exec::raw_output(
			"curl",
			&["-fsSL", "--location", "--connect-timeout", "30", url],
		)?;
		if output.status.success() {
			return Ok(output.stdout);
		}
		let stderr = String::from_utf8_lossy(&output.stderr).trim().to_owned();
		if Curl::is_transient(output.status.code()) {
			return Err(InstallError::network(format!("download of {url}"), stderr));
		}
		Err(InstallError::CommandFailed {
			cmd: format!("curl {url}"),
			status: output.status,
			stderr: Some(stderr).filter(|stderr| !stderr.is_empty()),
		})
	}
}
