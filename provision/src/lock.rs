use crate::error::InstallError;
use fs2::FileExt;
use std::{
	fs::{File, OpenOptions},
	io::{self, Seek, Write},
	path::Path,
	process,
};

/// Exclusive advisory lock on the run lock file. The kernel releases it when
/// the holder exits, however it exits.
#[derive(Debug)]
pub struct RunLock {
	_file: File,
}

impl RunLock {
	pub fn acquire(path: &Path) -> Result<RunLock, InstallError> {
		let mut file = OpenOptions::new()
			.create(true)
			.write(true)
			.truncate(false)
			.open(path)
			.map_err(|err| match err.kind() {
				io::ErrorKind::PermissionDenied => {
					InstallError::Privilege(format!("cannot open lock file {}", path.display()))
				}
				_ => InstallError::Io(err),
			})?;
		file.try_lock_exclusive().map_err(|err| match err.kind() {
			io::ErrorKind::WouldBlock => InstallError::Config(format!(
				"another provisioning run holds {}",
				path.display()
			)),
			_ => InstallError::Io(err),
		})?;
		file.set_len(0)?;
		file.rewind()?;
		writeln!(file, "{}", process::id())?;
		Ok(RunLock { _file: file })
	}
}
