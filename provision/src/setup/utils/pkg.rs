use crate::error::InstallError;
use crate::setup::host::{PackageManager, PackageSource};
use crate::setup::utils::exec;
use std::fs;

/// Debian package management through dpkg-query, apt-get and apt-mark.
pub struct Apt;

impl Apt {
	const APT_GET_ARGS: [&str; 3] = ["-y", "-q", "-o=Dpkg::Options::=--force-confold"];

	/// A dpkg-query field of a package, `None` when dpkg has never seen it.
	fn dpkg_field(package_name: &str, field: &str) -> Result<Option<String>, InstallError> {
		let format = format!("-f=${{{field}}}");
		let output = exec::raw_output("dpkg-query", &["-W", &format, package_name])?;
		if !output.status.success() {
			return Ok(None);
		}
		let value = String::from_utf8(output.stdout)?.trim().to_owned();
		Ok(Some(value).filter(|value| !value.is_empty()))
	}

	pub fn status_is_installed(status: &str) -> bool {
		status.ends_with(" ok installed")
	}

	pub fn status_is_held(status: &str) -> bool {
		status.starts_with("hold ") && Apt::status_is_installed(status)
	}

	fn apt_get(command: &str, package_names: &[&str]) -> Result<(), InstallError> {
		let args = Apt::APT_GET_ARGS
			.iter()
			.copied()
			.chain(std::iter::once(command))
			.chain(package_names.iter().copied())
			.collect::<Vec<_>>();
		exec::status("apt-get", &args)
	}

	fn key_script(source: &PackageSource) -> String {
		format!(
			"curl -fsSL '{}' | gpg --dearmor --yes -o '{}'",
			source.key_url,
			source.keyring_path.display()
		)
	}
}

impl PackageManager for Apt {
	fn update(&self) -> Result<(), InstallError> {
		Apt::apt_get("update", &[])
			.map_err(|err| InstallError::network("apt-get update", err.to_string()))
	}

	fn upgrade(&self) -> Result<(), InstallError> {
		Apt::apt_get("upgrade", &[])
	}

	fn install(&self, package_names: &[&str]) -> Result<(), InstallError> {
		let mut args = vec!["--no-install-recommends"];
		args.extend_from_slice(package_names);
		Apt::apt_get("install", &args)
	}

	fn hold(&self, package_names: &[&str]) -> Result<(), InstallError> {
		let mut args = vec!["hold"];
		args.extend_from_slice(package_names);
		exec::output("apt-mark", &args).map(drop)
	}

	fn is_installed(&self, package_name: &str) -> Result<bool, InstallError> {
		Ok(Apt::dpkg_field(package_name, "Status")?
			.is_some_and(|status| Apt::status_is_installed(&status)))
	}

	fn is_held(&self, package_name: &str) -> Result<bool, InstallError> {
		Ok(Apt::dpkg_field(package_name, "Status")?
			.is_some_and(|status| Apt::status_is_held(&status)))
	}

	fn installed_version(&self, package_name: &str) -> Result<Option<String>, InstallError> {
		if !self.is_installed(package_name)? {
			return Ok(None);
		}
		Apt::dpkg_field(package_name, "Version")
	}

	fn add_source(&self, source: &PackageSource) -> Result<(), InstallError> {
		if let Some(keyring_dir) = source.keyring_path.parent() {
			fs::create_dir_all(keyring_dir)?;
		}
		exec::script("fetch repository signing key", &Apt::key_script(source))
			.map_err(|err| {
				InstallError::network(format!("key fetch from {}", source.key_url), err.to_string())
			})?;
		fs::write(&source.list_path, &source.entry)?;
		Ok(())
	}
}
