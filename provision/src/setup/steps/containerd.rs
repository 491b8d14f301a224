use crate::context::ProvisioningContext;
use crate::error::InstallError;
use crate::setup::host::Host;
use crate::setup::report::Applied;
use crate::setup::SetupStep;
use std::path::Path;
use tracing::info;

pub struct ContainerRuntime;

impl ContainerRuntime {
	pub const PACKAGE_NAME: &str = "containerd";
	pub const CONFIG_DIR: &str = "/etc/containerd";
	pub const CONFIG_PATH: &str = "/etc/containerd/config.toml";
	pub const CGROUP_FIELD: &str = "SystemdCgroup";

	fn cgroup_value(line: &str) -> Option<&str> {
		let (key, value) = line.split_once('=')?;
		(key.trim() == ContainerRuntime::CGROUP_FIELD).then(|| value.trim())
	}

	pub fn uses_systemd_cgroup(config: &str) -> bool {
		config
			.lines()
			.filter_map(ContainerRuntime::cgroup_value)
			.any(|value| value == "true")
	}

	/// Sets the runc cgroup driver flag, leaving every other byte alone.
	pub fn with_systemd_cgroup(config: &str) -> Result<String, InstallError> {
		let mut found = false;
		let mut toggled = config
			.lines()
			.map(|line| match ContainerRuntime::cgroup_value(line) {
				Some(_) => {
					found = true;
					let indent = &line[..line.len() - line.trim_start().len()];
					format!("{indent}{} = true", ContainerRuntime::CGROUP_FIELD)
				}
				None => line.to_owned(),
			})
			.collect::<Vec<_>>()
			.join("\n");
		if !found {
			return Err(InstallError::Environment(format!(
				"{} has no {} field",
				ContainerRuntime::CONFIG_PATH,
				ContainerRuntime::CGROUP_FIELD
			)));
		}
		if config.ends_with('\n') {
			toggled.push('\n');
		}
		Ok(toggled)
	}
}

impl SetupStep for ContainerRuntime {
	fn name(&self) -> &'static str {
		"ContainerRuntime"
	}

	fn description(&self) -> &'static str {
		"install containerd with the systemd cgroup driver"
	}

	fn check(&self, _ctx: &ProvisioningContext, host: &Host) -> Result<bool, InstallError> {
		let is_installed = host.pkg.is_installed(ContainerRuntime::PACKAGE_NAME)?;
		if !is_installed {
			info!("Containerd is not installed.");
			return Ok(false);
		}
		let config = host
			.system
			.read_file(Path::new(ContainerRuntime::CONFIG_PATH))?
			.unwrap_or_default();
		if !ContainerRuntime::uses_systemd_cgroup(&config) {
			info!("Containerd is not configured for the systemd cgroup driver.");
			return Ok(false);
		}
		if !host.services.is_active(ContainerRuntime::PACKAGE_NAME) {
			info!("Containerd is not active.");
			return Ok(false);
		}
		if !host.services.is_enabled(ContainerRuntime::PACKAGE_NAME) {
			info!("Containerd is not enabled.");
			return Ok(false);
		}
		info!("Containerd is installed, configured and running.");
		Ok(true)
	}

	fn set(&self, _ctx: &ProvisioningContext, host: &Host) -> Result<Applied, InstallError> {
		if !host.pkg.is_installed(ContainerRuntime::PACKAGE_NAME)? {
			info!("Installing containerd.");
			host.pkg.update()?;
			host.pkg.upgrade()?;
			host.pkg.install(&[ContainerRuntime::PACKAGE_NAME])?;
		}
		host.system
			.create_dir_all(Path::new(ContainerRuntime::CONFIG_DIR))?;
		let config_path = Path::new(ContainerRuntime::CONFIG_PATH);
		let config = match host.system.read_file(config_path)? {
			Some(config) if !config.trim().is_empty() => {
				info!("Containerd config already exists, skipping generation.");
				config
			}
			_ => {
				info!("Generating default containerd config.");
				host.system
					.command_output(ContainerRuntime::PACKAGE_NAME, &["config", "default"])?
			}
		};
		let toggled = ContainerRuntime::with_systemd_cgroup(&config)?;
		if toggled != config {
			info!("Switching containerd to the systemd cgroup driver.");
			host.system.write_file(config_path, toggled.as_bytes())?;
		}
		info!("Restarting containerd service.");
		host.services.restart(ContainerRuntime::PACKAGE_NAME)?;
		host.services.enable(ContainerRuntime::PACKAGE_NAME)?;
		Ok(Applied::Done)
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::config::Config;
	use crate::error::ErrorClass;
	use crate::setup::utils::fake::FakeHost;

	const RUNC_OPTIONS: &str = "\
[plugins.'io.containerd.cri.v1.runtime'.containerd.runtimes.runc.options]
  BinaryName = ''
  SystemdCgroup = false
";

	#[test]
	fn toggles_only_the_cgroup_field() {
		let toggled = ContainerRuntime::with_systemd_cgroup(RUNC_OPTIONS).unwrap();
		assert_eq!(toggled, RUNC_OPTIONS.replace("SystemdCgroup = false", "SystemdCgroup = true"));
		assert!(ContainerRuntime::uses_systemd_cgroup(&toggled));
		assert!(!ContainerRuntime::uses_systemd_cgroup(RUNC_OPTIONS));
	}

	#[test]
	fn config_without_field_is_an_environment_error() {
		let err = ContainerRuntime::with_systemd_cgroup("version = 3\n").unwrap_err();
		assert_eq!(err.class(), ErrorClass::Environment);
	}

	#[test]
	fn set_installs_configures_and_starts() {
		let fake = FakeHost::new();
		let host = fake.host();
		let ctx = ProvisioningContext::new(&Config::default());
		assert!(!ContainerRuntime.check(&ctx, &host).unwrap());
		ContainerRuntime.set(&ctx, &host).unwrap();
		assert!(ContainerRuntime.check(&ctx, &host).unwrap());
		let config = fake.file(ContainerRuntime::CONFIG_PATH).unwrap();
		assert!(config.contains("SystemdCgroup = true"));
	}

	#[test]
	fn existing_config_is_not_regenerated() {
		let fake = FakeHost::new();
		fake.put_file(
			ContainerRuntime::CONFIG_PATH,
			"# operator tuned\n[x]\n  SystemdCgroup = false\n",
		);
		let ctx = ProvisioningContext::new(&Config::default());
		ContainerRuntime.set(&ctx, &fake.host()).unwrap();
		assert_eq!(
			fake.file(ContainerRuntime::CONFIG_PATH).as_deref(),
			Some("# operator tuned\n[x]\n  SystemdCgroup = true\n")
		);
	}

	#[test]
	fn restart_failure_is_fatal() {
		let fake = FakeHost::new();
		fake.state().failing_restarts.insert("containerd".into());
		let ctx = ProvisioningContext::new(&Config::default());
		let err = ContainerRuntime.set(&ctx, &fake.host()).unwrap_err();
		assert_eq!(err.class(), ErrorClass::Fatal);
	}
}
