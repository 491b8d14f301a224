use crate::context::ProvisioningContext;
use crate::error::InstallError;
use crate::setup::host::Host;
use crate::setup::report::Applied;
use crate::setup::SetupStep;
use std::path::{Path, PathBuf};
use tracing::info;

pub struct Sysctl;

#[derive(Debug, Clone)]
pub struct SysctlSetting<'a> {
	key: &'a str,
	value: &'a str,
	config_path: &'a str,
}

impl SysctlSetting<'_> {
	fn config_txt(&self) -> String {
		format!("{} = {}\n", self.key, self.value)
	}

	fn proc_path(&self) -> PathBuf {
		Path::new("/proc/sys").join(self.key.replace('.', "/"))
	}
}

impl Sysctl {
	pub const SETTINGS: &[SysctlSetting<'static>] = &[
		SysctlSetting {
			key: "net.bridge.bridge-nf-call-iptables",
			value: "1",
			config_path: "/etc/sysctl.d/k8s-bridge.conf",
		},
		SysctlSetting {
			key: "net.ipv4.ip_forward",
			value: "1",
			config_path: "/etc/sysctl.d/k8s-forward.conf",
		},
	];
}

impl SetupStep for Sysctl {
	fn name(&self) -> &'static str {
		"Sysctl"
	}

	fn description(&self) -> &'static str {
		"enable bridge netfilter and IPv4 forwarding"
	}

	fn check(&self, _ctx: &ProvisioningContext, host: &Host) -> Result<bool, InstallError> {
		for setting in Sysctl::SETTINGS {
			let declared = host.system.read_file(Path::new(setting.config_path))?;
			if declared.as_deref() != Some(setting.config_txt().as_str()) {
				info!("{} is not declared in {}.", setting.key, setting.config_path);
				return Ok(false);
			}
			let live = host.system.read_file(&setting.proc_path())?;
			if live.as_deref().map(str::trim) != Some(setting.value) {
				info!("{} is not active.", setting.key);
				return Ok(false);
			}
		}
		info!("Sysctl already configured.");
		Ok(true)
	}

	fn set(&self, _ctx: &ProvisioningContext, host: &Host) -> Result<Applied, InstallError> {
		info!("Configuring sysctl.");
		for setting in Sysctl::SETTINGS {
			host.system.write_file(
				Path::new(setting.config_path),
				setting.config_txt().as_bytes(),
			)?;
		}
		host.system.reload_sysctl()?;
		info!("Sysctl has been successfully configured.");
		Ok(Applied::Done)
	}
}
