use crate::context::ProvisioningContext;
use crate::error::InstallError;
use crate::setup::host::Host;
use crate::setup::report::Applied;
use crate::setup::SetupStep;
use hex_literal::hex;
use sha2::{Digest, Sha256};
use std::path::Path;
use tracing::info;

pub struct KernelModules;

impl KernelModules {
	pub const CONFIG_PATH: &str = "/etc/modules-load.d/k8s.conf";
	pub const MODULES: &[&str] = &["overlay", "br_netfilter"];

	pub fn is_loaded(host: &Host, module_name: &str) -> bool {
		host.system
			.exists(&Path::new("/sys/module/").join(module_name))
	}

	fn config_txt() -> String {
		KernelModules::MODULES
			.iter()
			.map(|module| format!("{module}\n"))
			.collect()
	}
}

impl SetupStep for KernelModules {
	fn name(&self) -> &'static str {
		"KernelModules"
	}

	fn description(&self) -> &'static str {
		"declare and load overlay and br_netfilter"
	}

	fn check(&self, _ctx: &ProvisioningContext, host: &Host) -> Result<bool, InstallError> {
		const EXPECTED: [u8; 32] =
			hex!("fcaf07413a456d658640930cef56ed4d13330123e3b522c481021613c64755e3");
		let Some(config_txt) = host.system.read_file(Path::new(KernelModules::CONFIG_PATH))? else {
			info!("Kernel module config missing.");
			return Ok(false);
		};
		let is_valid = Sha256::digest(config_txt.as_bytes())[..] == EXPECTED;
		if !is_valid {
			info!("Kernel modules are misconfigured.");
			return Ok(false);
		}
		for module in KernelModules::MODULES {
			if !KernelModules::is_loaded(host, module) {
				info!("Kernel module {module} not loaded.");
				return Ok(false);
			}
		}
		info!("Kernel modules are already configured and loaded.");
		Ok(true)
	}

	fn set(&self, _ctx: &ProvisioningContext, host: &Host) -> Result<Applied, InstallError> {
		info!("Configuring kernel modules.");
		host.system.write_file(
			Path::new(KernelModules::CONFIG_PATH),
			KernelModules::config_txt().as_bytes(),
		)?;
		for module in KernelModules::MODULES {
			info!("Loading kernel module: {module}.");
			host.system.load_module(module)?;
		}
		info!("Kernel modules have been successfully configured and loaded.");
		Ok(Applied::Done)
	}
}
