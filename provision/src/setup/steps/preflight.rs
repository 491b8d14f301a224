use crate::context::ProvisioningContext;
use crate::error::InstallError;
use crate::setup::host::Host;
use crate::setup::report::Applied;
use crate::setup::SetupStep;
use std::path::Path;
use tracing::info;

pub struct Preflight;

impl Preflight {
	pub const OS_RELEASE_PATH: &str = "/etc/os-release";
	pub const SUPPORTED_FAMILIES: &[&str] = &["debian", "ubuntu"];

	/// Distribution id plus its `ID_LIKE` ancestry, lowercased.
	pub fn os_families(os_release: &str) -> Vec<String> {
		os_release
			.lines()
			.filter_map(|line| line.split_once('='))
			.filter(|(key, _)| matches!(key.trim(), "ID" | "ID_LIKE"))
			.flat_map(|(_, value)| {
				value
					.trim()
					.trim_matches(|c| c == '"' || c == '\'')
					.split_whitespace()
					.map(str::to_ascii_lowercase)
					.collect::<Vec<_>>()
			})
			.collect()
	}
}

impl SetupStep for Preflight {
	fn name(&self) -> &'static str {
		"Preflight"
	}

	fn description(&self) -> &'static str {
		"validate privilege and OS family"
	}

	fn mutates_host(&self) -> bool {
		false
	}

	fn check(&self, _ctx: &ProvisioningContext, host: &Host) -> Result<bool, InstallError> {
		let uid = host.system.effective_uid()?;
		if uid != 0 {
			return Err(InstallError::Privilege(format!(
				"running as uid {uid}, root is required"
			)));
		}
		let Some(os_release) = host.system.read_file(Path::new(Preflight::OS_RELEASE_PATH))? else {
			return Err(InstallError::Environment(format!(
				"{} is missing",
				Preflight::OS_RELEASE_PATH
			)));
		};
		let families = Preflight::os_families(&os_release);
		let is_supported = families
			.iter()
			.any(|family| Preflight::SUPPORTED_FAMILIES.contains(&family.as_str()));
		if !is_supported {
			return Err(InstallError::Environment(format!(
				"OS family [{}] is not apt based",
				families.join(", ")
			)));
		}
		let user = host.system.invoking_user()?;
		info!(
			"Preflight passed: root, OS family [{}], invoking user {}.",
			families.join(", "),
			user.name
		);
		Ok(true)
	}

	// Preflight never mutates the host; a passing check is the whole step.
	fn set(&self, _ctx: &ProvisioningContext, _host: &Host) -> Result<Applied, InstallError> {
		Ok(Applied::Done)
	}
}
