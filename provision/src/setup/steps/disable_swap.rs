use crate::context::ProvisioningContext;
use crate::error::InstallError;
use crate::setup::host::Host;
use crate::setup::report::Applied;
use crate::setup::SetupStep;
use std::path::Path;
use tracing::info;

pub struct DisableSwap;

impl DisableSwap {
	pub const SWAPS_PATH: &str = "/proc/swaps";
	pub const FSTAB_PATH: &str = "/etc/fstab";

	fn is_swap_entry(line: &str) -> bool {
		if line.trim_start().starts_with('#') {
			return false;
		}
		line.split_whitespace()
			.nth(2)
			.is_some_and(|fs_type| fs_type == "swap")
	}

	pub fn has_swap_entry(fstab: &str) -> bool {
		fstab.lines().any(DisableSwap::is_swap_entry)
	}

	/// Drops uncommented swap mounts, keeping everything else byte for byte.
	pub fn strip_swap_entries(fstab: &str) -> String {
		let cleaned = fstab
			.lines()
			.filter(|line| !DisableSwap::is_swap_entry(line))
			.collect::<Vec<_>>()
			.join("\n");
		if fstab.ends_with('\n') && !cleaned.is_empty() {
			cleaned + "\n"
		} else {
			cleaned
		}
	}

	/// `/proc/swaps` always carries a header line.
	pub fn active_swap_count(swaps: &str) -> usize {
		swaps
			.lines()
			.skip(1)
			.filter(|line| !line.trim().is_empty())
			.count()
	}
}

impl SetupStep for DisableSwap {
	fn name(&self) -> &'static str {
		"DisableSwap"
	}

	fn description(&self) -> &'static str {
		"turn off swap now and on boot"
	}

	fn check(&self, _ctx: &ProvisioningContext, host: &Host) -> Result<bool, InstallError> {
		let swaps = host
			.system
			.read_file(Path::new(DisableSwap::SWAPS_PATH))?
			.ok_or_else(|| {
				InstallError::Environment(format!("{} is missing", DisableSwap::SWAPS_PATH))
			})?;
		if DisableSwap::active_swap_count(&swaps) > 0 {
			info!("Swap is enabled.");
			return Ok(false);
		}
		let fstab = host
			.system
			.read_file(Path::new(DisableSwap::FSTAB_PATH))?
			.unwrap_or_default();
		if DisableSwap::has_swap_entry(&fstab) {
			info!("Swap is enabled in fstab.");
			return Ok(false);
		}
		info!("Swap is disabled.");
		Ok(true)
	}

	fn set(&self, _ctx: &ProvisioningContext, host: &Host) -> Result<Applied, InstallError> {
		info!("Disabling swap.");
		host.system.swapoff_all()?;
		let config_path = Path::new(DisableSwap::FSTAB_PATH);
		if let Some(original) = host.system.read_file(config_path)? {
			let cleaned = DisableSwap::strip_swap_entries(&original);
			if cleaned != original {
				info!("Removing swap entries from {}.", DisableSwap::FSTAB_PATH);
				host.system.write_file(config_path, cleaned.as_bytes())?;
			}
		}
		Ok(Applied::Done)
	}
}
