use crate::error::InstallError;
use crate::setup::host::ServiceManager;
use crate::setup::utils::exec;

pub struct Systemd;

impl ServiceManager for Systemd {
	fn enable(&self, unit: &str) -> Result<(), InstallError> {
		exec::output("systemctl", &["enable", "--now", unit]).map(drop)
	}

	fn restart(&self, unit: &str) -> Result<(), InstallError> {
		exec::output("systemctl", &["restart", unit]).map(drop)
	}

	fn is_active(&self, unit: &str) -> bool {
		exec::succeeds("systemctl", &["is-active", "--quiet", unit])
	}

	fn is_enabled(&self, unit: &str) -> bool {
		exec::succeeds("systemctl", &["is-enabled", "--quiet", unit])
	}
}
