use crate::context::ProvisioningContext;
use crate::error::InstallError;
use crate::setup::host::Host;
use crate::setup::report::Applied;
use crate::setup::{RoleGate, SetupStep};
use tracing::info;

/// Issues a fresh worker join credential on every control-plane run.
pub struct JoinToken;

impl SetupStep for JoinToken {
	fn name(&self) -> &'static str {
		"JoinToken"
	}

	fn description(&self) -> &'static str {
		"issue a one-time worker join command"
	}

	fn gate(&self) -> RoleGate {
		RoleGate::ControlPlaneOnly
	}

	fn is_idempotent(&self) -> bool {
		false
	}

	fn check(&self, _ctx: &ProvisioningContext, _host: &Host) -> Result<bool, InstallError> {
		Ok(false)
	}

	fn set(&self, _ctx: &ProvisioningContext, host: &Host) -> Result<Applied, InstallError> {
		let credential = host.cluster.issue_join_token()?;
		// The token itself stays out of the log.
		info!(
			"Join credential issued for {}.",
			credential.control_plane_endpoint
		);
		Ok(Applied::Issued(credential))
	}
}
