use crate::context::{ContextUpdate, NodeRole, ProvisioningContext};
use crate::error::InstallError;
use crate::setup::host::Host;
use crate::setup::report::Applied;
use crate::setup::SetupStep;
use std::path::Path;
use tracing::info;

pub struct RoleSelector {
	signal: Option<String>,
}

impl RoleSelector {
	pub const CONTROL_PLANE_MARKER: &str = "master";
	pub const CONTROL_PLANE_HOSTNAME: &str = "master-node";
	pub const WORKER_HOSTNAME: &str = "worker-node";
	pub const MACHINE_ID_PATH: &str = "/etc/machine-id";

	pub fn new(signal: Option<String>) -> Self {
		RoleSelector { signal }
	}

	/// Only the control-plane marker selects the control plane.
	pub fn role(&self) -> NodeRole {
		match self.signal.as_deref().map(str::trim) {
			Some(marker) if marker.eq_ignore_ascii_case(RoleSelector::CONTROL_PLANE_MARKER) => {
				NodeRole::ControlPlane
			}
			_ => NodeRole::Worker,
		}
	}

	fn hostname_for(role: NodeRole, host: &Host) -> String {
		match role {
			NodeRole::ControlPlane => RoleSelector::CONTROL_PLANE_HOSTNAME.to_owned(),
			NodeRole::Worker => {
				let machine_id = host
					.system
					.read_file(Path::new(RoleSelector::MACHINE_ID_PATH))
					.ok()
					.flatten()
					.map(|id| id.trim().to_ascii_lowercase())
					.filter(|id| id.len() >= 8 && id.chars().all(|c| c.is_ascii_hexdigit()));
				match machine_id {
					Some(id) => format!("{}-{}", RoleSelector::WORKER_HOSTNAME, &id[..8]),
					None => RoleSelector::WORKER_HOSTNAME.to_owned(),
				}
			}
		}
	}
}

impl SetupStep for RoleSelector {
	fn name(&self) -> &'static str {
		"RoleSelector"
	}

	fn description(&self) -> &'static str {
		"resolve node role and host name"
	}

	fn resolve(
		&self,
		_ctx: &ProvisioningContext,
		host: &Host,
	) -> Result<Option<ContextUpdate>, InstallError> {
		let role = self.role();
		let hostname = RoleSelector::hostname_for(role, host);
		info!("Node role resolved to {role}, host name {hostname}.");
		Ok(Some(ContextUpdate::Role { role, hostname }))
	}

	fn check(&self, ctx: &ProvisioningContext, host: &Host) -> Result<bool, InstallError> {
		let current = host.system.hostname()?;
		if current == ctx.hostname()? {
			info!("Host name is already {current}.");
			Ok(true)
		} else {
			info!("Host name is {current}.");
			Ok(false)
		}
	}

	fn set(&self, ctx: &ProvisioningContext, host: &Host) -> Result<Applied, InstallError> {
		let hostname = ctx.hostname()?;
		info!("Setting host name to {hostname}.");
		host.system.set_hostname(hostname)?;
		Ok(Applied::Done)
	}
}
