use crate::config::Config;
use crate::error::InstallError;
use std::{fmt, net::IpAddr};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeRole {
	ControlPlane,
	Worker,
}

impl fmt::Display for NodeRole {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			NodeRole::ControlPlane => f.write_str("control-plane"),
			NodeRole::Worker => f.write_str("worker"),
		}
	}
}

/// Context changes a step may hand back to the sequencer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ContextUpdate {
	Role { role: NodeRole, hostname: String },
	AdvertiseAddress(IpAddr),
}

/// Host facts for one provisioning run.
///
/// Steps only ever see a shared reference; the sequencer applies
/// [`ContextUpdate`]s between steps.
#[derive(Debug, Clone)]
pub struct ProvisioningContext {
	role: Option<NodeRole>,
	hostname: Option<String>,
	advertise_address: Option<IpAddr>,
	pub kubernetes_channel: String,
	pub cni_version: String,
	pub pod_cidr: String,
}

impl ProvisioningContext {
	pub fn new(config: &Config) -> Self {
		ProvisioningContext {
			role: None,
			hostname: None,
			advertise_address: None,
			kubernetes_channel: config.kubernetes_channel.clone(),
			cni_version: config.cni_version.clone(),
			pod_cidr: config.pod_cidr.clone(),
		}
	}

	pub fn role(&self) -> Result<NodeRole, InstallError> {
		self.role
			.ok_or_else(|| InstallError::Config("node role read before it was resolved".into()))
	}

	pub fn hostname(&self) -> Result<&str, InstallError> {
		self.hostname
			.as_deref()
			.ok_or_else(|| InstallError::Config("hostname read before it was resolved".into()))
	}

	pub fn advertise_address(&self) -> Result<IpAddr, InstallError> {
		self.advertise_address.ok_or_else(|| {
			InstallError::Config("advertise address read before it was detected".into())
		})
	}

	pub(crate) fn apply(&mut self, update: ContextUpdate) -> Result<(), InstallError> {
		match update {
			ContextUpdate::Role { role, hostname } => {
				if self.role.is_some_and(|current| current != role) {
					return Err(InstallError::Config(format!(
						"node role already resolved, refusing to change it to {role}"
					)));
				}
				self.role = Some(role);
				self.hostname = Some(hostname);
			}
			ContextUpdate::AdvertiseAddress(address) => {
				if self.role != Some(NodeRole::ControlPlane) {
					return Err(InstallError::Config(
						"advertise address only applies to control-plane nodes".into(),
					));
				}
				self.advertise_address = Some(address);
			}
		}
		Ok(())
	}
}
