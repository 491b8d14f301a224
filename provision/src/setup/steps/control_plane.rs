use crate::context::{ContextUpdate, NodeRole, ProvisioningContext};
use crate::error::InstallError;
use crate::setup::host::{Host, HostSystem};
use crate::setup::report::Applied;
use crate::setup::{RoleGate, SetupStep};
use std::{
	net::{IpAddr, Ipv4Addr},
	path::{Path, PathBuf},
};
use tracing::{info, warn};

pub struct ClusterBootstrap;

impl ClusterBootstrap {
	/// Route targets, tried in order before falling back to address enumeration.
	pub const ROUTE_TARGETS: [IpAddr; 2] = [
		IpAddr::V4(Ipv4Addr::new(8, 8, 8, 8)),
		IpAddr::V4(Ipv4Addr::new(1, 1, 1, 1)),
	];
	pub const KUBECONFIG_DIR: &str = ".kube";

	pub fn detect_advertise_address(system: &dyn HostSystem) -> Result<IpAddr, InstallError> {
		for target in ClusterBootstrap::ROUTE_TARGETS {
			match system.route_source(target) {
				Ok(address) => {
					info!("Advertise address {address} detected via route to {target}.");
					return Ok(address);
				}
				Err(err) => warn!("Route-based address detection via {target} failed: {err}"),
			}
		}
		match system.host_addresses() {
			Ok(addresses) => match addresses.first() {
				Some(address) => {
					info!("Advertise address {address} taken from host addresses.");
					Ok(*address)
				}
				None => Err(InstallError::Environment(
					"no advertise address: host reports no addresses".into(),
				)),
			},
			Err(err) => Err(InstallError::Environment(format!(
				"no advertise address: route detection and address enumeration failed ({err})"
			))),
		}
	}

	fn user_kubeconfig(home: &Path) -> PathBuf {
		home.join(ClusterBootstrap::KUBECONFIG_DIR).join("config")
	}

	/// Whether the invoking user holds their own copy of the admin kubeconfig.
	fn credential_staged(host: &Host) -> Result<bool, InstallError> {
		let user = host.system.invoking_user()?;
		let kubeconfig = ClusterBootstrap::user_kubeconfig(&user.home);
		if !host.system.exists(&kubeconfig) {
			return Ok(false);
		}
		host.system.is_owned_by(&kubeconfig, &user)
	}

	/// Copies the admin kubeconfig into the invoking user's home, owned by them.
	fn stage_admin_credential(host: &Host, admin_conf: &Path) -> Result<(), InstallError> {
		let user = host.system.invoking_user()?;
		let kube_dir = user.home.join(ClusterBootstrap::KUBECONFIG_DIR);
		let kubeconfig = ClusterBootstrap::user_kubeconfig(&user.home);
		let credential = host.system.read_file(admin_conf)?.ok_or_else(|| {
			InstallError::Environment(format!("{} was not created", admin_conf.display()))
		})?;
		host.system.create_dir_all(&kube_dir)?;
		host.system.write_file(&kubeconfig, credential.as_bytes())?;
		host.system.chown(&kube_dir, &user)?;
		host.system.chown(&kubeconfig, &user)?;
		info!("Kubeconfig set for {} at {}.", user.name, kubeconfig.display());
		Ok(())
	}
}

impl SetupStep for ClusterBootstrap {
	fn name(&self) -> &'static str {
		"ClusterBootstrap"
	}

	fn description(&self) -> &'static str {
		"initialize the control plane and stage the admin kubeconfig"
	}

	fn gate(&self) -> RoleGate {
		RoleGate::ControlPlaneOnly
	}

	fn prepare(
		&self,
		ctx: &ProvisioningContext,
		host: &Host,
	) -> Result<Option<ContextUpdate>, InstallError> {
		if ctx.role()? != NodeRole::ControlPlane || host.cluster.is_initialized() {
			return Ok(None);
		}
		let address = ClusterBootstrap::detect_advertise_address(host.system.as_ref())?;
		Ok(Some(ContextUpdate::AdvertiseAddress(address)))
	}

	fn check(&self, _ctx: &ProvisioningContext, host: &Host) -> Result<bool, InstallError> {
		if !host.cluster.is_initialized() {
			info!("ClusterBootstrap: control plane is not initialized.");
			return Ok(false);
		}
		if !ClusterBootstrap::credential_staged(host)? {
			info!("ClusterBootstrap: control plane is initialized, kubeconfig is not staged.");
			return Ok(false);
		}
		info!("ClusterBootstrap is already done.");
		Ok(true)
	}

	fn set(&self, ctx: &ProvisioningContext, host: &Host) -> Result<Applied, InstallError> {
		if !host.cluster.is_initialized() {
			let address = ctx.advertise_address()?;
			info!(
				"Kubeadm init with pod network {} advertising {address}.",
				ctx.pod_cidr
			);
			host.cluster.init(&ctx.pod_cidr, address)?;
			info!("Kubeadm initialized.");
		}
		ClusterBootstrap::stage_admin_credential(host, &host.cluster.admin_kubeconfig())?;
		Ok(Applied::Done)
	}
}
