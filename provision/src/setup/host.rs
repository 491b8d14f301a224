//! Collaborator seams between the provisioning steps and the machine.
//!
//! Every step talks to the host only through these traits, so the whole
//! sequence can run against an in-memory double in tests.

use crate::error::InstallError;
use crate::setup::report::JoinCredential;
use sha2::{Digest, Sha256};
use std::{
	net::IpAddr,
	path::{Path, PathBuf},
};

/// The account that invoked the provisioner through sudo, or root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InvokingUser {
	pub name: String,
	pub uid: u32,
	pub gid: u32,
	pub home: PathBuf,
}

pub trait HostSystem {
	/// Reads a file, `None` when it does not exist.
	fn read_file(&self, path: &Path) -> Result<Option<String>, InstallError>;
	fn write_file(&self, path: &Path, contents: &[u8]) -> Result<(), InstallError>;
	fn create_dir_all(&self, path: &Path) -> Result<(), InstallError>;
	fn exists(&self, path: &Path) -> bool;
	fn chown(&self, path: &Path, user: &InvokingUser) -> Result<(), InstallError>;
	fn is_owned_by(&self, path: &Path, user: &InvokingUser) -> Result<bool, InstallError>;
	/// Extracts `member` from a gzipped tarball and installs it as an executable at `dest`.
	fn install_executable(
		&self,
		archive: &[u8],
		member: &str,
		dest: &Path,
	) -> Result<(), InstallError>;
	fn effective_uid(&self) -> Result<u32, InstallError>;
	fn invoking_user(&self) -> Result<InvokingUser, InstallError>;
	fn hostname(&self) -> Result<String, InstallError>;
	fn set_hostname(&self, name: &str) -> Result<(), InstallError>;
	/// `uname -m` style machine architecture.
	fn architecture(&self) -> String;
	fn load_module(&self, name: &str) -> Result<(), InstallError>;
	fn swapoff_all(&self) -> Result<(), InstallError>;
	fn reload_sysctl(&self) -> Result<(), InstallError>;
	/// Source address the kernel would pick to reach `target`.
	fn route_source(&self, target: IpAddr) -> Result<IpAddr, InstallError>;
	/// Every address assigned to the host, in the order the OS reports them.
	fn host_addresses(&self) -> Result<Vec<IpAddr>, InstallError>;
	/// Stdout of a successful command.
	fn command_output(&self, program: &str, args: &[&str]) -> Result<String, InstallError>;
}

/// An upstream package repository with its signing key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackageSource {
	pub key_url: String,
	pub keyring_path: PathBuf,
	pub list_path: PathBuf,
	pub entry: String,
}

pub trait PackageManager {
	fn update(&self) -> Result<(), InstallError>;
	fn upgrade(&self) -> Result<(), InstallError>;
	fn install(&self, package_names: &[&str]) -> Result<(), InstallError>;
	fn hold(&self, package_names: &[&str]) -> Result<(), InstallError>;
	fn is_installed(&self, package_name: &str) -> Result<bool, InstallError>;
	fn is_held(&self, package_name: &str) -> Result<bool, InstallError>;
	fn installed_version(&self, package_name: &str) -> Result<Option<String>, InstallError>;
	fn add_source(&self, source: &PackageSource) -> Result<(), InstallError>;
}

pub trait ServiceManager {
	fn enable(&self, unit: &str) -> Result<(), InstallError>;
	fn restart(&self, unit: &str) -> Result<(), InstallError>;
	fn is_active(&self, unit: &str) -> bool;
	fn is_enabled(&self, unit: &str) -> bool;
}

pub trait Downloader {
	fn fetch(&self, url: &str) -> Result<Vec<u8>, InstallError>;

	/// Compares the SHA-256 of `bytes` against a hex digest.
	fn verify(&self, bytes: &[u8], checksum: &str) -> bool {
		sha256_hex(bytes).eq_ignore_ascii_case(checksum.trim())
	}
}

pub fn sha256_hex(bytes: &[u8]) -> String {
	format!("{:x}", Sha256::digest(bytes))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Component {
	Kubeadm,
	Kubelet,
	Kubectl,
}

impl Component {
	pub const ALL: [Component; 3] = [Component::Kubeadm, Component::Kubelet, Component::Kubectl];

	pub fn binary(self) -> &'static str {
		match self {
			Component::Kubeadm => "kubeadm",
			Component::Kubelet => "kubelet",
			Component::Kubectl => "kubectl",
		}
	}
}

pub trait ClusterApi {
	fn is_initialized(&self) -> bool;
	/// Where an initialized control plane keeps its admin kubeconfig.
	fn admin_kubeconfig(&self) -> PathBuf;
	fn init(&self, pod_cidr: &str, advertise_address: IpAddr) -> Result<(), InstallError>;
	fn issue_join_token(&self) -> Result<JoinCredential, InstallError>;
	fn query_nodes(&self) -> Result<Vec<String>, InstallError>;
	fn component_version(&self, component: Component) -> Result<String, InstallError>;
}

pub trait CniCli {
	/// Version of the CNI running in the cluster, if any.
	fn running_version(&self) -> Result<Option<String>, InstallError>;
	/// Installs the CNI at `version` with the Hubble observability add-on.
	fn install(&self, version: &str, pod_cidr: &str) -> Result<(), InstallError>;
	fn is_ready(&self) -> bool;
}

/// Every collaborator a provisioning run needs, bundled for the steps.
pub struct Host {
	pub system: Box<dyn HostSystem>,
	pub pkg: Box<dyn PackageManager>,
	pub services: Box<dyn ServiceManager>,
	pub downloader: Box<dyn Downloader>,
	pub cluster: Box<dyn ClusterApi>,
	pub cni: Box<dyn CniCli>,
}

#[cfg(test)]
mod tests {
	use super::*;

	struct NoNetwork;

	impl Downloader for NoNetwork {
		fn fetch(&self, url: &str) -> Result<Vec<u8>, InstallError> {
			Err(InstallError::network("fetch", url))
		}
	}

	#[test]
	fn verify_accepts_matching_digest_in_any_case() {
		let digest = sha256_hex(b"cilium");
		assert!(NoNetwork.verify(b"cilium", &digest));
		assert!(NoNetwork.verify(b"cilium", &format!("{}\n", digest.to_uppercase())));
	}

	#[test]
	fn verify_rejects_corrupted_bytes() {
		let digest = sha256_hex(b"cilium");
		assert!(!NoNetwork.verify(b"cilium-tampered", &digest));
	}
}
