mod cilium;
mod download;
mod exec;
mod kubeadm;
mod local;
mod pkg;
mod systemd;

#[cfg(test)]
pub mod fake;

use crate::setup::host::Host;

/// Collaborators backed by the real machine.
pub fn local_host() -> Host {
	Host {
		system: Box::new(local::LocalHost),
		pkg: Box::new(pkg::Apt),
		services: Box::new(systemd::Systemd),
		downloader: Box::new(download::Curl),
		cluster: Box::new(kubeadm::Kubeadm),
		cni: Box::new(cilium::CiliumCli),
	}
}
