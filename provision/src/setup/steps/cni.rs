use crate::context::ProvisioningContext;
use crate::error::InstallError;
use crate::setup::host::{sha256_hex, Host};
use crate::setup::report::Applied;
use crate::setup::{RoleGate, SetupStep};
use std::{
	path::Path,
	thread::sleep,
	time::{Duration, Instant},
};
use tracing::{info, warn};

pub struct CniInstall {
	wait: Duration,
	poll_interval: Duration,
}

impl CniInstall {
	pub const STABLE_URL: &str =
		"https://raw.githubusercontent.com/cilium/cilium-cli/main/stable.txt";
	pub const RELEASE_BASE_URL: &str = "https://github.com/cilium/cilium-cli/releases/download";
	pub const BINARY_NAME: &str = "cilium";
	pub const BINARY_PATH: &str = "/usr/local/bin/cilium";

	pub fn new(wait: Duration, poll_interval: Duration) -> Self {
		CniInstall {
			wait,
			poll_interval,
		}
	}

	/// Release artifact architecture for a `uname -m` machine name.
	pub fn artifact_arch(machine: &str) -> Result<&'static str, InstallError> {
		match machine {
			"x86_64" | "amd64" => Ok("amd64"),
			"aarch64" | "arm64" => Ok("arm64"),
			other => Err(InstallError::Environment(format!(
				"no cilium CLI build for architecture {other}"
			))),
		}
	}

	pub fn artifact_name(arch: &str) -> String {
		format!("cilium-linux-{arch}.tar.gz")
	}

	/// First field of a `sha256sum` line.
	pub fn parse_checksum(sum_file: &str) -> Option<&str> {
		sum_file.split_whitespace().next()
	}

	fn fetch_text(host: &Host, url: &str) -> Result<String, InstallError> {
		let bytes = host.downloader.fetch(url)?;
		Ok(String::from_utf8(bytes)?.trim().to_owned())
	}

	fn install_cli(host: &Host) -> Result<(), InstallError> {
		let release = CniInstall::fetch_text(host, CniInstall::STABLE_URL)?;
		if release.is_empty() {
			return Err(InstallError::network(
				"cilium CLI release lookup",
				"stable channel returned an empty release id",
			));
		}
		let arch = CniInstall::artifact_arch(&host.system.architecture())?;
		let artifact = CniInstall::artifact_name(arch);
		let url = format!("{}/{release}/{artifact}", CniInstall::RELEASE_BASE_URL);
		info!("Downloading cilium CLI {release} ({arch}).");
		let archive = host.downloader.fetch(&url)?;
		let sum_file = CniInstall::fetch_text(host, &format!("{url}.sha256sum"))?;
		let expected = CniInstall::parse_checksum(&sum_file).unwrap_or_default();
		if !host.downloader.verify(&archive, expected) {
			return Err(InstallError::Integrity {
				artifact,
				expected: expected.to_owned(),
				actual: sha256_hex(&archive),
			});
		}
		host.system.install_executable(
			&archive,
			CniInstall::BINARY_NAME,
			Path::new(CniInstall::BINARY_PATH),
		)?;
		info!("Cilium CLI {release} installed to {}.", CniInstall::BINARY_PATH);
		Ok(())
	}

	fn wait_until_ready(&self, host: &Host) -> bool {
		let deadline = Instant::now() + self.wait;
		loop {
			if host.cni.is_ready() {
				return true;
			}
			if Instant::now() >= deadline {
				return false;
			}
			sleep(self.poll_interval);
		}
	}
}

impl SetupStep for CniInstall {
	fn name(&self) -> &'static str {
		"CniInstall"
	}

	fn description(&self) -> &'static str {
		"install the cilium CLI and CNI with Hubble"
	}

	fn gate(&self) -> RoleGate {
		RoleGate::ControlPlaneOnly
	}

	fn check(&self, ctx: &ProvisioningContext, host: &Host) -> Result<bool, InstallError> {
		if !host.system.exists(Path::new(CniInstall::BINARY_PATH)) {
			info!("Cilium CLI is not installed.");
			return Ok(false);
		}
		match host.cni.running_version()? {
			Some(version) if version == ctx.cni_version => {
				info!("Cilium {version} is already installed.");
				Ok(true)
			}
			Some(version) => {
				info!("Cilium {version} is running, {} is pinned.", ctx.cni_version);
				Ok(false)
			}
			None => {
				info!("Cilium is not installed in the cluster.");
				Ok(false)
			}
		}
	}

	fn set(&self, ctx: &ProvisioningContext, host: &Host) -> Result<Applied, InstallError> {
		if !host.system.exists(Path::new(CniInstall::BINARY_PATH)) {
			CniInstall::install_cli(host)?;
		}
		if host.cni.running_version()?.as_deref() != Some(ctx.cni_version.as_str()) {
			info!("Cilium {} installing.", ctx.cni_version);
			host.cni.install(&ctx.cni_version, &ctx.pod_cidr)?;
		}
		if self.wait_until_ready(host) {
			info!("Cilium is ready.");
			Ok(Applied::Done)
		} else {
			let reason = format!(
				"cilium did not report ready within {}s",
				self.wait.as_secs()
			);
			warn!("{reason}.");
			Ok(Applied::Warned(reason))
		}
	}
}
