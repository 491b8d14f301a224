use crate::context::ProvisioningContext;
use crate::error::InstallError;
use crate::setup::host::{Host, PackageSource};
use crate::setup::report::Applied;
use crate::setup::SetupStep;
use std::path::{Path, PathBuf};
use tracing::info;

pub struct KubeComponents;

impl KubeComponents {
	pub const PACKAGE_NAMES: &[&str] = &["kubelet", "kubeadm", "kubectl"];
	pub const AGENT_SERVICE: &str = "kubelet";
	pub const APT_CONFIG_PATH: &str = "/etc/apt/sources.list.d/kubernetes.list";
	pub const APT_KEY_PATH: &str = "/etc/apt/keyrings/kubernetes-apt-keyring.gpg";

	pub fn base_url(channel: &str) -> String {
		format!("https://pkgs.k8s.io/core:/stable:/{channel}/deb")
	}

	pub fn source(channel: &str) -> PackageSource {
		let base_url = KubeComponents::base_url(channel);
		PackageSource {
			key_url: format!("{base_url}/Release.key"),
			keyring_path: PathBuf::from(KubeComponents::APT_KEY_PATH),
			list_path: PathBuf::from(KubeComponents::APT_CONFIG_PATH),
			entry: format!(
				"deb [signed-by={}] {} /\n",
				KubeComponents::APT_KEY_PATH,
				base_url
			),
		}
	}

	/// Whether a Debian package version such as `1.34.2-1.1` sits in channel `v1.34`.
	pub fn in_channel(version: &str, channel: &str) -> bool {
		let upstream = version.split_once(':').map_or(version, |(_, rest)| rest);
		let minor = channel.trim_start_matches('v');
		upstream
			.strip_prefix(minor)
			.is_some_and(|rest| rest.starts_with('.') || rest.starts_with('-'))
	}
}

impl SetupStep for KubeComponents {
	fn name(&self) -> &'static str {
		"KubeComponents"
	}

	fn description(&self) -> &'static str {
		"install and hold kubelet, kubeadm and kubectl"
	}

	fn check(&self, ctx: &ProvisioningContext, host: &Host) -> Result<bool, InstallError> {
		let source = KubeComponents::source(&ctx.kubernetes_channel);
		let registered = host.system.read_file(Path::new(KubeComponents::APT_CONFIG_PATH))?;
		if registered.as_deref() != Some(source.entry.as_str()) {
			info!(
				"Kubernetes {} package source is not registered.",
				ctx.kubernetes_channel
			);
			return Ok(false);
		}
		for package_name in KubeComponents::PACKAGE_NAMES {
			let Some(version) = host.pkg.installed_version(package_name)? else {
				info!("{package_name} is not installed.");
				return Ok(false);
			};
			if !KubeComponents::in_channel(&version, &ctx.kubernetes_channel) {
				info!(
					"{package_name} {version} is outside channel {}.",
					ctx.kubernetes_channel
				);
				return Ok(false);
			}
			if !host.pkg.is_held(package_name)? {
				info!("{package_name} is not held.");
				return Ok(false);
			}
		}
		if !host.services.is_enabled(KubeComponents::AGENT_SERVICE) {
			info!("{} is not enabled.", KubeComponents::AGENT_SERVICE);
			return Ok(false);
		}
		info!("KubeComponents are already installed and held.");
		Ok(true)
	}

	fn set(&self, ctx: &ProvisioningContext, host: &Host) -> Result<Applied, InstallError> {
		info!(
			"Installing Kubernetes {} tooling via apt-get.",
			ctx.kubernetes_channel
		);
		host.pkg
			.add_source(&KubeComponents::source(&ctx.kubernetes_channel))?;
		host.pkg.update()?;
		host.pkg.install(KubeComponents::PACKAGE_NAMES)?;
		host.pkg.hold(KubeComponents::PACKAGE_NAMES)?;
		host.services.enable(KubeComponents::AGENT_SERVICE)?;
		info!("Kubernetes tooling installed.");
		Ok(Applied::Done)
	}
}
