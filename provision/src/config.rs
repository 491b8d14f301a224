use crate::error::InstallError;
use clap::Parser;
use std::{net::IpAddr, path::PathBuf, time::Duration};

#[derive(Debug, Parser)]
#[command(name = "k8s-provision", version, about = "Provision this host as a Kubernetes node.")]
pub struct Cli {
	/// Node role marker; `master` selects the control plane, anything else a worker.
	#[arg(long, env = "K8S_NODE_ROLE")]
	pub role: Option<String>,

	/// Kubernetes package channel to pin, e.g. `v1.34`.
	#[arg(long, env = "K8S_CHANNEL", default_value = Config::KUBERNETES_CHANNEL)]
	pub k8s_channel: String,

	/// Cilium version installed into the cluster.
	#[arg(long, env = "CNI_VERSION", default_value = Config::CNI_VERSION)]
	pub cni_version: String,

	#[arg(long, env = "POD_CIDR", default_value = Config::POD_CIDR)]
	pub pod_cidr: String,

	/// Seconds to wait for the CNI to report healthy.
	#[arg(long, env = "CNI_WAIT_SECS", default_value_t = 300)]
	pub cni_wait_secs: u64,

	#[arg(long, default_value = "/run/k8s-provision.lock")]
	pub lock_file: PathBuf,
}

/// Bounded exponential backoff for transient failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
	pub attempts: u32,
	pub base_delay: Duration,
}

impl RetryPolicy {
	/// Delay before the attempt following `attempt` (1-based).
	pub fn delay_after(&self, attempt: u32) -> Duration {
		self.base_delay * 2u32.saturating_pow(attempt.saturating_sub(1))
	}
}

impl Default for RetryPolicy {
	fn default() -> Self {
		RetryPolicy {
			attempts: 3,
			base_delay: Duration::from_secs(2),
		}
	}
}

#[derive(Debug, Clone)]
pub struct Config {
	pub kubernetes_channel: String,
	pub cni_version: String,
	pub pod_cidr: String,
	pub cni_wait: Duration,
	pub cni_poll_interval: Duration,
	pub retry: RetryPolicy,
}

impl Config {
	pub const KUBERNETES_CHANNEL: &str = "v1.34";
	pub const CNI_VERSION: &str = "1.18.4";
	pub const POD_CIDR: &str = "10.0.0.0/16";

	pub fn from_cli(cli: &Cli) -> Result<Config, InstallError> {
		validate_channel(&cli.k8s_channel)?;
		validate_cidr(&cli.pod_cidr)?;
		if cli.cni_version.trim().is_empty() {
			return Err(InstallError::Config("CNI version must not be empty".into()));
		}
		Ok(Config {
			kubernetes_channel: cli.k8s_channel.clone(),
			cni_version: cli.cni_version.trim().trim_start_matches('v').to_owned(),
			pod_cidr: cli.pod_cidr.clone(),
			cni_wait: Duration::from_secs(cli.cni_wait_secs),
			..Config::default()
		})
	}
}

impl Default for Config {
	fn default() -> Self {
		Config {
			kubernetes_channel: Config::KUBERNETES_CHANNEL.to_owned(),
			cni_version: Config::CNI_VERSION.to_owned(),
			pod_cidr: Config::POD_CIDR.to_owned(),
			cni_wait: Duration::from_secs(300),
			cni_poll_interval: Duration::from_secs(10),
			retry: RetryPolicy::default(),
		}
	}
}

fn validate_channel(channel: &str) -> Result<(), InstallError> {
	let valid = channel
		.strip_prefix('v')
		.and_then(|rest| rest.split_once('.'))
		.is_some_and(|(major, minor)| {
			!major.is_empty()
				&& !minor.is_empty()
				&& major.chars().all(|c| c.is_ascii_digit())
				&& minor.chars().all(|c| c.is_ascii_digit())
		});
	if valid {
		Ok(())
	} else {
		Err(InstallError::Config(format!(
			"Kubernetes channel '{channel}' is not of the form vMAJOR.MINOR"
		)))
	}
}

fn validate_cidr(cidr: &str) -> Result<(), InstallError> {
	let invalid = || InstallError::Config(format!("pod network CIDR '{cidr}' is invalid"));
	let (address, prefix) = cidr.split_once('/').ok_or_else(invalid)?;
	let address = address.parse::<IpAddr>().map_err(|_| invalid())?;
	let prefix = prefix.parse::<u8>().map_err(|_| invalid())?;
	let max_prefix = if address.is_ipv4() { 32 } else { 128 };
	if prefix > max_prefix {
		return Err(invalid());
	}
	Ok(())
}
