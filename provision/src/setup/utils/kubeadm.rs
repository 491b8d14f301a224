use crate::error::InstallError;
use crate::setup::host::{ClusterApi, Component};
use crate::setup::report::JoinCredential;
use crate::setup::utils::exec;
use std::{
	net::IpAddr,
	path::{Path, PathBuf},
};

/// Cluster lifecycle through kubeadm, queries through kubectl against the admin kubeconfig.
pub struct Kubeadm;

impl Kubeadm {
	pub const KUBECONFIG: &str = "/etc/kubernetes/admin.conf";
	pub const API_SERVER_MANIFEST: &str = "/etc/kubernetes/manifests/kube-apiserver.yaml";

	fn kubectl(args: &[&str]) -> Result<String, InstallError> {
		let mut full_args = vec!["--kubeconfig", Kubeadm::KUBECONFIG];
		full_args.extend_from_slice(args);
		exec::stdout("kubectl", &full_args)
	}

	/// Splits `kubeadm token create --print-join-command` output into its parts.
	pub fn parse_join_command(output: &str) -> Option<JoinCredential> {
		let mut words = output.split_whitespace();
		if words.next()? != "kubeadm" || words.next()? != "join" {
			return None;
		}
		let control_plane_endpoint = words.next()?.to_owned();
		let mut token = None;
		let mut ca_cert_hash = None;
		while let Some(word) = words.next() {
			match word {
				"--token" => token = words.next().map(str::to_owned),
				"--discovery-token-ca-cert-hash" => ca_cert_hash = words.next().map(str::to_owned),
				_ => {}
			}
		}
		Some(JoinCredential {
			token: token?,
			ca_cert_hash: ca_cert_hash?,
			control_plane_endpoint,
		})
	}

	/// The `vX.Y.Z` word of a version banner such as `Kubernetes v1.34.2`.
	pub fn parse_version(output: &str) -> Option<String> {
		output
			.split_whitespace()
			.find(|word| word.starts_with('v') && word[1..].starts_with(|c: char| c.is_ascii_digit()))
			.map(str::to_owned)
	}

	pub fn parse_node_names(output: &str) -> Vec<String> {
		output
			.lines()
			.map(str::trim)
			.filter(|line| !line.is_empty())
			.map(|line| line.strip_prefix("node/").unwrap_or(line).to_owned())
			.collect()
	}
}

impl ClusterApi for Kubeadm {
	fn is_initialized(&self) -> bool {
		Path::new(Kubeadm::KUBECONFIG).exists() && Path::new(Kubeadm::API_SERVER_MANIFEST).exists()
	}

	fn admin_kubeconfig(&self) -> PathBuf {
		PathBuf::from(Kubeadm::KUBECONFIG)
	}

	fn init(&self, pod_cidr: &str, advertise_address: IpAddr) -> Result<(), InstallError> {
		let advertise_address = advertise_address.to_string();
		let result = exec::output(
			"kubeadm",
			&[
				"init",
				"--pod-network-cidr",
				pod_cidr,
				"--apiserver-advertise-address",
				&advertise_address,
			],
		);
		match result {
			Ok(_) => Ok(()),
			Err(InstallError::CommandFailed {
				stderr: Some(stderr),
				..
			}) if stderr.contains("already exists") => Err(InstallError::StateConflict(
				"kubeadm reports an existing control plane".into(),
			)),
			Err(err) => Err(err),
		}
	}

	fn issue_join_token(&self) -> Result<JoinCredential, InstallError> {
		let output = exec::stdout(
			"kubeadm",
			&[
				"token",
				"create",
				"--print-join-command",
				"--kubeconfig",
				Kubeadm::KUBECONFIG,
			],
		)
		.map_err(|err| InstallError::network("join token issuance", err.to_string()))?;
		// Output carries the secret; keep it out of the error.
		Kubeadm::parse_join_command(&output).ok_or_else(|| {
			InstallError::Environment("kubeadm printed an unrecognized join command".into())
		})
	}

	fn query_nodes(&self) -> Result<Vec<String>, InstallError> {
		let output = Kubeadm::kubectl(&["get", "nodes", "-o", "name"])
			.map_err(|err| InstallError::Verification(err.to_string()))?;
		Ok(Kubeadm::parse_node_names(&output))
	}

	fn component_version(&self, component: Component) -> Result<String, InstallError> {
		let args: &[&str] = match component {
			Component::Kubeadm => &["version", "-o", "short"],
			Component::Kubelet => &["--version"],
			Component::Kubectl => &["version", "--client"],
		};
		let output = exec::stdout(component.binary(), args)
			.map_err(|err| InstallError::Verification(err.to_string()))?;
		Kubeadm::parse_version(&output).ok_or_else(|| {
			InstallError::Verification(format!(
				"{} printed no version: {output}",
				component.binary()
			))
		})
	}
}
