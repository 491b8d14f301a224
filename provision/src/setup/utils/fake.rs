//! In-memory host used by the step and sequencer tests.

use crate::error::InstallError;
use crate::setup::host::{
	sha256_hex, ClusterApi, CniCli, Component, Downloader, Host, HostSystem, InvokingUser,
	PackageManager, PackageSource, ServiceManager,
};
use crate::setup::report::JoinCredential;
use std::{
	cell::{RefCell, RefMut},
	collections::{BTreeMap, BTreeSet},
	io,
	net::IpAddr,
	os::unix::process::ExitStatusExt,
	path::{Path, PathBuf},
	process::ExitStatus,
	rc::Rc,
};

pub const CILIUM_RELEASE: &str = "v0.18.9";
const ADMIN_KUBECONFIG: &str = "/etc/kubernetes/admin.conf";
const CILIUM_ARCHIVE: &[u8] = b"\x1f\x8bcilium-cli-archive";
const PROC_SWAPS_HEADER: &str = "Filename\t\t\t\tType\t\tSize\t\tUsed\t\tPriority\n";
const DEFAULT_CONTAINERD_CONFIG: &str = "\
version = 3

[plugins.'io.containerd.cri.v1.runtime'.containerd.runtimes.runc.options]
  BinaryName = ''
  SystemdCgroup = false
";

#[derive(Debug, Clone)]
pub struct FakePackage {
	pub version: String,
	pub held: bool,
}

#[derive(Debug, Clone, Default)]
pub struct FakeService {
	pub enabled: bool,
	pub active: bool,
}

#[derive(Debug, Default)]
pub struct FakeState {
	pub files: BTreeMap<PathBuf, Vec<u8>>,
	/// Paths whose writes fail with permission denied.
	pub read_only: BTreeSet<PathBuf>,
	pub owners: BTreeMap<PathBuf, String>,
	pub uid: u32,
	pub user: InvokingUser,
	pub hostname: String,
	pub arch: String,
	pub routes: BTreeMap<IpAddr, IpAddr>,
	pub route_queries: Vec<IpAddr>,
	pub addresses: Vec<IpAddr>,
	pub address_queries: usize,
	pub packages: BTreeMap<String, FakePackage>,
	pub available: BTreeMap<String, String>,
	pub services: BTreeMap<String, FakeService>,
	pub failing_restarts: BTreeSet<String>,
	pub downloads: BTreeMap<String, Vec<u8>>,
	/// Remaining transient failures per URL.
	pub flaky_downloads: BTreeMap<String, u32>,
	pub fetches: Vec<String>,
	pub cluster_initialized: bool,
	pub init_calls: Vec<(String, IpAddr)>,
	pub join_tokens_issued: u32,
	pub cni_version: Option<String>,
	pub cni_ready: bool,
	/// Every host mutation in call order.
	pub mutations: Vec<String>,
}

impl Default for InvokingUser {
	fn default() -> Self {
		InvokingUser {
			name: "ops".into(),
			uid: 1000,
			gid: 1000,
			home: PathBuf::from("/home/ops"),
		}
	}
}

fn ip(text: &str) -> IpAddr {
	text.parse().expect("valid test address")
}

fn failed_status() -> ExitStatus {
	ExitStatus::from_raw(1 << 8)
}

/// A root shell on a fresh Ubuntu machine with swap on and nothing installed.
#[derive(Clone)]
pub struct FakeHost {
	state: Rc<RefCell<FakeState>>,
}

impl FakeHost {
	pub fn new() -> Self {
		let mut state = FakeState {
			uid: 0,
			hostname: "localhost".into(),
			arch: "x86_64".into(),
			addresses: vec![ip("192.168.1.10"), ip("172.17.0.1")],
			cni_ready: true,
			..FakeState::default()
		};
		state.routes.insert(ip("8.8.8.8"), ip("192.168.1.10"));
		state.routes.insert(ip("1.1.1.1"), ip("192.168.1.10"));
		for (path, contents) in [
			("/etc/os-release", "NAME=\"Ubuntu\"\nID=ubuntu\nID_LIKE=debian\n"),
			("/etc/machine-id", "a218e8c2c31942e3acdbae7f4f532c2d\n"),
			("/etc/fstab", "UUID=1234 / ext4 defaults 0 1\n/swap.img none swap sw 0 0\n"),
			("/proc/swaps", "Filename\t\t\t\tType\t\tSize\t\tUsed\t\tPriority\n/swap.img  file  2097148  0  -2\n"),
			("/proc/sys/net/ipv4/ip_forward", "0\n"),
		] {
			state.files.insert(PathBuf::from(path), contents.as_bytes().to_vec());
		}
		for package_name in ["kubelet", "kubeadm", "kubectl"] {
			state
				.available
				.insert(package_name.into(), "1.34.2-1.1".into());
		}
		state
			.available
			.insert("containerd".into(), "1.7.24-0ubuntu1".into());
		let base = format!(
			"https://github.com/cilium/cilium-cli/releases/download/{CILIUM_RELEASE}"
		);
		state.downloads.insert(
			"https://raw.githubusercontent.com/cilium/cilium-cli/main/stable.txt".into(),
			format!("{CILIUM_RELEASE}\n").into_bytes(),
		);
		for arch in ["amd64", "arm64"] {
			let artifact = format!("cilium-linux-{arch}.tar.gz");
			state
				.downloads
				.insert(format!("{base}/{artifact}"), CILIUM_ARCHIVE.to_vec());
			state.downloads.insert(
				format!("{base}/{artifact}.sha256sum"),
				format!("{}  {artifact}\n", sha256_hex(CILIUM_ARCHIVE)).into_bytes(),
			);
		}
		FakeHost {
			state: Rc::new(RefCell::new(state)),
		}
	}

	pub fn host(&self) -> Host {
		Host {
			system: Box::new(self.clone()),
			pkg: Box::new(self.clone()),
			services: Box::new(self.clone()),
			downloader: Box::new(self.clone()),
			cluster: Box::new(self.clone()),
			cni: Box::new(self.clone()),
		}
	}

	pub fn state(&self) -> RefMut<'_, FakeState> {
		self.state.borrow_mut()
	}

	pub fn file(&self, path: &str) -> Option<String> {
		self.state()
			.files
			.get(Path::new(path))
			.map(|bytes| String::from_utf8_lossy(bytes).into_owned())
	}

	pub fn put_file(&self, path: &str, contents: &str) {
		self.state()
			.files
			.insert(PathBuf::from(path), contents.as_bytes().to_vec());
	}

	pub fn remove_file(&self, path: &str) {
		self.state().files.remove(Path::new(path));
	}

	pub fn corrupt_cilium_archive(&self) {
		let mut state = self.state();
		for (url, bytes) in state.downloads.iter_mut() {
			if url.ends_with(".tar.gz") {
				bytes.extend_from_slice(b"tampered");
			}
		}
	}

	pub fn mutations(&self) -> Vec<String> {
		self.state().mutations.clone()
	}

	fn mutate(&self, what: String) -> RefMut<'_, FakeState> {
		let mut state = self.state();
		state.mutations.push(what);
		state
	}
}

impl HostSystem for FakeHost {
	fn read_file(&self, path: &Path) -> Result<Option<String>, InstallError> {
		Ok(self
			.state()
			.files
			.get(path)
			.map(|bytes| String::from_utf8_lossy(bytes).into_owned()))
	}

	fn write_file(&self, path: &Path, contents: &[u8]) -> Result<(), InstallError> {
		if self.state().read_only.contains(path) {
			return Err(io::Error::from(io::ErrorKind::PermissionDenied).into());
		}
		self.mutate(format!("write {}", path.display()))
			.files
			.insert(path.to_path_buf(), contents.to_vec());
		Ok(())
	}

	fn create_dir_all(&self, _path: &Path) -> Result<(), InstallError> {
		Ok(())
	}

	fn exists(&self, path: &Path) -> bool {
		self.state().files.contains_key(path)
	}

	fn chown(&self, path: &Path, user: &InvokingUser) -> Result<(), InstallError> {
		self.mutate(format!("chown {}", path.display()))
			.owners
			.insert(path.to_path_buf(), user.name.clone());
		Ok(())
	}

	fn is_owned_by(&self, path: &Path, user: &InvokingUser) -> Result<bool, InstallError> {
		let state = self.state();
		if !state.files.contains_key(path) {
			return Err(io::Error::from(io::ErrorKind::NotFound).into());
		}
		Ok(state.owners.get(path) == Some(&user.name))
	}

	fn install_executable(
		&self,
		archive: &[u8],
		_member: &str,
		dest: &Path,
	) -> Result<(), InstallError> {
		self.mutate(format!("install {}", dest.display()))
			.files
			.insert(dest.to_path_buf(), archive.to_vec());
		Ok(())
	}

	fn effective_uid(&self) -> Result<u32, InstallError> {
		Ok(self.state().uid)
	}

	fn invoking_user(&self) -> Result<InvokingUser, InstallError> {
		Ok(self.state().user.clone())
	}

	fn hostname(&self) -> Result<String, InstallError> {
		Ok(self.state().hostname.clone())
	}

	fn set_hostname(&self, name: &str) -> Result<(), InstallError> {
		self.mutate(format!("hostname {name}")).hostname = name.to_owned();
		Ok(())
	}

	fn architecture(&self) -> String {
		self.state().arch.clone()
	}

	fn load_module(&self, name: &str) -> Result<(), InstallError> {
		self.mutate(format!("modprobe {name}"))
			.files
			.insert(Path::new("/sys/module").join(name), Vec::new());
		Ok(())
	}

	fn swapoff_all(&self) -> Result<(), InstallError> {
		self.mutate("swapoff -a".into()).files.insert(
			PathBuf::from("/proc/swaps"),
			PROC_SWAPS_HEADER.as_bytes().to_vec(),
		);
		Ok(())
	}

	fn reload_sysctl(&self) -> Result<(), InstallError> {
		let mut state = self.mutate("sysctl --system".into());
		let settings = state
			.files
			.iter()
			.filter(|(path, _)| path.starts_with("/etc/sysctl.d"))
			.flat_map(|(_, contents)| {
				String::from_utf8_lossy(contents)
					.lines()
					.filter_map(|line| {
						let (key, value) = line.split_once('=')?;
						Some((key.trim().to_owned(), value.trim().to_owned()))
					})
					.collect::<Vec<_>>()
			})
			.collect::<Vec<_>>();
		for (key, value) in settings {
			let proc_path = Path::new("/proc/sys").join(key.replace('.', "/"));
			state.files.insert(proc_path, format!("{value}\n").into_bytes());
		}
		Ok(())
	}

	fn route_source(&self, target: IpAddr) -> Result<IpAddr, InstallError> {
		let mut state = self.state();
		state.route_queries.push(target);
		state
			.routes
			.get(&target)
			.copied()
			.ok_or_else(|| InstallError::Environment(format!("no route to {target}")))
	}

	fn host_addresses(&self) -> Result<Vec<IpAddr>, InstallError> {
		let mut state = self.state();
		state.address_queries += 1;
		Ok(state.addresses.clone())
	}

	fn command_output(&self, program: &str, args: &[&str]) -> Result<String, InstallError> {
		match (program, args) {
			("containerd", ["config", "default"]) => Ok(DEFAULT_CONTAINERD_CONFIG.to_owned()),
			_ => Err(InstallError::CommandFailed {
				cmd: format!("{program} {}", args.join(" ")),
				status: failed_status(),
				stderr: Some("unknown command in fake host".into()),
			}),
		}
	}
}

impl PackageManager for FakeHost {
	fn update(&self) -> Result<(), InstallError> {
		self.mutate("apt-get update".into());
		Ok(())
	}

	fn upgrade(&self) -> Result<(), InstallError> {
		self.mutate("apt-get upgrade".into());
		Ok(())
	}

	fn install(&self, package_names: &[&str]) -> Result<(), InstallError> {
		let mut state = self.mutate(format!("apt-get install {}", package_names.join(" ")));
		for package_name in package_names {
			let version = state.available.get(*package_name).cloned().ok_or_else(|| {
				InstallError::CommandFailed {
					cmd: format!("apt-get install {package_name}"),
					status: failed_status(),
					stderr: Some(format!("Unable to locate package {package_name}")),
				}
			})?;
			let held = state
				.packages
				.get(*package_name)
				.is_some_and(|package| package.held);
			state
				.packages
				.insert((*package_name).to_owned(), FakePackage { version, held });
		}
		Ok(())
	}

	fn hold(&self, package_names: &[&str]) -> Result<(), InstallError> {
		let mut state = self.mutate(format!("apt-mark hold {}", package_names.join(" ")));
		for package_name in package_names {
			if let Some(package) = state.packages.get_mut(*package_name) {
				package.held = true;
			}
		}
		Ok(())
	}

	fn is_installed(&self, package_name: &str) -> Result<bool, InstallError> {
		Ok(self.state().packages.contains_key(package_name))
	}

	fn is_held(&self, package_name: &str) -> Result<bool, InstallError> {
		Ok(self
			.state()
			.packages
			.get(package_name)
			.is_some_and(|package| package.held))
	}

	fn installed_version(&self, package_name: &str) -> Result<Option<String>, InstallError> {
		Ok(self
			.state()
			.packages
			.get(package_name)
			.map(|package| package.version.clone()))
	}

	fn add_source(&self, source: &PackageSource) -> Result<(), InstallError> {
		let mut state = self.mutate(format!("add source {}", source.list_path.display()));
		state
			.files
			.insert(source.keyring_path.clone(), b"keyring".to_vec());
		state
			.files
			.insert(source.list_path.clone(), source.entry.as_bytes().to_vec());
		Ok(())
	}
}

impl ServiceManager for FakeHost {
	fn enable(&self, unit: &str) -> Result<(), InstallError> {
		self.mutate(format!("systemctl enable {unit}"))
			.services
			.entry(unit.to_owned())
			.or_default()
			.enabled = true;
		Ok(())
	}

	fn restart(&self, unit: &str) -> Result<(), InstallError> {
		let mut state = self.mutate(format!("systemctl restart {unit}"));
		if state.failing_restarts.contains(unit) {
			return Err(InstallError::CommandFailed {
				cmd: format!("systemctl restart {unit}"),
				status: failed_status(),
				stderr: None,
			});
		}
		state.services.entry(unit.to_owned()).or_default().active = true;
		Ok(())
	}

	fn is_active(&self, unit: &str) -> bool {
		self.state()
			.services
			.get(unit)
			.is_some_and(|service| service.active)
	}

	fn is_enabled(&self, unit: &str) -> bool {
		self.state()
			.services
			.get(unit)
			.is_some_and(|service| service.enabled)
	}
}

impl Downloader for FakeHost {
	fn fetch(&self, url: &str) -> Result<Vec<u8>, InstallError> {
		let mut state = self.state();
		state.fetches.push(url.to_owned());
		if let Some(remaining) = state.flaky_downloads.get_mut(url) {
			if *remaining > 0 {
				*remaining -= 1;
				return Err(InstallError::network(
					format!("download of {url}"),
					"connection timed out",
				));
			}
		}
		state
			.downloads
			.get(url)
			.cloned()
			.ok_or_else(|| InstallError::network(format!("download of {url}"), "404 Not Found"))
	}
}

impl ClusterApi for FakeHost {
	fn is_initialized(&self) -> bool {
		self.state().cluster_initialized
	}

	fn admin_kubeconfig(&self) -> PathBuf {
		PathBuf::from(ADMIN_KUBECONFIG)
	}

	fn init(&self, pod_cidr: &str, advertise_address: IpAddr) -> Result<(), InstallError> {
		let mut state = self.mutate(format!("kubeadm init {pod_cidr} {advertise_address}"));
		if state.cluster_initialized {
			return Err(InstallError::StateConflict("cluster already initialized".into()));
		}
		state
			.init_calls
			.push((pod_cidr.to_owned(), advertise_address));
		state.cluster_initialized = true;
		state.files.insert(
			PathBuf::from(ADMIN_KUBECONFIG),
			format!("apiVersion: v1\nkind: Config\nserver: https://{advertise_address}:6443\n")
				.into_bytes(),
		);
		Ok(())
	}

	fn issue_join_token(&self) -> Result<JoinCredential, InstallError> {
		let mut state = self.state();
		if !state.cluster_initialized {
			return Err(InstallError::network(
				"join token issuance",
				"connection refused",
			));
		}
		state.join_tokens_issued += 1;
		Ok(JoinCredential {
			token: format!("abcdef.{:016}", state.join_tokens_issued),
			ca_cert_hash: format!("sha256:{}", sha256_hex(b"cluster-ca")),
			control_plane_endpoint: "192.168.1.10:6443".into(),
		})
	}

	fn query_nodes(&self) -> Result<Vec<String>, InstallError> {
		let state = self.state();
		if !state.cluster_initialized {
			return Err(InstallError::Verification("API server unreachable".into()));
		}
		Ok(vec![state.hostname.clone()])
	}

	fn component_version(&self, component: Component) -> Result<String, InstallError> {
		self.state()
			.packages
			.get(component.binary())
			.map(|package| format!("v{}", package.version.split('-').next().unwrap_or_default()))
			.ok_or_else(|| {
				InstallError::Verification(format!("{} is not installed", component.binary()))
			})
	}
}

impl CniCli for FakeHost {
	fn running_version(&self) -> Result<Option<String>, InstallError> {
		Ok(self.state().cni_version.clone())
	}

	fn install(&self, version: &str, _pod_cidr: &str) -> Result<(), InstallError> {
		let mut state = self.mutate(format!("cilium install {version}"));
		if !state
			.files
			.contains_key(Path::new("/usr/local/bin/cilium"))
		{
			return Err(InstallError::CommandFailed {
				cmd: "cilium install".into(),
				status: failed_status(),
				stderr: Some("cilium: command not found".into()),
			});
		}
		state.cni_version = Some(version.to_owned());
		Ok(())
	}

	fn is_ready(&self) -> bool {
		let state = self.state();
		state.cni_version.is_some() && state.cni_ready
	}
}
