use crate::error::InstallError;
use crate::setup::host::{HostSystem, InvokingUser};
use crate::setup::utils::exec;
use std::{
	env, fs, io,
	net::IpAddr,
	os::unix::fs::{chown, MetadataExt},
	path::{Path, PathBuf},
	process,
};

/// The machine the provisioner runs on.
pub struct LocalHost;

impl LocalHost {
	const PROC_STATUS: &str = "/proc/self/status";

	/// Effective uid from the `Uid:` line of `/proc/<pid>/status`.
	pub fn parse_effective_uid(status: &str) -> Option<u32> {
		status
			.lines()
			.find_map(|line| line.strip_prefix("Uid:"))
			.and_then(|ids| ids.split_whitespace().nth(1))
			.and_then(|uid| uid.parse().ok())
	}

	pub fn parse_passwd_entry(entry: &str) -> Option<InvokingUser> {
		let fields = entry.trim().split(':').collect::<Vec<_>>();
		if fields.len() < 7 {
			return None;
		}
		Some(InvokingUser {
			name: fields[0].to_owned(),
			uid: fields[2].parse().ok()?,
			gid: fields[3].parse().ok()?,
			home: PathBuf::from(fields[5]),
		})
	}

	/// The address after `src` in `ip route get` output.
	pub fn parse_route_source(output: &str) -> Option<IpAddr> {
		let mut words = output.split_whitespace();
		words.find(|word| *word == "src")?;
		words.next()?.parse().ok()
	}

	pub fn parse_addresses(output: &str) -> Vec<IpAddr> {
		output
			.split_whitespace()
			.filter_map(|word| word.parse().ok())
			.collect()
	}

	fn root() -> InvokingUser {
		InvokingUser {
			name: "root".into(),
			uid: 0,
			gid: 0,
			home: PathBuf::from("/root"),
		}
	}
}

impl HostSystem for LocalHost {
	fn read_file(&self, path: &Path) -> Result<Option<String>, InstallError> {
		match fs::read_to_string(path) {
			Ok(contents) => Ok(Some(contents)),
			Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(None),
			Err(err) => Err(err.into()),
		}
	}

	fn write_file(&self, path: &Path, contents: &[u8]) -> Result<(), InstallError> {
		fs::write(path, contents)?;
		Ok(())
	}

	fn create_dir_all(&self, path: &Path) -> Result<(), InstallError> {
		fs::create_dir_all(path)?;
		Ok(())
	}

	fn exists(&self, path: &Path) -> bool {
		path.exists()
	}

	fn chown(&self, path: &Path, user: &InvokingUser) -> Result<(), InstallError> {
		chown(path, Some(user.uid), Some(user.gid))?;
		Ok(())
	}

	fn is_owned_by(&self, path: &Path, user: &InvokingUser) -> Result<bool, InstallError> {
		let metadata = fs::metadata(path)?;
		Ok(metadata.uid() == user.uid && metadata.gid() == user.gid)
	}

	fn install_executable(
		&self,
		archive: &[u8],
		member: &str,
		dest: &Path,
	) -> Result<(), InstallError> {
		let work_dir = env::temp_dir().join(format!("k8s-provision-{}", process::id()));
		fs::create_dir_all(&work_dir)?;
		let archive_path = work_dir.join(format!("{member}.tar.gz"));
		fs::write(&archive_path, archive)?;
		let work_dir_arg = work_dir.to_string_lossy();
		let result = exec::output(
			"tar",
			&[
				"xzf",
				&archive_path.to_string_lossy(),
				"-C",
				&work_dir_arg,
				member,
			],
		)
		.and_then(|_| {
			exec::output(
				"install",
				&[
					"-m",
					"0755",
					&work_dir.join(member).to_string_lossy(),
					&dest.to_string_lossy(),
				],
			)
		});
		fs::remove_dir_all(&work_dir)?;
		result.map(drop)
	}

	fn effective_uid(&self) -> Result<u32, InstallError> {
		let status = fs::read_to_string(LocalHost::PROC_STATUS)?;
		LocalHost::parse_effective_uid(&status).ok_or_else(|| {
			InstallError::Environment(format!("no Uid line in {}", LocalHost::PROC_STATUS))
		})
	}

	fn invoking_user(&self) -> Result<InvokingUser, InstallError> {
		let name = match env::var("SUDO_USER") {
			Ok(name) if !name.is_empty() && name != "root" => name,
			_ => return Ok(LocalHost::root()),
		};
		let entry = exec::stdout("getent", &["passwd", &name]).map_err(|err| {
			InstallError::Environment(format!("cannot resolve invoking user {name}: {err}"))
		})?;
		LocalHost::parse_passwd_entry(&entry).ok_or_else(|| {
			InstallError::Environment(format!("malformed passwd entry for {name}"))
		})
	}

	fn hostname(&self) -> Result<String, InstallError> {
		exec::stdout("hostname", &[])
	}

	fn set_hostname(&self, name: &str) -> Result<(), InstallError> {
		exec::output("hostnamectl", &["set-hostname", name]).map(drop)
	}

	fn architecture(&self) -> String {
		env::consts::ARCH.to_owned()
	}

	fn load_module(&self, name: &str) -> Result<(), InstallError> {
		exec::output("modprobe", &[name]).map(drop)
	}

	fn swapoff_all(&self) -> Result<(), InstallError> {
		exec::output("swapoff", &["-a"]).map(drop)
	}

	fn reload_sysctl(&self) -> Result<(), InstallError> {
		exec::output("sysctl", &["--system"]).map(drop)
	}

	fn route_source(&self, target: IpAddr) -> Result<IpAddr, InstallError> {
		let family = if target.is_ipv4() { "-4" } else { "-6" };
		let output = exec::stdout("ip", &[family, "route", "get", &target.to_string()])?;
		LocalHost::parse_route_source(&output).ok_or_else(|| {
			InstallError::Environment(format!("no source address in route to {target}"))
		})
	}

	fn host_addresses(&self) -> Result<Vec<IpAddr>, InstallError> {
		Ok(LocalHost::parse_addresses(&exec::stdout(
			"hostname",
			&["-I"],
		)?))
	}

	fn command_output(&self, program: &str, args: &[&str]) -> Result<String, InstallError> {
		let output = exec::output(program, args)?;
		Ok(String::from_utf8(output.stdout)?)
	}
}
