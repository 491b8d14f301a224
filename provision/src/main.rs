mod config;
mod context;
mod error;
mod lock;
mod logging;
mod setup;

use clap::Parser;
use config::{Cli, Config};
use context::ProvisioningContext;
use lock::RunLock;
use setup::Sequencer;
use std::{
	io::{self, BufRead, IsTerminal, Write},
	process,
};
use tracing::{error, info};

const CONFIG_EXIT_CODE: i32 = 2;

/// Asks for the role marker when run by hand without one.
fn prompt_role() -> Option<String> {
	if !io::stdin().is_terminal() {
		return None;
	}
	print!("Node role ('master' for the control plane, Enter for a worker): ");
	io::stdout().flush().ok()?;
	let mut answer = String::new();
	io::stdin().lock().read_line(&mut answer).ok()?;
	Some(answer)
}

fn main() {
	dotenvy::dotenv().ok();
	let cli = Cli::parse();
	logging::init();
	let config = match Config::from_cli(&cli) {
		Ok(config) => config,
		Err(err) => {
			error!("{err}");
			process::exit(CONFIG_EXIT_CODE);
		}
	};
	let role_signal = cli.role.clone().or_else(prompt_role);
	info!(
		"Provisioning with Kubernetes {}, cilium {}, pod network {}.",
		config.kubernetes_channel, config.cni_version, config.pod_cidr
	);
	let host = setup::local_host();
	let mut ctx = ProvisioningContext::new(&config);
	let steps = setup::steps(&config, role_signal);
	let report = match Sequencer::new(&host, config.retry).run_guarded(&mut ctx, &steps, || {
		RunLock::acquire(&cli.lock_file)
	}) {
		Ok(report) => report,
		Err(err) => {
			error!("Cannot take run lock: {err}");
			process::exit(CONFIG_EXIT_CODE);
		}
	};
	println!("{report}");
	process::exit(report.exit_code());
}
