use std::panic;
use tracing_journald::layer as journald_layer;
use tracing_panic::panic_hook;
use tracing_subscriber::{fmt, layer::SubscriberExt, registry::Registry, EnvFilter};

// journalctl -t k8s-provision
pub fn init() {
	panic::set_hook(Box::new(panic_hook));
	let log_sub = Registry::default()
		.with(
			EnvFilter::builder()
				.with_default_directive(tracing::Level::INFO.into())
				.from_env_lossy(),
		)
		.with(
			fmt::layer()
				.with_writer(std::io::stderr)
				.with_ansi(true)
				.with_file(true)
				.with_line_number(true)
				.with_target(false)
				.with_timer(fmt::time::SystemTime)
				.compact(),
		)
		.with(
			journald_layer()
				.map_err(|err| eprintln!("journald not available: {err}"))
				.ok()
				.map(|layr| layr.with_syslog_identifier("k8s-provision".into())),
		);
	if let Err(err) = tracing::subscriber::set_global_default(log_sub) {
		eprintln!("Failed to set log subscriber: {err}");
	}
}
