use tracing_subscriber::{fmt, EnvFilter};

/// Installs the global `tracing` subscriber from the configured filter
/// directives, falling back to `info` if the config value doesn't parse.
///
/// Call exactly once, at process start.
pub fn init(filter_directives: &str) {
	let filter = EnvFilter::try_new(filter_directives).unwrap_or_else(|err| {
		eprintln!("invalid log filter {filter_directives:?} ({err}), falling back to \"info\"");
		EnvFilter::new("info")
	});

	fmt().with_env_filter(filter).with_target(true).init();
}
