use tracing_subscriber::EnvFilter;

/// Filter directives, e.g. `coursevaultd=debug`.
pub const LOG_ENV: &str = "COURSEVAULT_LOG";

/// Logs go to stderr; stdout carries IPC responses only.
pub fn init() {
    let filter = EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt()
        .compact()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(true)
        .try_init();
}
