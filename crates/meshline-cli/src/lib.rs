use tracing_subscriber::EnvFilter;

/// Installs the process-wide `tracing` subscriber, level driven by
/// `RUST_LOG` (default `info`). Called once from each binary's `main`.
pub fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();
}
