use tracing_subscriber::EnvFilter;

/// Installs the global tracing subscriber. `RUST_LOG` wins when set.
pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,chat_service=debug"));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}
