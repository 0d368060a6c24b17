use {
    std::sync::Once,
    tracing_subscriber::{EnvFilter, fmt, prelude::*},
};

/// Initializes the global tracing subscriber writing to stderr. Only the
/// first call has an effect, so tests and binaries can call this freely.
pub fn initialize(env_filter: &str, use_json: bool) {
    static ONCE: Once = Once::new();
    ONCE.call_once(|| set_tracing_subscriber(env_filter, use_json));
}

fn set_tracing_subscriber(env_filter: &str, use_json: bool) {
    let filter = EnvFilter::try_new(env_filter).unwrap_or_else(|err| {
        eprintln!("invalid log filter {env_filter:?}: {err}; falling back to \"info\"");
        EnvFilter::new("info")
    });
    let registry = tracing_subscriber::registry().with(filter);
    if use_json {
        registry
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        registry
            .with(fmt::layer().with_writer(std::io::stderr))
            .init();
    }
    ::tracing::debug!(%env_filter, "initialized tracing");
}
