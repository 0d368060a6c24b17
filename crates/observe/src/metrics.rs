use {
    prometheus::{Encoder, Registry, TextEncoder},
    prometheus_metric_storage::StorageRegistry,
    std::sync::OnceLock,
};

static REGISTRY: OnceLock<StorageRegistry> = OnceLock::new();

/// Configures the global registry with a metric name prefix.
///
/// Has to be called before the first metric is created, otherwise the
/// default un-prefixed registry is already in use and the call is ignored.
pub fn setup_registry(prefix: Option<String>) -> prometheus::Result<()> {
    let registry = Registry::new_custom(prefix, None)?;
    if REGISTRY.set(StorageRegistry::new(registry)).is_err() {
        ::tracing::warn!("metrics registry already initialized");
    }
    Ok(())
}

pub fn get_storage_registry() -> &'static StorageRegistry {
    REGISTRY.get_or_init(|| StorageRegistry::new(Registry::new()))
}

pub fn get_registry() -> &'static Registry {
    get_storage_registry().registry()
}

/// Renders all registered metrics in the prometheus text format.
pub fn encode() -> prometheus::Result<String> {
    let mut buffer = Vec::new();
    TextEncoder::new().encode(&get_registry().gather(), &mut buffer)?;
    Ok(String::from_utf8_lossy(&buffer).into_owned())
}
