use {
    axum::{Router, extract::State, http::StatusCode, routing::get},
    prometheus::Encoder,
    std::{collections::HashMap, net::SocketAddr, sync::Arc, sync::OnceLock},
    tokio::task::JoinHandle,
};

/// Global metrics registry used by all components.
static REGISTRY: OnceLock<prometheus_metric_storage::StorageRegistry> = OnceLock::new();

/// Configure the global metrics registry with an optional common prefix and
/// labels. Call at most once, before any [`get_registry`] call, ideally at
/// the very beginning of `main`.
///
/// # Panics
///
/// Panics if called twice, after a [`get_registry`] call, or with an invalid
/// configuration.
pub fn setup_registry(prefix: Option<String>, labels: Option<HashMap<String, String>>) {
    let registry = prometheus::Registry::new_custom(prefix, labels).unwrap();
    let storage_registry = prometheus_metric_storage::StorageRegistry::new(registry);
    REGISTRY.set(storage_registry).unwrap();
}

/// Like [`setup_registry`], but can be called multiple times in a row.
/// Later calls are ignored.
///
/// Useful for tests.
pub fn setup_registry_reentrant(prefix: Option<String>, labels: Option<HashMap<String, String>>) {
    let registry = prometheus::Registry::new_custom(prefix, labels).unwrap();
    let storage_registry = prometheus_metric_storage::StorageRegistry::new(registry);
    REGISTRY.set(storage_registry).ok();
}

pub fn get_registry() -> &'static prometheus::Registry {
    get_storage_registry().registry()
}

/// Get the global metric storage registry, initializing a default one if
/// [`setup_registry`] has not run. Falling back instead of panicking keeps
/// unit tests from having to set up the registry individually.
pub fn get_storage_registry() -> &'static prometheus_metric_storage::StorageRegistry {
    REGISTRY.get_or_init(prometheus_metric_storage::StorageRegistry::default)
}

pub fn encode(registry: &prometheus::Registry) -> String {
    let encoder = prometheus::TextEncoder::new();
    let mut buffer = Vec::new();
    encoder.encode(&registry.gather(), &mut buffer).unwrap();
    String::from_utf8(buffer).unwrap()
}

#[async_trait::async_trait]
pub trait LivenessChecking: Send + Sync {
    async fn is_alive(&self) -> bool;
}

/// Serves `/metrics` and `/liveness` on the given address in a background
/// task.
pub fn serve_metrics(liveness: Arc<dyn LivenessChecking>, address: SocketAddr) -> JoinHandle<()> {
    let app = Router::new()
        .route("/metrics", get(metrics_handler))
        .route("/liveness", get(liveness_handler))
        .with_state(liveness);
    tracing::info!(%address, "serving metrics");
    tokio::task::spawn(async move {
        let listener = tokio::net::TcpListener::bind(address)
            .await
            .expect("failed to bind metrics server");
        axum::serve(listener, app)
            .await
            .expect("metrics server died");
    })
}

async fn metrics_handler() -> String {
    encode(get_registry())
}

async fn liveness_handler(State(liveness): State<Arc<dyn LivenessChecking>>) -> StatusCode {
    if liveness.is_alive().await {
        StatusCode::NO_CONTENT
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    }
}
