use credential_audit::config::BackendConfig;
use credential_audit::error::AppError;
use credential_audit::workflows::verification::HttpVerificationBackend;
use metrics_exporter_prometheus::PrometheusHandle;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;

#[derive(Clone)]
pub(crate) struct AppState {
    pub(crate) readiness: Arc<AtomicBool>,
    pub(crate) metrics: Arc<PrometheusHandle>,
}

/// Remote backend client, with an optional base URL override from the command line.
pub(crate) fn http_backend(
    config: &BackendConfig,
    base_url_override: Option<String>,
) -> Result<HttpVerificationBackend, AppError> {
    let base_url = base_url_override.unwrap_or_else(|| config.base_url.clone());
    Ok(HttpVerificationBackend::new(base_url, config.timeout)?)
}
