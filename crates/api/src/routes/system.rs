//! Health check and Prometheus scrape endpoints.

use axum::Json;
use axum::extract::State;
use axum::http::StatusCode;
use metrics_exporter_prometheus::PrometheusHandle;
use serde::Serialize;
use store::Store;

use crate::state::SharedState;

#[derive(Debug, Serialize)]
pub struct HealthView {
    pub status: &'static str,
}

/// Reports whether the store is reachable.
pub async fn health<S: Store + Clone + 'static>(
    State(state): State<SharedState<S>>,
) -> (StatusCode, Json<HealthView>) {
    match state.store.ping().await {
        Ok(()) => (StatusCode::OK, Json(HealthView { status: "ok" })),
        Err(err) => {
            tracing::warn!(error = %err, "health check failed");
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(HealthView {
                    status: "unavailable",
                }),
            )
        }
    }
}

/// Renders metrics in Prometheus text format.
pub async fn metrics(State(handle): State<PrometheusHandle>) -> String {
    handle.render()
}
