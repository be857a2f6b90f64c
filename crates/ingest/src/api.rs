//! HTTP API: snapshot ingest plus health checks and Prometheus metrics

use crate::buffer::IngestBuffer;
use crate::normalize::{normalize_body, IngestError};
use axum::{
    body::Bytes,
    extract::{Query, State},
    http::{Method, StatusCode},
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use monitor_lib::{
    health::{ComponentStatus, HealthRegistry},
    observability::MonitorMetrics,
};
use prometheus::{Encoder, TextEncoder};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::future::Future;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tracing::{debug, info, warn};

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub buffer: IngestBuffer,
    pub health_registry: HealthRegistry,
    pub metrics: MonitorMetrics,
}

impl AppState {
    pub fn new(buffer: IngestBuffer, health_registry: HealthRegistry, metrics: MonitorMetrics) -> Self {
        Self {
            buffer,
            health_registry,
            metrics,
        }
    }
}

/// Successful POST response
#[derive(Debug, Serialize, Deserialize)]
pub struct IngestResponse {
    pub ok: bool,
    pub added: usize,
    pub size: usize,
}

#[derive(Debug, Deserialize)]
pub struct IngestQuery {
    all: Option<String>,
}

impl IngestQuery {
    fn wants_all(&self) -> bool {
        matches!(self.all.as_deref(), Some("1") | Some("true"))
    }
}

impl IntoResponse for IngestError {
    fn into_response(self) -> Response {
        (
            StatusCode::BAD_REQUEST,
            Json(json!({ "ok": false, "error": self.to_string() })),
        )
            .into_response()
    }
}

/// Latest snapshot (or `null`), or every retained snapshot with `?all=1`
async fn get_snapshots(
    State(state): State<Arc<AppState>>,
    Query(query): Query<IngestQuery>,
) -> Json<Value> {
    let body = if query.wants_all() {
        serde_json::to_value(state.buffer.all().await)
    } else {
        serde_json::to_value(state.buffer.latest().await)
    };
    Json(body.unwrap_or(Value::Null))
}

/// Accept one snapshot object or an array of them
async fn post_snapshots(
    State(state): State<Arc<AppState>>,
    body: Bytes,
) -> Result<Json<IngestResponse>, IngestError> {
    let now_ms = chrono::Utc::now().timestamp_millis();

    let snapshots = match normalize_body(&body, now_ms) {
        Ok(snapshots) => snapshots,
        Err(e) => {
            warn!(error = %e, bytes = body.len(), "Rejected ingest body");
            state.metrics.inc_ingest_requests("rejected");
            return Err(e);
        }
    };

    let added = snapshots.len();
    let size = state.buffer.push_many(snapshots).await;

    state.metrics.inc_ingest_requests("ok");
    state.metrics.set_ingest_buffer_entries(size);
    if added > 0 {
        state.health_registry.record_update(now_ms).await;
    }
    debug!(added = added, size = size, "Snapshots ingested");

    Ok(Json(IngestResponse {
        ok: true,
        added,
        size,
    }))
}

/// Plain OPTIONS without CORS preflight headers
async fn options_ok() -> StatusCode {
    StatusCode::NO_CONTENT
}

/// Health check response - returns 200 if healthy or degraded, 503 if unhealthy
async fn healthz(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let health = state.health_registry.health().await;

    let status_code = match health.status {
        ComponentStatus::Healthy => StatusCode::OK,
        ComponentStatus::Degraded => StatusCode::OK,
        ComponentStatus::Unhealthy => StatusCode::SERVICE_UNAVAILABLE,
    };

    (status_code, Json(health))
}

/// Readiness check response - returns 200 if ready, 503 if not ready
async fn readyz(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let readiness = state.health_registry.readiness().await;

    let status_code = if readiness.ready {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    (status_code, Json(readiness))
}

/// Prometheus metrics endpoint
async fn metrics() -> impl IntoResponse {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();

    if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
        warn!(error = %e, "Failed to encode metrics");
        return (
            StatusCode::INTERNAL_SERVER_ERROR,
            [("content-type", "text/plain; charset=utf-8")],
            Vec::new(),
        );
    }

    (
        StatusCode::OK,
        [("content-type", "text/plain; charset=utf-8")],
        buffer,
    )
}

/// Create the API router with the ingest endpoint mounted at `route`
pub fn create_router(state: Arc<AppState>, route: &str) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers(Any);

    Router::new()
        .route(
            route,
            get(get_snapshots).post(post_snapshots).options(options_ok),
        )
        .layer(cors)
        .route("/healthz", get(healthz))
        .route("/readyz", get(readyz))
        .route("/metrics", get(metrics))
        .with_state(state)
}

/// Start the API server and run until `shutdown` resolves
pub async fn serve<F>(port: u16, route: &str, state: Arc<AppState>, shutdown: F) -> anyhow::Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let app = create_router(state, route);

    let addr = format!("0.0.0.0:{}", port);
    info!(addr = %addr, route = %route, "Starting ingest server");

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .await?;

    Ok(())
}
