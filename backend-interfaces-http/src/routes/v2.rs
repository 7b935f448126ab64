use axum::Router;

use backend_application::AppState;

use crate::handlers::{audit_handlers, ops_handlers};

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route(
            "/v2/audit/events",
            axum::routing::post(audit_handlers::ingest_audit_entries),
        )
        .route(
            "/v2/audit/logs",
            axum::routing::get(audit_handlers::list_audit_logs),
        )
        .route(
            "/v2/audit/flags",
            axum::routing::get(audit_handlers::list_flags),
        )
        .route(
            "/v2/ops/health/live",
            axum::routing::get(ops_handlers::health_live),
        )
        .route(
            "/v2/ops/health/ready",
            axum::routing::get(ops_handlers::health_ready),
        )
        .route(
            "/v2/ops/metrics/prometheus",
            axum::routing::get(ops_handlers::metrics_prometheus),
        )
        .with_state(state)
}
