use crate::infra::AppState;
use alloy_dispatch::crm::{ContactGateway, JobRecordGateway, MessagingGateway};
use alloy_dispatch::workflows::dispatch::{debug_router, dispatch_router, DispatchService};
use alloy_dispatch::workflows::leads::{lead_router, LeadIntakeService};
use axum::http::{header, StatusCode};
use axum::response::IntoResponse;
use axum::routing::get;
use axum::{Extension, Json, Router};
use serde_json::json;
use std::sync::Arc;

const SERVICE_NAME: &str = "alloy-dispatcher";

pub(crate) fn with_service_routes<M, J, C>(
    dispatch: Arc<DispatchService<M, J>>,
    leads: Arc<LeadIntakeService<C>>,
    debug_routes: bool,
) -> Router
where
    M: MessagingGateway + 'static,
    J: JobRecordGateway + 'static,
    C: ContactGateway + 'static,
{
    let mut router = Router::new()
        .route("/", get(root))
        .route("/health", get(healthcheck))
        .route("/ready", get(readiness_endpoint))
        .route("/metrics", get(metrics_endpoint))
        .merge(dispatch_router(dispatch.clone()))
        .merge(lead_router(leads));

    if debug_routes {
        router = router.merge(debug_router(dispatch));
    }
    router
}

pub(crate) async fn root() -> Json<serde_json::Value> {
    Json(json!({ "ok": true, "service": SERVICE_NAME, "status": "online" }))
}

pub(crate) async fn healthcheck() -> Json<serde_json::Value> {
    Json(json!({ "status": "ok" }))
}

pub(crate) async fn readiness_endpoint(Extension(state): Extension<AppState>) -> impl IntoResponse {
    let ready = state.readiness.load(std::sync::atomic::Ordering::Relaxed);
    let status = if ready {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    let payload = if ready {
        json!({ "status": "ready" })
    } else {
        json!({ "status": "initializing" })
    };

    (status, Json(payload))
}

pub(crate) async fn metrics_endpoint(Extension(state): Extension<AppState>) -> impl IntoResponse {
    (
        StatusCode::OK,
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        state.metrics.render(),
    )
}
