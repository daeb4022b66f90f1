use std::sync::Arc;

use axum::{
    Router,
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Json},
    routing::get,
};
use serde::Serialize;

use crate::app_state::AppState;

#[derive(Serialize)]
struct HealthResponse<'a> {
    status: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    users: Option<usize>,
}

async fn healthz() -> impl IntoResponse {
    metrics::counter!("health_checks_total", "endpoint" => "healthz", "status" => "ok")
        .increment(1);
    (
        StatusCode::OK,
        Json(HealthResponse {
            status: "ok",
            users: None,
        }),
    )
}

async fn readyz(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let users = state.registry.len().await;
    metrics::counter!("health_checks_total", "endpoint" => "readyz", "status" => "ok")
        .increment(1);
    (
        StatusCode::OK,
        Json(HealthResponse {
            status: "ready",
            users: Some(users),
        }),
    )
}

pub fn create_health_router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/readyz", get(readyz))
}
