use axum::{extract::State, http::StatusCode, Json};
use serde::Serialize;

use crate::state::AppState;

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub service: String,
    pub version: String,
    pub cached_orders: usize,
}

/// Health check endpoint
pub async fn health_check(State(state): State<AppState>) -> (StatusCode, Json<HealthResponse>) {
    let health = state.gateway.health_check().await;
    (
        StatusCode::OK,
        Json(HealthResponse {
            status: health.status,
            service: "order-service".to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            cached_orders: health.cached_orders,
        }),
    )
}
