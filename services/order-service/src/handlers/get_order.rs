use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use domain::OrderAggregate;
use read_model::LookupError;
use serde::Serialize;
use tracing::info;

use crate::state::AppState;

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

/// Get a single order by its `order_uid`
pub async fn get_order_handler(
    State(state): State<AppState>,
    Path(order_id): Path<String>,
) -> Result<Json<OrderAggregate>, (StatusCode, Json<ErrorResponse>)> {
    match state.gateway.lookup(&order_id).await {
        Ok(order) => Ok(Json(order.as_ref().clone())),
        Err(LookupError::NotFound(_)) => {
            info!("Order not found: {}", order_id);
            Err((
                StatusCode::NOT_FOUND,
                Json(ErrorResponse {
                    error: "Order not found".to_string(),
                }),
            ))
        }
    }
}
