use axum::{
    extract::{rejection::JsonRejection, Path, State},
    http::{HeaderMap, StatusCode},
    Extension, Json,
};
use dropship_core::identity::Requester;
use dropship_order::{Order, PlaceOrderInput, PlacedOrder};
use uuid::Uuid;

use crate::error::AppError;
use crate::state::AppState;

pub const IDEMPOTENCY_HEADER: &str = "Idempotency-Key";

// ============================================================================
// Handlers
// ============================================================================

/// POST /v1/orders
/// Settle a sale for the calling dropshipper. A replayed idempotency key
/// answers 200 with the original order instead of 201.
pub async fn place_order(
    State(state): State<AppState>,
    Extension(requester): Extension<Requester>,
    headers: HeaderMap,
    payload: Result<Json<PlaceOrderInput>, JsonRejection>,
) -> Result<(StatusCode, Json<PlacedOrder>), AppError> {
    let Json(mut input) = payload?;

    if input.idempotency_key.is_none() {
        input.idempotency_key = headers
            .get(IDEMPOTENCY_HEADER)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
    }

    let placed = state.orchestrator.place_order(&requester, input).await?;
    let status = if placed.replayed { StatusCode::OK } else { StatusCode::CREATED };
    Ok((status, Json(placed)))
}

/// GET /v1/orders
/// The caller's orders, newest first
pub async fn list_orders(
    State(state): State<AppState>,
    Extension(requester): Extension<Requester>,
) -> Result<Json<Vec<Order>>, AppError> {
    Ok(Json(state.orders.list_orders(&requester).await?))
}

/// GET /v1/orders/{id}
pub async fn get_order(
    State(state): State<AppState>,
    Extension(requester): Extension<Requester>,
    Path(order_id): Path<Uuid>,
) -> Result<Json<Order>, AppError> {
    Ok(Json(state.orders.get_order(&requester, order_id).await?))
}
