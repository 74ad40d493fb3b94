use axum::{
    extract::{rejection::JsonRejection, Path, State},
    Extension, Json,
};
use dropship_core::identity::Requester;
use dropship_order::{EmailNotification, Order, OrderStatus, Wallet, WalletTransaction};
use rust_decimal::Decimal;
use serde::Deserialize;
use uuid::Uuid;

use crate::error::AppError;
use crate::state::AppState;

// ============================================================================
// Request Types
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct UpdateStatusRequest {
    pub status: OrderStatus,
}

#[derive(Debug, Deserialize)]
pub struct AdjustmentRequest {
    pub amount: Decimal,
    pub reason: String,
}

#[derive(Debug, Deserialize)]
pub struct FailWithdrawalRequest {
    pub reason: String,
}

// ============================================================================
// Orders
// ============================================================================

/// GET /v1/admin/orders
pub async fn list_all_orders(
    State(state): State<AppState>,
    Extension(requester): Extension<Requester>,
) -> Result<Json<Vec<Order>>, AppError> {
    Ok(Json(state.orders.list_all_orders(&requester).await?))
}

/// GET /v1/admin/dropshippers/{id}/orders
pub async fn list_dropshipper_orders(
    State(state): State<AppState>,
    Extension(requester): Extension<Requester>,
    Path(dropshipper_id): Path<Uuid>,
) -> Result<Json<Vec<Order>>, AppError> {
    Ok(Json(state.orders.list_orders_for(&requester, dropshipper_id).await?))
}

/// PUT /v1/admin/orders/{id}/status
pub async fn update_order_status(
    State(state): State<AppState>,
    Extension(requester): Extension<Requester>,
    Path(order_id): Path<Uuid>,
    payload: Result<Json<UpdateStatusRequest>, JsonRejection>,
) -> Result<Json<Order>, AppError> {
    let Json(req) = payload?;
    let order = state
        .orders
        .update_order_status(&requester, order_id, req.status)
        .await?;
    Ok(Json(order))
}

// ============================================================================
// Wallets
// ============================================================================

/// GET /v1/admin/wallets/{dropshipper_id}
pub async fn get_wallet(
    State(state): State<AppState>,
    Extension(requester): Extension<Requester>,
    Path(dropshipper_id): Path<Uuid>,
) -> Result<Json<Wallet>, AppError> {
    Ok(Json(state.ledger.get_wallet(&requester, dropshipper_id).await?))
}

/// GET /v1/admin/wallets/{dropshipper_id}/transactions
pub async fn list_transactions(
    State(state): State<AppState>,
    Extension(requester): Extension<Requester>,
    Path(dropshipper_id): Path<Uuid>,
) -> Result<Json<Vec<WalletTransaction>>, AppError> {
    Ok(Json(state.ledger.transactions(&requester, dropshipper_id).await?))
}

/// POST /v1/admin/wallets/{dropshipper_id}/adjustments
pub async fn adjust_wallet(
    State(state): State<AppState>,
    Extension(requester): Extension<Requester>,
    Path(dropshipper_id): Path<Uuid>,
    payload: Result<Json<AdjustmentRequest>, JsonRejection>,
) -> Result<Json<WalletTransaction>, AppError> {
    let Json(req) = payload?;
    let tx = state
        .ledger
        .adjust(&requester, dropshipper_id, req.amount, &req.reason)
        .await?;
    Ok(Json(tx))
}

/// POST /v1/admin/withdrawals/{id}/complete
pub async fn complete_withdrawal(
    State(state): State<AppState>,
    Extension(requester): Extension<Requester>,
    Path(transaction_id): Path<Uuid>,
) -> Result<Json<WalletTransaction>, AppError> {
    Ok(Json(state.ledger.complete_withdrawal(&requester, transaction_id).await?))
}

/// POST /v1/admin/withdrawals/{id}/fail
pub async fn fail_withdrawal(
    State(state): State<AppState>,
    Extension(requester): Extension<Requester>,
    Path(transaction_id): Path<Uuid>,
    payload: Result<Json<FailWithdrawalRequest>, JsonRejection>,
) -> Result<Json<WalletTransaction>, AppError> {
    let Json(req) = payload?;
    let tx = state
        .ledger
        .fail_withdrawal(&requester, transaction_id, &req.reason)
        .await?;
    Ok(Json(tx))
}

// ============================================================================
// Notifications
// ============================================================================

/// GET /v1/admin/notifications/failed
/// Failed and bounced deliveries, newest first
pub async fn failed_notifications(
    State(state): State<AppState>,
    Extension(requester): Extension<Requester>,
) -> Result<Json<Vec<EmailNotification>>, AppError> {
    Ok(Json(state.retries.failed_notifications(&requester).await?))
}

/// POST /v1/admin/notifications/{id}/retry
pub async fn retry_notification(
    State(state): State<AppState>,
    Extension(requester): Extension<Requester>,
    Path(notification_id): Path<Uuid>,
) -> Result<Json<EmailNotification>, AppError> {
    Ok(Json(state.retries.retry_notification(&requester, notification_id).await?))
}
