use axum::{
    extract::{rejection::JsonRejection, State},
    http::StatusCode,
    Extension, Json,
};
use dropship_core::identity::Requester;
use dropship_order::{Wallet, WalletTransaction};
use rust_decimal::Decimal;
use serde::Deserialize;

use crate::error::AppError;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct WithdrawalRequest {
    pub amount: Decimal,
    pub description: Option<String>,
}

/// GET /v1/wallet
pub async fn get_wallet(
    State(state): State<AppState>,
    Extension(requester): Extension<Requester>,
) -> Result<Json<Wallet>, AppError> {
    Ok(Json(state.ledger.get_wallet(&requester, requester.user_id).await?))
}

/// GET /v1/wallet/transactions
pub async fn list_transactions(
    State(state): State<AppState>,
    Extension(requester): Extension<Requester>,
) -> Result<Json<Vec<WalletTransaction>>, AppError> {
    Ok(Json(state.ledger.transactions(&requester, requester.user_id).await?))
}

/// POST /v1/wallet/withdrawals
/// Reserve funds for payout; an operator completes or fails it later
pub async fn request_withdrawal(
    State(state): State<AppState>,
    Extension(requester): Extension<Requester>,
    payload: Result<Json<WithdrawalRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<WalletTransaction>), AppError> {
    let Json(req) = payload?;
    let tx = state
        .ledger
        .request_withdrawal(&requester, req.amount, req.description.as_deref())
        .await?;
    Ok((StatusCode::CREATED, Json(tx)))
}
