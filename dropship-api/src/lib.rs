use axum::{
    http::Method,
    routing::{get, post, put},
    Json, Router,
};
use serde_json::{json, Value};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

pub mod admin;
pub mod error;
pub mod middleware;
pub mod orders;
pub mod state;
pub mod wallet;
pub mod worker;

pub use state::AppState;

pub fn app(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(tower_http::cors::Any)
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::OPTIONS])
        .allow_headers([
            axum::http::header::AUTHORIZATION,
            axum::http::header::CONTENT_TYPE,
            axum::http::header::USER_AGENT,
        ]);

    let authenticated = Router::new()
        .route("/v1/orders", post(orders::place_order).get(orders::list_orders))
        .route("/v1/orders/{id}", get(orders::get_order))
        .route("/v1/wallet", get(wallet::get_wallet))
        .route("/v1/wallet/transactions", get(wallet::list_transactions))
        .route("/v1/wallet/withdrawals", post(wallet::request_withdrawal))
        .layer(axum::middleware::from_fn_with_state(state.clone(), middleware::auth_middleware));

    let operator = Router::new()
        .route("/v1/admin/orders", get(admin::list_all_orders))
        .route("/v1/admin/orders/{id}/status", put(admin::update_order_status))
        .route("/v1/admin/dropshippers/{id}/orders", get(admin::list_dropshipper_orders))
        .route("/v1/admin/wallets/{dropshipper_id}", get(admin::get_wallet))
        .route("/v1/admin/wallets/{dropshipper_id}/transactions", get(admin::list_transactions))
        .route("/v1/admin/wallets/{dropshipper_id}/adjustments", post(admin::adjust_wallet))
        .route("/v1/admin/withdrawals/{id}/complete", post(admin::complete_withdrawal))
        .route("/v1/admin/withdrawals/{id}/fail", post(admin::fail_withdrawal))
        .route("/v1/admin/notifications/failed", get(admin::failed_notifications))
        .route("/v1/admin/notifications/{id}/retry", post(admin::retry_notification))
        .layer(axum::middleware::from_fn(middleware::operator_middleware))
        .layer(axum::middleware::from_fn_with_state(state.clone(), middleware::auth_middleware));

    Router::new()
        .route("/health", get(health))
        .merge(authenticated)
        .merge(operator)
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn health() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}
