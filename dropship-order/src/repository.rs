use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dropship_core::CoreResult;
use rust_decimal::Decimal;
use uuid::Uuid;

use crate::ledger::{CreditOutcome, Wallet, WalletTransaction};
use crate::models::{Order, OrderStatus};
use crate::notification::{DeliveryOutcome, EmailNotification};

/// Result of a status change. `reversal` is set when the new status took the
/// commission back out of the wallet.
#[derive(Debug, Clone)]
pub struct StatusChange {
    pub order: Order,
    pub reversal: Option<WalletTransaction>,
    pub wallet_balance: Option<Decimal>,
}

#[async_trait]
pub trait OrderRepository: Send + Sync {
    async fn get_order(&self, id: Uuid) -> CoreResult<Option<Order>>;

    /// Newest first.
    async fn list_orders(&self, dropshipper_id: Uuid) -> CoreResult<Vec<Order>>;

    /// Newest first.
    async fn list_all_orders(&self) -> CoreResult<Vec<Order>>;

    /// Moves the order to `to` if its current status allows it, checked and
    /// written in one atomic unit. Entering CANCELLED or REFUNDED also reverses
    /// the sale commission (once per order) in the same unit.
    async fn update_order_status(&self, id: Uuid, to: OrderStatus) -> CoreResult<StatusChange>;
}

#[async_trait]
pub trait LedgerRepository: Send + Sync {
    /// Race-safe: concurrent callers end up with the same wallet.
    async fn get_or_create_wallet(&self, dropshipper_id: Uuid) -> CoreResult<Wallet>;

    /// At most one commission credit per order. A second call returns
    /// `AlreadyApplied` and leaves the balance untouched.
    async fn credit(&self, wallet_id: Uuid, order_id: Uuid, amount: Decimal) -> CoreResult<CreditOutcome>;

    /// Reserves a withdrawal: balance drops now, the transaction stays pending.
    async fn debit(&self, wallet_id: Uuid, amount: Decimal, description: &str) -> CoreResult<WalletTransaction>;

    async fn complete_withdrawal(&self, transaction_id: Uuid) -> CoreResult<WalletTransaction>;

    async fn fail_withdrawal(&self, transaction_id: Uuid, reason: &str) -> CoreResult<WalletTransaction>;

    /// Signed operator correction.
    async fn adjust(&self, wallet_id: Uuid, amount: Decimal, reason: &str) -> CoreResult<WalletTransaction>;

    /// Newest first.
    async fn list_transactions(&self, wallet_id: Uuid) -> CoreResult<Vec<WalletTransaction>>;
}

#[derive(Debug, Clone)]
pub struct SettlementReceipt {
    pub order: Order,
    pub wallet: Wallet,
    pub transaction: WalletTransaction,
    /// True when the idempotency key matched an earlier order and nothing was written.
    pub replayed: bool,
}

/// Writes an order and its commission credit as a single unit.
#[async_trait]
pub trait SettlementStore: Send + Sync {
    /// Inserts the order, gets or creates the owner's wallet and credits the
    /// commission. Either all of it commits or none of it does.
    async fn settle(&self, order: Order) -> CoreResult<SettlementReceipt>;
}

#[async_trait]
pub trait NotificationRepository: Send + Sync {
    async fn create_notification(&self, notification: &EmailNotification) -> CoreResult<()>;

    async fn record_outcome(&self, id: Uuid, outcome: &DeliveryOutcome) -> CoreResult<EmailNotification>;

    async fn get_notification(&self, id: Uuid) -> CoreResult<Option<EmailNotification>>;

    /// Claims a failed row below the retry cap: status goes back to pending and
    /// `retry_count` is incremented. `None` when the row is not retryable.
    async fn begin_retry(&self, id: Uuid) -> CoreResult<Option<EmailNotification>>;

    /// Failed rows with `retry_count` below the cap, oldest first.
    async fn list_retryable(&self) -> CoreResult<Vec<EmailNotification>>;

    /// Failed and bounced rows, newest first.
    async fn list_failed(&self) -> CoreResult<Vec<EmailNotification>>;

    async fn list_for_order(&self, order_id: Uuid) -> CoreResult<Vec<EmailNotification>>;

    /// Marks rows that stayed pending since before `older_than` as failed.
    /// Returns how many rows changed.
    async fn fail_stale_pending(&self, older_than: DateTime<Utc>, reason: &str) -> CoreResult<u64>;
}
