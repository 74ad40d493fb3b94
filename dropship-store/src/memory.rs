use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dropship_core::catalog::{Product, ProductLookup};
use dropship_core::identity::{Dropshipper, IdentityLookup};
use dropship_core::{CoreError, CoreResult};
use dropship_order::ledger::{CreditOutcome, TransactionStatus, Wallet, WalletTransaction};
use dropship_order::models::{Order, OrderStatus};
use dropship_order::notification::{DeliveryOutcome, EmailNotification, NotificationStatus};
use dropship_order::repository::{
    LedgerRepository, NotificationRepository, OrderRepository, SettlementReceipt, SettlementStore,
    StatusChange,
};
use parking_lot::{Mutex, RwLock};
use rust_decimal::Decimal;
use std::collections::HashMap;
use uuid::Uuid;

/// Single-process store. One mutex guards every table, so each trait method
/// is atomic with respect to all others.
#[derive(Default)]
pub struct MemoryStore {
    state: Mutex<State>,
}

#[derive(Default)]
struct State {
    orders: Vec<Order>,
    order_index: HashMap<Uuid, usize>,
    idempotency_keys: HashMap<(Uuid, String), Uuid>,
    wallets: HashMap<Uuid, Wallet>,
    wallet_by_owner: HashMap<Uuid, Uuid>,
    transactions: Vec<WalletTransaction>,
    commission_by_order: HashMap<Uuid, usize>,
    reversal_by_order: HashMap<Uuid, usize>,
    notifications: Vec<EmailNotification>,
    notification_index: HashMap<Uuid, usize>,
}

impl State {
    fn wallet_for_owner(&mut self, dropshipper_id: Uuid) -> Wallet {
        if let Some(wallet_id) = self.wallet_by_owner.get(&dropshipper_id) {
            if let Some(wallet) = self.wallets.get(wallet_id) {
                return wallet.clone();
            }
        }
        let wallet = Wallet::new(dropshipper_id);
        self.wallet_by_owner.insert(dropshipper_id, wallet.id);
        self.wallets.insert(wallet.id, wallet.clone());
        wallet
    }

    fn wallet_mut(&mut self, wallet_id: Uuid) -> CoreResult<&mut Wallet> {
        self.wallets
            .get_mut(&wallet_id)
            .ok_or_else(|| CoreError::not_found("wallet", wallet_id))
    }

    fn credit(&mut self, wallet_id: Uuid, order_id: Uuid, amount: Decimal) -> CoreResult<CreditOutcome> {
        if let Some(&idx) = self.commission_by_order.get(&order_id) {
            return Ok(CreditOutcome::AlreadyApplied(self.transactions[idx].clone()));
        }
        self.wallet_mut(wallet_id)?.apply_credit(amount)?;

        let tx = WalletTransaction::sale_commission(wallet_id, order_id, amount);
        self.commission_by_order.insert(order_id, self.transactions.len());
        self.transactions.push(tx.clone());
        Ok(CreditOutcome::Applied(tx))
    }

    fn transaction_mut(&mut self, transaction_id: Uuid) -> CoreResult<&mut WalletTransaction> {
        self.transactions
            .iter_mut()
            .find(|tx| tx.id == transaction_id)
            .ok_or_else(|| CoreError::not_found("transaction", transaction_id))
    }

    fn pending_withdrawal(&mut self, transaction_id: Uuid) -> CoreResult<WalletTransaction> {
        let tx = self.transaction_mut(transaction_id)?;
        if !tx.is_pending_withdrawal() {
            return Err(CoreError::ValidationError(format!(
                "transaction {} is not a pending withdrawal",
                transaction_id
            )));
        }
        Ok(tx.clone())
    }

    fn set_transaction_status(&mut self, transaction_id: Uuid, status: TransactionStatus) -> CoreResult<WalletTransaction> {
        let tx = self.transaction_mut(transaction_id)?;
        tx.status = status;
        Ok(tx.clone())
    }

    fn notification_mut(&mut self, id: Uuid) -> CoreResult<&mut EmailNotification> {
        let idx = *self
            .notification_index
            .get(&id)
            .ok_or_else(|| CoreError::not_found("notification", id))?;
        Ok(&mut self.notifications[idx])
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl OrderRepository for MemoryStore {
    async fn get_order(&self, id: Uuid) -> CoreResult<Option<Order>> {
        let state = self.state.lock();
        Ok(state.order_index.get(&id).map(|&idx| state.orders[idx].clone()))
    }

    async fn list_orders(&self, dropshipper_id: Uuid) -> CoreResult<Vec<Order>> {
        let state = self.state.lock();
        Ok(state
            .orders
            .iter()
            .rev()
            .filter(|o| o.dropshipper_id == dropshipper_id)
            .cloned()
            .collect())
    }

    async fn list_all_orders(&self) -> CoreResult<Vec<Order>> {
        let state = self.state.lock();
        Ok(state.orders.iter().rev().cloned().collect())
    }

    async fn update_order_status(&self, id: Uuid, to: OrderStatus) -> CoreResult<StatusChange> {
        let mut guard = self.state.lock();
        let state = &mut *guard;
        let idx = *state
            .order_index
            .get(&id)
            .ok_or_else(|| CoreError::not_found("order", id))?;

        let from = state.orders[idx].status;
        from.transition(to)?;

        let mut reversal = None;
        let mut wallet_balance = None;
        if to.reverses_commission() && !state.reversal_by_order.contains_key(&id) {
            if let Some(&credit_idx) = state.commission_by_order.get(&id) {
                let credit = state.transactions[credit_idx].clone();
                let wallet = state.wallet_mut(credit.wallet_id)?;
                wallet.reverse_credit(credit.amount);
                wallet_balance = Some(wallet.balance);

                let tx = WalletTransaction::commission_reversal(credit.wallet_id, id, credit.amount);
                state.reversal_by_order.insert(id, state.transactions.len());
                state.transactions.push(tx.clone());
                reversal = Some(tx);
            }
        }

        let order = &mut state.orders[idx];
        order.update_status(to);
        Ok(StatusChange {
            order: order.clone(),
            reversal,
            wallet_balance,
        })
    }
}

#[async_trait]
impl LedgerRepository for MemoryStore {
    async fn get_or_create_wallet(&self, dropshipper_id: Uuid) -> CoreResult<Wallet> {
        Ok(self.state.lock().wallet_for_owner(dropshipper_id))
    }

    async fn credit(&self, wallet_id: Uuid, order_id: Uuid, amount: Decimal) -> CoreResult<CreditOutcome> {
        self.state.lock().credit(wallet_id, order_id, amount)
    }

    async fn debit(&self, wallet_id: Uuid, amount: Decimal, description: &str) -> CoreResult<WalletTransaction> {
        let mut state = self.state.lock();
        state.wallet_mut(wallet_id)?.reserve_withdrawal(amount)?;
        let tx = WalletTransaction::withdrawal(wallet_id, amount, description);
        state.transactions.push(tx.clone());
        Ok(tx)
    }

    async fn complete_withdrawal(&self, transaction_id: Uuid) -> CoreResult<WalletTransaction> {
        let mut state = self.state.lock();
        let tx = state.pending_withdrawal(transaction_id)?;
        state.wallet_mut(tx.wallet_id)?.settle_withdrawal(tx.amount);
        state.set_transaction_status(transaction_id, TransactionStatus::Completed)
    }

    async fn fail_withdrawal(&self, transaction_id: Uuid, reason: &str) -> CoreResult<WalletTransaction> {
        let mut state = self.state.lock();
        let tx = state.pending_withdrawal(transaction_id)?;
        state.wallet_mut(tx.wallet_id)?.release_withdrawal(tx.amount);
        let updated = state.transaction_mut(transaction_id)?;
        updated.status = TransactionStatus::Failed;
        updated.description = format!("{} ({})", updated.description, reason);
        Ok(updated.clone())
    }

    async fn adjust(&self, wallet_id: Uuid, amount: Decimal, reason: &str) -> CoreResult<WalletTransaction> {
        let mut state = self.state.lock();
        state.wallet_mut(wallet_id)?.apply_adjustment(amount)?;
        let tx = WalletTransaction::adjustment(wallet_id, amount, reason);
        state.transactions.push(tx.clone());
        Ok(tx)
    }

    async fn list_transactions(&self, wallet_id: Uuid) -> CoreResult<Vec<WalletTransaction>> {
        let state = self.state.lock();
        Ok(state
            .transactions
            .iter()
            .rev()
            .filter(|tx| tx.wallet_id == wallet_id)
            .cloned()
            .collect())
    }
}

#[async_trait]
impl SettlementStore for MemoryStore {
    async fn settle(&self, order: Order) -> CoreResult<SettlementReceipt> {
        let mut guard = self.state.lock();
        let state = &mut *guard;

        if let Some(key) = &order.idempotency_key {
            if let Some(existing_id) = state.idempotency_keys.get(&(order.dropshipper_id, key.clone())) {
                let existing = state.orders[state.order_index[existing_id]].clone();
                let wallet = state.wallet_for_owner(existing.dropshipper_id);
                let credit = state
                    .commission_by_order
                    .get(&existing.id)
                    .map(|&idx| state.transactions[idx].clone())
                    .ok_or_else(|| CoreError::PersistenceError(format!("order {} has no commission entry", existing.id)))?;
                return Ok(SettlementReceipt {
                    order: existing,
                    wallet,
                    transaction: credit,
                    replayed: true,
                });
            }
        }

        if state.order_index.contains_key(&order.id) {
            return Err(CoreError::PersistenceError(format!("duplicate order id {}", order.id)));
        }

        // Credit first: a failure here must not leave an order behind.
        let wallet = state.wallet_for_owner(order.dropshipper_id);
        let outcome = state.credit(wallet.id, order.id, order.commission_amount)?;

        if let Some(key) = &order.idempotency_key {
            state.idempotency_keys.insert((order.dropshipper_id, key.clone()), order.id);
        }
        state.order_index.insert(order.id, state.orders.len());
        state.orders.push(order.clone());

        let wallet = state.wallet_for_owner(order.dropshipper_id);
        Ok(SettlementReceipt {
            order,
            wallet,
            transaction: outcome.transaction().clone(),
            replayed: false,
        })
    }
}

#[async_trait]
impl NotificationRepository for MemoryStore {
    async fn create_notification(&self, notification: &EmailNotification) -> CoreResult<()> {
        let mut guard = self.state.lock();
        let state = &mut *guard;
        if state.notification_index.contains_key(&notification.id) {
            return Err(CoreError::PersistenceError(format!("duplicate notification id {}", notification.id)));
        }
        state.notification_index.insert(notification.id, state.notifications.len());
        state.notifications.push(notification.clone());
        Ok(())
    }

    async fn record_outcome(&self, id: Uuid, outcome: &DeliveryOutcome) -> CoreResult<EmailNotification> {
        let mut state = self.state.lock();
        let row = state.notification_mut(id)?;
        row.apply_outcome(outcome);
        Ok(row.clone())
    }

    async fn get_notification(&self, id: Uuid) -> CoreResult<Option<EmailNotification>> {
        let state = self.state.lock();
        Ok(state.notification_index.get(&id).map(|&idx| state.notifications[idx].clone()))
    }

    async fn begin_retry(&self, id: Uuid) -> CoreResult<Option<EmailNotification>> {
        let mut state = self.state.lock();
        let row = state.notification_mut(id)?;
        Ok(row.claim_retry().then(|| row.clone()))
    }

    async fn list_retryable(&self) -> CoreResult<Vec<EmailNotification>> {
        let state = self.state.lock();
        Ok(state.notifications.iter().filter(|n| n.is_retryable()).cloned().collect())
    }

    async fn list_failed(&self) -> CoreResult<Vec<EmailNotification>> {
        let state = self.state.lock();
        Ok(state
            .notifications
            .iter()
            .rev()
            .filter(|n| matches!(n.status, NotificationStatus::Failed | NotificationStatus::Bounced))
            .cloned()
            .collect())
    }

    async fn list_for_order(&self, order_id: Uuid) -> CoreResult<Vec<EmailNotification>> {
        let state = self.state.lock();
        Ok(state
            .notifications
            .iter()
            .filter(|n| n.order_id == order_id)
            .cloned()
            .collect())
    }

    async fn fail_stale_pending(&self, older_than: DateTime<Utc>, reason: &str) -> CoreResult<u64> {
        let mut state = self.state.lock();
        let mut changed = 0;
        for row in state
            .notifications
            .iter_mut()
            .filter(|n| n.status == NotificationStatus::Pending && n.updated_at < older_than)
        {
            row.apply_outcome(&DeliveryOutcome::Failed(reason.to_string()));
            changed += 1;
        }
        Ok(changed)
    }
}

/// Products and dropshipper identities held in memory, for development and tests.
#[derive(Default)]
pub struct MemoryCatalog {
    products: RwLock<HashMap<Uuid, Product>>,
    dropshippers: RwLock<HashMap<Uuid, Dropshipper>>,
}

impl MemoryCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert_product(&self, product: Product) {
        self.products.write().insert(product.id, product);
    }

    pub fn insert_dropshipper(&self, dropshipper: Dropshipper) {
        self.dropshippers.write().insert(dropshipper.id, dropshipper);
    }
}

#[async_trait]
impl ProductLookup for MemoryCatalog {
    async fn get_product(&self, id: Uuid) -> CoreResult<Option<Product>> {
        Ok(self.products.read().get(&id).cloned())
    }
}

#[async_trait]
impl IdentityLookup for MemoryCatalog {
    async fn get_dropshipper(&self, id: Uuid) -> CoreResult<Option<Dropshipper>> {
        Ok(self.dropshippers.read().get(&id).cloned())
    }
}
