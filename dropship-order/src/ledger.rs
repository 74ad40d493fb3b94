use chrono::{DateTime, Utc};
use dropship_core::identity::Requester;
use dropship_core::{CoreError, CoreResult};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use tracing::info;
use uuid::Uuid;

use crate::repository::LedgerRepository;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TransactionType {
    SaleCommission,
    Withdrawal,
    Refund,
    Adjustment,
}

impl TransactionType {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransactionType::SaleCommission => "SALE_COMMISSION",
            TransactionType::Withdrawal => "WITHDRAWAL",
            TransactionType::Refund => "REFUND",
            TransactionType::Adjustment => "ADJUSTMENT",
        }
    }
}

impl fmt::Display for TransactionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TransactionType {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "SALE_COMMISSION" => Ok(TransactionType::SaleCommission),
            "WITHDRAWAL" => Ok(TransactionType::Withdrawal),
            "REFUND" => Ok(TransactionType::Refund),
            "ADJUSTMENT" => Ok(TransactionType::Adjustment),
            other => Err(CoreError::PersistenceError(format!("unknown transaction type: {}", other))),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TransactionStatus {
    Pending,
    Completed,
    Failed,
}

impl TransactionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransactionStatus::Pending => "PENDING",
            TransactionStatus::Completed => "COMPLETED",
            TransactionStatus::Failed => "FAILED",
        }
    }
}

impl FromStr for TransactionStatus {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "PENDING" => Ok(TransactionStatus::Pending),
            "COMPLETED" => Ok(TransactionStatus::Completed),
            "FAILED" => Ok(TransactionStatus::Failed),
            other => Err(CoreError::PersistenceError(format!("unknown transaction status: {}", other))),
        }
    }
}

/// Running balance of one dropshipper.
///
/// `balance == total_earnings - total_withdrawn - <pending withdrawals>` holds
/// after every operation below.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Wallet {
    pub id: Uuid,
    pub dropshipper_id: Uuid,
    pub balance: Decimal,
    pub total_earnings: Decimal,
    pub total_withdrawn: Decimal,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Wallet {
    pub fn new(dropshipper_id: Uuid) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            dropshipper_id,
            balance: Decimal::ZERO,
            total_earnings: Decimal::ZERO,
            total_withdrawn: Decimal::ZERO,
            created_at: now,
            updated_at: now,
        }
    }

    /// Leaves the wallet untouched when either running total would overflow.
    pub fn apply_credit(&mut self, amount: Decimal) -> CoreResult<()> {
        let balance = checked_total(self.balance.checked_add(amount))?;
        let total_earnings = checked_total(self.total_earnings.checked_add(amount))?;
        self.balance = balance;
        self.total_earnings = total_earnings;
        self.touch();
        Ok(())
    }

    /// Takes a withdrawal out of the balance while it is in flight.
    pub fn reserve_withdrawal(&mut self, amount: Decimal) -> CoreResult<()> {
        if amount <= Decimal::ZERO {
            return Err(CoreError::ValidationError(format!(
                "withdrawal amount must be positive, got {}",
                amount
            )));
        }
        if amount > self.balance {
            return Err(CoreError::InsufficientFunds {
                requested: amount,
                available: self.balance,
            });
        }
        self.balance -= amount;
        self.touch();
        Ok(())
    }

    pub fn settle_withdrawal(&mut self, amount: Decimal) {
        self.total_withdrawn += amount;
        self.touch();
    }

    pub fn release_withdrawal(&mut self, amount: Decimal) {
        self.balance += amount;
        self.touch();
    }

    /// May leave the balance negative when the commission was already paid out.
    pub fn reverse_credit(&mut self, amount: Decimal) {
        self.balance -= amount;
        self.total_earnings -= amount;
        self.touch();
    }

    pub fn apply_adjustment(&mut self, amount: Decimal) -> CoreResult<()> {
        if amount.is_zero() {
            return Err(CoreError::ValidationError("adjustment amount must not be zero".to_string()));
        }
        if amount.is_sign_negative() && -amount > self.balance {
            return Err(CoreError::InsufficientFunds {
                requested: -amount,
                available: self.balance,
            });
        }
        let balance = checked_total(self.balance.checked_add(amount))?;
        let total_earnings = checked_total(self.total_earnings.checked_add(amount))?;
        self.balance = balance;
        self.total_earnings = total_earnings;
        self.touch();
        Ok(())
    }

    fn touch(&mut self) {
        self.updated_at = Utc::now();
    }
}

fn checked_total(value: Option<Decimal>) -> CoreResult<Decimal> {
    value.ok_or_else(|| CoreError::ValidationError("wallet amount out of range".to_string()))
}

/// Append-only ledger line. `amount` is a magnitude except for adjustments,
/// where the sign carries the direction.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WalletTransaction {
    pub id: Uuid,
    pub wallet_id: Uuid,
    pub order_id: Option<Uuid>,
    pub transaction_type: TransactionType,
    pub amount: Decimal,
    pub description: String,
    pub status: TransactionStatus,
    pub created_at: DateTime<Utc>,
}

impl WalletTransaction {
    fn new(
        wallet_id: Uuid,
        order_id: Option<Uuid>,
        transaction_type: TransactionType,
        amount: Decimal,
        description: String,
        status: TransactionStatus,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            wallet_id,
            order_id,
            transaction_type,
            amount,
            description,
            status,
            created_at: Utc::now(),
        }
    }

    pub fn sale_commission(wallet_id: Uuid, order_id: Uuid, amount: Decimal) -> Self {
        Self::new(
            wallet_id,
            Some(order_id),
            TransactionType::SaleCommission,
            amount,
            format!("Comisión por venta - Pedido #{}", short_id(order_id)),
            TransactionStatus::Completed,
        )
    }

    pub fn commission_reversal(wallet_id: Uuid, order_id: Uuid, amount: Decimal) -> Self {
        Self::new(
            wallet_id,
            Some(order_id),
            TransactionType::Refund,
            amount,
            format!("Reversión de comisión - Pedido #{}", short_id(order_id)),
            TransactionStatus::Completed,
        )
    }

    pub fn withdrawal(wallet_id: Uuid, amount: Decimal, description: &str) -> Self {
        Self::new(
            wallet_id,
            None,
            TransactionType::Withdrawal,
            amount,
            description.to_string(),
            TransactionStatus::Pending,
        )
    }

    pub fn adjustment(wallet_id: Uuid, amount: Decimal, reason: &str) -> Self {
        Self::new(
            wallet_id,
            None,
            TransactionType::Adjustment,
            amount,
            reason.to_string(),
            TransactionStatus::Completed,
        )
    }

    pub fn is_pending_withdrawal(&self) -> bool {
        self.transaction_type == TransactionType::Withdrawal
            && self.status == TransactionStatus::Pending
    }
}

/// First eight hex digits of an id, as shown to people.
pub fn short_id(id: Uuid) -> String {
    id.simple().to_string()[..8].to_uppercase()
}

/// Result of an idempotent commission credit.
#[derive(Debug, Clone)]
pub enum CreditOutcome {
    Applied(WalletTransaction),
    /// The order was already credited; carries the original transaction.
    AlreadyApplied(WalletTransaction),
}

impl CreditOutcome {
    pub fn transaction(&self) -> &WalletTransaction {
        match self {
            CreditOutcome::Applied(tx) | CreditOutcome::AlreadyApplied(tx) => tx,
        }
    }

    pub fn was_applied(&self) -> bool {
        matches!(self, CreditOutcome::Applied(_))
    }
}

/// Wallet queries and withdrawal handling with ownership checks.
pub struct LedgerService {
    ledger: Arc<dyn LedgerRepository>,
}

impl LedgerService {
    pub fn new(ledger: Arc<dyn LedgerRepository>) -> Self {
        Self { ledger }
    }

    pub async fn get_wallet(&self, requester: &Requester, dropshipper_id: Uuid) -> CoreResult<Wallet> {
        requester.require_owner_or_operator(dropshipper_id)?;
        self.ledger.get_or_create_wallet(dropshipper_id).await
    }

    /// Newest first.
    pub async fn transactions(
        &self,
        requester: &Requester,
        dropshipper_id: Uuid,
    ) -> CoreResult<Vec<WalletTransaction>> {
        requester.require_owner_or_operator(dropshipper_id)?;
        let wallet = self.ledger.get_or_create_wallet(dropshipper_id).await?;
        self.ledger.list_transactions(wallet.id).await
    }

    pub async fn request_withdrawal(
        &self,
        requester: &Requester,
        amount: Decimal,
        description: Option<&str>,
    ) -> CoreResult<WalletTransaction> {
        let wallet = self.ledger.get_or_create_wallet(requester.user_id).await?;
        let tx = self
            .ledger
            .debit(wallet.id, amount, description.unwrap_or("Solicitud de retiro"))
            .await?;
        info!(wallet_id = %wallet.id, transaction_id = %tx.id, amount = %amount, "Withdrawal requested");
        Ok(tx)
    }

    pub async fn complete_withdrawal(
        &self,
        requester: &Requester,
        transaction_id: Uuid,
    ) -> CoreResult<WalletTransaction> {
        requester.require_operator()?;
        let tx = self.ledger.complete_withdrawal(transaction_id).await?;
        info!(transaction_id = %transaction_id, operator = %requester.user_id, "Withdrawal completed");
        Ok(tx)
    }

    pub async fn fail_withdrawal(
        &self,
        requester: &Requester,
        transaction_id: Uuid,
        reason: &str,
    ) -> CoreResult<WalletTransaction> {
        requester.require_operator()?;
        let tx = self.ledger.fail_withdrawal(transaction_id, reason).await?;
        info!(transaction_id = %transaction_id, operator = %requester.user_id, "Withdrawal failed, funds released");
        Ok(tx)
    }

    pub async fn adjust(
        &self,
        requester: &Requester,
        dropshipper_id: Uuid,
        amount: Decimal,
        reason: &str,
    ) -> CoreResult<WalletTransaction> {
        requester.require_operator()?;
        if reason.trim().is_empty() {
            return Err(CoreError::ValidationError("adjustment reason is required".to_string()));
        }
        let wallet = self.ledger.get_or_create_wallet(dropshipper_id).await?;
        let tx = self.ledger.adjust(wallet.id, amount, reason).await?;
        info!(wallet_id = %wallet.id, amount = %amount, operator = %requester.user_id, "Wallet adjusted");
        Ok(tx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn invariant_holds(wallet: &Wallet, pending: Decimal) -> bool {
        wallet.balance == wallet.total_earnings - wallet.total_withdrawn - pending
    }

    #[test]
    fn test_withdrawal_lifecycle_keeps_invariant() {
        let mut wallet = Wallet::new(Uuid::new_v4());
        wallet.apply_credit(dec!(45000)).unwrap();
        assert!(invariant_holds(&wallet, dec!(0)));

        wallet.reserve_withdrawal(dec!(20000)).unwrap();
        assert_eq!(wallet.balance, dec!(25000));
        assert!(invariant_holds(&wallet, dec!(20000)));

        wallet.settle_withdrawal(dec!(20000));
        assert_eq!(wallet.total_withdrawn, dec!(20000));
        assert!(invariant_holds(&wallet, dec!(0)));

        wallet.reserve_withdrawal(dec!(5000)).unwrap();
        wallet.release_withdrawal(dec!(5000));
        assert_eq!(wallet.balance, dec!(25000));
        assert!(invariant_holds(&wallet, dec!(0)));
    }

    #[test]
    fn test_withdrawal_rejects_overdraft() {
        let mut wallet = Wallet::new(Uuid::new_v4());
        wallet.apply_credit(dec!(1000)).unwrap();

        let err = wallet.reserve_withdrawal(dec!(1000.01)).unwrap_err();
        assert!(matches!(err, CoreError::InsufficientFunds { .. }));
        assert!(matches!(wallet.reserve_withdrawal(dec!(0)), Err(CoreError::ValidationError(_))));
        assert_eq!(wallet.balance, dec!(1000));
    }

    #[test]
    fn test_adjustments_and_reversal() {
        let mut wallet = Wallet::new(Uuid::new_v4());
        wallet.apply_adjustment(dec!(500)).unwrap();
        assert!(wallet.apply_adjustment(dec!(-600)).is_err());
        wallet.apply_adjustment(dec!(-200)).unwrap();
        assert_eq!(wallet.balance, dec!(300));
        assert_eq!(wallet.total_earnings, dec!(300));

        wallet.reverse_credit(dec!(400));
        assert_eq!(wallet.balance, dec!(-100));
        assert!(invariant_holds(&wallet, dec!(0)));
    }

    #[test]
    fn test_credit_overflow_leaves_wallet_unchanged() {
        let mut wallet = Wallet::new(Uuid::new_v4());
        wallet.apply_credit(Decimal::MAX).unwrap();

        let err = wallet.apply_credit(dec!(1)).unwrap_err();
        assert!(matches!(err, CoreError::ValidationError(_)));
        assert_eq!(wallet.balance, Decimal::MAX);
        assert_eq!(wallet.total_earnings, Decimal::MAX);
    }

    #[test]
    fn test_short_id() {
        let id = Uuid::parse_str("8f14e45f-ceea-467f-a0b5-6a8a0e8e9c11").unwrap();
        assert_eq!(short_id(id), "8F14E45F");
    }
}
