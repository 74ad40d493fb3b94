use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dropship_core::{CoreError, CoreResult};
use dropship_order::ledger::{CreditOutcome, TransactionStatus, Wallet, WalletTransaction};
use dropship_order::repository::LedgerRepository;
use rust_decimal::Decimal;
use sqlx::PgConnection;
use uuid::Uuid;

use crate::database::db_error;
use crate::order_repo::PgStore;

const WALLET_COLUMNS: &str = "id, dropshipper_id, balance, total_earnings, total_withdrawn, created_at, updated_at";
const TRANSACTION_COLUMNS: &str = "id, wallet_id, order_id, transaction_type, amount, description, status, created_at";

#[derive(sqlx::FromRow)]
struct WalletRow {
    id: Uuid,
    dropshipper_id: Uuid,
    balance: Decimal,
    total_earnings: Decimal,
    total_withdrawn: Decimal,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl From<WalletRow> for Wallet {
    fn from(row: WalletRow) -> Self {
        Wallet {
            id: row.id,
            dropshipper_id: row.dropshipper_id,
            balance: row.balance,
            total_earnings: row.total_earnings,
            total_withdrawn: row.total_withdrawn,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

#[derive(sqlx::FromRow)]
struct TransactionRow {
    id: Uuid,
    wallet_id: Uuid,
    order_id: Option<Uuid>,
    transaction_type: String,
    amount: Decimal,
    description: String,
    status: String,
    created_at: DateTime<Utc>,
}

impl TryFrom<TransactionRow> for WalletTransaction {
    type Error = CoreError;

    fn try_from(row: TransactionRow) -> Result<Self, Self::Error> {
        Ok(WalletTransaction {
            id: row.id,
            wallet_id: row.wallet_id,
            order_id: row.order_id,
            transaction_type: row.transaction_type.parse()?,
            amount: row.amount,
            description: row.description,
            status: row.status.parse()?,
            created_at: row.created_at,
        })
    }
}

/// Returns the owner's wallet, creating it if needed. The no-op update makes
/// `RETURNING` yield the row on conflict too.
pub(crate) async fn upsert_wallet(conn: &mut PgConnection, dropshipper_id: Uuid) -> CoreResult<Wallet> {
    let sql = format!(
        "INSERT INTO wallets (id, dropshipper_id) VALUES ($1, $2) \
         ON CONFLICT (dropshipper_id) DO UPDATE SET dropshipper_id = EXCLUDED.dropshipper_id \
         RETURNING {}",
        WALLET_COLUMNS
    );
    let row: WalletRow = sqlx::query_as(&sql)
        .bind(Uuid::new_v4())
        .bind(dropshipper_id)
        .fetch_one(&mut *conn)
        .await
        .map_err(db_error)?;
    Ok(row.into())
}

pub(crate) async fn lock_wallet(conn: &mut PgConnection, wallet_id: Uuid) -> CoreResult<Wallet> {
    let sql = format!("SELECT {} FROM wallets WHERE id = $1 FOR UPDATE", WALLET_COLUMNS);
    let row: Option<WalletRow> = sqlx::query_as(&sql)
        .bind(wallet_id)
        .fetch_optional(&mut *conn)
        .await
        .map_err(db_error)?;
    row.map(Wallet::from)
        .ok_or_else(|| CoreError::not_found("wallet", wallet_id))
}

pub(crate) async fn save_wallet(conn: &mut PgConnection, wallet: &Wallet) -> CoreResult<()> {
    sqlx::query(
        "UPDATE wallets SET balance = $2, total_earnings = $3, total_withdrawn = $4, updated_at = $5 WHERE id = $1",
    )
    .bind(wallet.id)
    .bind(wallet.balance)
    .bind(wallet.total_earnings)
    .bind(wallet.total_withdrawn)
    .bind(wallet.updated_at)
    .execute(&mut *conn)
    .await
    .map_err(db_error)?;
    Ok(())
}

async fn insert_transaction(conn: &mut PgConnection, tx: &WalletTransaction) -> CoreResult<()> {
    sqlx::query(
        r#"
        INSERT INTO wallet_transactions (id, wallet_id, order_id, transaction_type, amount, description, status, created_at)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
        "#,
    )
    .bind(tx.id)
    .bind(tx.wallet_id)
    .bind(tx.order_id)
    .bind(tx.transaction_type.as_str())
    .bind(tx.amount)
    .bind(&tx.description)
    .bind(tx.status.as_str())
    .bind(tx.created_at)
    .execute(&mut *conn)
    .await
    .map_err(db_error)?;
    Ok(())
}

pub(crate) async fn commission_for_order(conn: &mut PgConnection, order_id: Uuid) -> CoreResult<Option<WalletTransaction>> {
    let sql = format!(
        "SELECT {} FROM wallet_transactions WHERE order_id = $1 AND transaction_type = 'SALE_COMMISSION'",
        TRANSACTION_COLUMNS
    );
    let row: Option<TransactionRow> = sqlx::query_as(&sql)
        .bind(order_id)
        .fetch_optional(&mut *conn)
        .await
        .map_err(db_error)?;
    row.map(WalletTransaction::try_from).transpose()
}

/// Idempotent commission credit. The partial unique index on
/// `(order_id) WHERE transaction_type = 'SALE_COMMISSION'` decides the winner
/// when two callers race; the loser sees `AlreadyApplied`.
pub(crate) async fn apply_credit(
    conn: &mut PgConnection,
    wallet_id: Uuid,
    order_id: Uuid,
    amount: Decimal,
) -> CoreResult<(Wallet, CreditOutcome)> {
    let credit = WalletTransaction::sale_commission(wallet_id, order_id, amount);
    let inserted = sqlx::query(
        r#"
        INSERT INTO wallet_transactions (id, wallet_id, order_id, transaction_type, amount, description, status, created_at)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
        ON CONFLICT (order_id) WHERE transaction_type = 'SALE_COMMISSION' DO NOTHING
        "#,
    )
    .bind(credit.id)
    .bind(credit.wallet_id)
    .bind(credit.order_id)
    .bind(credit.transaction_type.as_str())
    .bind(credit.amount)
    .bind(&credit.description)
    .bind(credit.status.as_str())
    .bind(credit.created_at)
    .execute(&mut *conn)
    .await
    .map_err(db_error)?
    .rows_affected();

    if inserted == 0 {
        let existing = commission_for_order(conn, order_id)
            .await?
            .ok_or_else(|| CoreError::PersistenceError(format!("commission for order {} vanished", order_id)))?;
        let wallet = lock_wallet(conn, existing.wallet_id).await?;
        return Ok((wallet, CreditOutcome::AlreadyApplied(existing)));
    }

    let mut wallet = lock_wallet(conn, wallet_id).await?;
    wallet.apply_credit(amount)?;
    save_wallet(conn, &wallet).await?;
    Ok((wallet, CreditOutcome::Applied(credit)))
}

async fn lock_pending_withdrawal(conn: &mut PgConnection, transaction_id: Uuid) -> CoreResult<WalletTransaction> {
    let sql = format!("SELECT {} FROM wallet_transactions WHERE id = $1 FOR UPDATE", TRANSACTION_COLUMNS);
    let row: Option<TransactionRow> = sqlx::query_as(&sql)
        .bind(transaction_id)
        .fetch_optional(&mut *conn)
        .await
        .map_err(db_error)?;
    let tx = row
        .map(WalletTransaction::try_from)
        .transpose()?
        .ok_or_else(|| CoreError::not_found("transaction", transaction_id))?;

    if !tx.is_pending_withdrawal() {
        return Err(CoreError::ValidationError(format!(
            "transaction {} is not a pending withdrawal",
            transaction_id
        )));
    }
    Ok(tx)
}

#[async_trait]
impl LedgerRepository for PgStore {
    async fn get_or_create_wallet(&self, dropshipper_id: Uuid) -> CoreResult<Wallet> {
        let mut conn = self.pool.acquire().await.map_err(db_error)?;
        upsert_wallet(&mut conn, dropshipper_id).await
    }

    async fn credit(&self, wallet_id: Uuid, order_id: Uuid, amount: Decimal) -> CoreResult<CreditOutcome> {
        let mut tx = self.pool.begin().await.map_err(db_error)?;
        let (_, outcome) = apply_credit(&mut tx, wallet_id, order_id, amount).await?;
        tx.commit().await.map_err(db_error)?;
        Ok(outcome)
    }

    async fn debit(&self, wallet_id: Uuid, amount: Decimal, description: &str) -> CoreResult<WalletTransaction> {
        let mut tx = self.pool.begin().await.map_err(db_error)?;

        let mut wallet = lock_wallet(&mut tx, wallet_id).await?;
        wallet.reserve_withdrawal(amount)?;
        save_wallet(&mut tx, &wallet).await?;

        let withdrawal = WalletTransaction::withdrawal(wallet_id, amount, description);
        insert_transaction(&mut tx, &withdrawal).await?;

        tx.commit().await.map_err(db_error)?;
        Ok(withdrawal)
    }

    async fn complete_withdrawal(&self, transaction_id: Uuid) -> CoreResult<WalletTransaction> {
        let mut tx = self.pool.begin().await.map_err(db_error)?;

        let mut withdrawal = lock_pending_withdrawal(&mut tx, transaction_id).await?;
        let mut wallet = lock_wallet(&mut tx, withdrawal.wallet_id).await?;
        wallet.settle_withdrawal(withdrawal.amount);
        save_wallet(&mut tx, &wallet).await?;

        withdrawal.status = TransactionStatus::Completed;
        sqlx::query("UPDATE wallet_transactions SET status = $2 WHERE id = $1")
            .bind(transaction_id)
            .bind(withdrawal.status.as_str())
            .execute(&mut *tx)
            .await
            .map_err(db_error)?;

        tx.commit().await.map_err(db_error)?;
        Ok(withdrawal)
    }

    async fn fail_withdrawal(&self, transaction_id: Uuid, reason: &str) -> CoreResult<WalletTransaction> {
        let mut tx = self.pool.begin().await.map_err(db_error)?;

        let mut withdrawal = lock_pending_withdrawal(&mut tx, transaction_id).await?;
        let mut wallet = lock_wallet(&mut tx, withdrawal.wallet_id).await?;
        wallet.release_withdrawal(withdrawal.amount);
        save_wallet(&mut tx, &wallet).await?;

        withdrawal.status = TransactionStatus::Failed;
        withdrawal.description = format!("{} ({})", withdrawal.description, reason);
        sqlx::query("UPDATE wallet_transactions SET status = $2, description = $3 WHERE id = $1")
            .bind(transaction_id)
            .bind(withdrawal.status.as_str())
            .bind(&withdrawal.description)
            .execute(&mut *tx)
            .await
            .map_err(db_error)?;

        tx.commit().await.map_err(db_error)?;
        Ok(withdrawal)
    }

    async fn adjust(&self, wallet_id: Uuid, amount: Decimal, reason: &str) -> CoreResult<WalletTransaction> {
        let mut tx = self.pool.begin().await.map_err(db_error)?;

        let mut wallet = lock_wallet(&mut tx, wallet_id).await?;
        wallet.apply_adjustment(amount)?;
        save_wallet(&mut tx, &wallet).await?;

        let adjustment = WalletTransaction::adjustment(wallet_id, amount, reason);
        insert_transaction(&mut tx, &adjustment).await?;

        tx.commit().await.map_err(db_error)?;
        Ok(adjustment)
    }

    async fn list_transactions(&self, wallet_id: Uuid) -> CoreResult<Vec<WalletTransaction>> {
        let sql = format!(
            "SELECT {} FROM wallet_transactions WHERE wallet_id = $1 ORDER BY created_at DESC, id DESC",
            TRANSACTION_COLUMNS
        );
        let rows: Vec<TransactionRow> = sqlx::query_as(&sql)
            .bind(wallet_id)
            .fetch_all(&self.pool)
            .await
            .map_err(db_error)?;
        rows.into_iter().map(WalletTransaction::try_from).collect()
    }
}
