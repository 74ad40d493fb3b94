use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dropship_core::{CoreError, CoreResult};
use dropship_order::ledger::WalletTransaction;
use dropship_order::models::{CustomerContact, DeliveryDetails, Order, OrderStatus};
use dropship_order::repository::{OrderRepository, SettlementReceipt, SettlementStore, StatusChange};
use dropship_shared::Masked;
use rust_decimal::Decimal;
use sqlx::{PgConnection, PgPool};
use uuid::Uuid;

use crate::database::db_error;
use crate::ledger_repo::{apply_credit, commission_for_order, lock_wallet, save_wallet, upsert_wallet};

/// Postgres-backed implementation of every repository trait.
#[derive(Clone)]
pub struct PgStore {
    pub(crate) pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

const ORDER_COLUMNS: &str = "id, dropshipper_id, product_id, customer_name, customer_phone, customer_email, \
    customer_id_number, delivery_address, delivery_city, delivery_department, delivery_postal_code, \
    maps_location, payment_method, quantity, unit_price, total_amount, commission_percentage, \
    commission_amount, status, notes, idempotency_key, created_at, updated_at";

#[derive(sqlx::FromRow)]
struct OrderRow {
    id: Uuid,
    dropshipper_id: Uuid,
    product_id: Uuid,
    customer_name: String,
    customer_phone: String,
    customer_email: Option<String>,
    customer_id_number: Option<String>,
    delivery_address: String,
    delivery_city: Option<String>,
    delivery_department: Option<String>,
    delivery_postal_code: Option<String>,
    maps_location: Option<String>,
    payment_method: String,
    quantity: i32,
    unit_price: Decimal,
    total_amount: Decimal,
    commission_percentage: Decimal,
    commission_amount: Decimal,
    status: String,
    notes: Option<String>,
    idempotency_key: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<OrderRow> for Order {
    type Error = CoreError;

    fn try_from(row: OrderRow) -> Result<Self, Self::Error> {
        Ok(Order {
            id: row.id,
            dropshipper_id: row.dropshipper_id,
            product_id: row.product_id,
            customer: CustomerContact {
                name: row.customer_name,
                phone: Masked::new(row.customer_phone),
                email: row.customer_email,
                id_number: row.customer_id_number.map(Masked::new),
            },
            delivery: DeliveryDetails {
                address: row.delivery_address,
                city: row.delivery_city,
                department: row.delivery_department,
                postal_code: row.delivery_postal_code,
                maps_location: row.maps_location,
            },
            payment_method: row
                .payment_method
                .parse()
                .map_err(|_| CoreError::PersistenceError(format!("bad payment method on order {}", row.id)))?,
            quantity: row.quantity,
            unit_price: row.unit_price,
            total_amount: row.total_amount,
            commission_percentage: row.commission_percentage,
            commission_amount: row.commission_amount,
            status: row
                .status
                .parse()
                .map_err(|_| CoreError::PersistenceError(format!("bad status on order {}", row.id)))?,
            notes: row.notes,
            idempotency_key: row.idempotency_key,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

async fn fetch_order(conn: &mut PgConnection, id: Uuid, for_update: bool) -> CoreResult<Option<Order>> {
    let sql = format!(
        "SELECT {} FROM orders WHERE id = $1{}",
        ORDER_COLUMNS,
        if for_update { " FOR UPDATE" } else { "" }
    );
    let row: Option<OrderRow> = sqlx::query_as(&sql)
        .bind(id)
        .fetch_optional(&mut *conn)
        .await
        .map_err(db_error)?;
    row.map(Order::try_from).transpose()
}

async fn fetch_by_idempotency_key(conn: &mut PgConnection, dropshipper_id: Uuid, key: &str) -> CoreResult<Option<Order>> {
    let sql = format!(
        "SELECT {} FROM orders WHERE dropshipper_id = $1 AND idempotency_key = $2",
        ORDER_COLUMNS
    );
    let row: Option<OrderRow> = sqlx::query_as(&sql)
        .bind(dropshipper_id)
        .bind(key)
        .fetch_optional(&mut *conn)
        .await
        .map_err(db_error)?;
    row.map(Order::try_from).transpose()
}

/// Inserts the order. Returns false when the idempotency key is already taken.
async fn insert_order(conn: &mut PgConnection, order: &Order) -> CoreResult<bool> {
    let inserted: Option<(Uuid,)> = sqlx::query_as(
        r#"
        INSERT INTO orders (id, dropshipper_id, product_id, customer_name, customer_phone, customer_email,
            customer_id_number, delivery_address, delivery_city, delivery_department, delivery_postal_code,
            maps_location, payment_method, quantity, unit_price, total_amount, commission_percentage,
            commission_amount, status, notes, idempotency_key, created_at, updated_at)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17, $18, $19, $20, $21, $22, $23)
        ON CONFLICT (dropshipper_id, idempotency_key) WHERE idempotency_key IS NOT NULL DO NOTHING
        RETURNING id
        "#,
    )
    .bind(order.id)
    .bind(order.dropshipper_id)
    .bind(order.product_id)
    .bind(&order.customer.name)
    .bind(order.customer.phone.inner())
    .bind(&order.customer.email)
    .bind(order.customer.id_number.as_ref().map(|n| n.inner().clone()))
    .bind(&order.delivery.address)
    .bind(&order.delivery.city)
    .bind(&order.delivery.department)
    .bind(&order.delivery.postal_code)
    .bind(&order.delivery.maps_location)
    .bind(order.payment_method.as_str())
    .bind(order.quantity)
    .bind(order.unit_price)
    .bind(order.total_amount)
    .bind(order.commission_percentage)
    .bind(order.commission_amount)
    .bind(order.status.as_str())
    .bind(&order.notes)
    .bind(&order.idempotency_key)
    .bind(order.created_at)
    .bind(order.updated_at)
    .fetch_optional(&mut *conn)
    .await
    .map_err(db_error)?;

    Ok(inserted.is_some())
}

async fn replay(conn: &mut PgConnection, existing: Order) -> CoreResult<SettlementReceipt> {
    let wallet = upsert_wallet(conn, existing.dropshipper_id).await?;
    let transaction = commission_for_order(conn, existing.id)
        .await?
        .ok_or_else(|| CoreError::PersistenceError(format!("order {} has no commission entry", existing.id)))?;
    Ok(SettlementReceipt {
        order: existing,
        wallet,
        transaction,
        replayed: true,
    })
}

#[async_trait]
impl OrderRepository for PgStore {
    async fn get_order(&self, id: Uuid) -> CoreResult<Option<Order>> {
        let mut conn = self.pool.acquire().await.map_err(db_error)?;
        fetch_order(&mut conn, id, false).await
    }

    async fn list_orders(&self, dropshipper_id: Uuid) -> CoreResult<Vec<Order>> {
        let sql = format!(
            "SELECT {} FROM orders WHERE dropshipper_id = $1 ORDER BY created_at DESC, id DESC",
            ORDER_COLUMNS
        );
        let rows: Vec<OrderRow> = sqlx::query_as(&sql)
            .bind(dropshipper_id)
            .fetch_all(&self.pool)
            .await
            .map_err(db_error)?;
        rows.into_iter().map(Order::try_from).collect()
    }

    async fn list_all_orders(&self) -> CoreResult<Vec<Order>> {
        let sql = format!("SELECT {} FROM orders ORDER BY created_at DESC, id DESC", ORDER_COLUMNS);
        let rows: Vec<OrderRow> = sqlx::query_as(&sql)
            .fetch_all(&self.pool)
            .await
            .map_err(db_error)?;
        rows.into_iter().map(Order::try_from).collect()
    }

    async fn update_order_status(&self, id: Uuid, to: OrderStatus) -> CoreResult<StatusChange> {
        let mut tx = self.pool.begin().await.map_err(db_error)?;

        // Row lock makes the check and the write a single compare-and-set.
        let mut order = fetch_order(&mut tx, id, true)
            .await?
            .ok_or_else(|| CoreError::not_found("order", id))?;
        order.status.transition(to)?;
        order.update_status(to);

        sqlx::query("UPDATE orders SET status = $2, updated_at = $3 WHERE id = $1")
            .bind(id)
            .bind(to.as_str())
            .bind(order.updated_at)
            .execute(&mut *tx)
            .await
            .map_err(db_error)?;

        let mut reversal = None;
        let mut wallet_balance = None;
        if to.reverses_commission() {
            if let Some(credit) = commission_for_order(&mut tx, id).await? {
                let refund = WalletTransaction::commission_reversal(credit.wallet_id, id, credit.amount);
                let inserted = sqlx::query(
                    r#"
                    INSERT INTO wallet_transactions (id, wallet_id, order_id, transaction_type, amount, description, status, created_at)
                    VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
                    ON CONFLICT (order_id) WHERE transaction_type = 'REFUND' DO NOTHING
                    "#,
                )
                .bind(refund.id)
                .bind(refund.wallet_id)
                .bind(refund.order_id)
                .bind(refund.transaction_type.as_str())
                .bind(refund.amount)
                .bind(&refund.description)
                .bind(refund.status.as_str())
                .bind(refund.created_at)
                .execute(&mut *tx)
                .await
                .map_err(db_error)?
                .rows_affected();

                if inserted == 1 {
                    let mut wallet = lock_wallet(&mut tx, credit.wallet_id).await?;
                    wallet.reverse_credit(credit.amount);
                    save_wallet(&mut tx, &wallet).await?;
                    wallet_balance = Some(wallet.balance);
                    reversal = Some(refund);
                }
            }
        }

        tx.commit().await.map_err(db_error)?;

        Ok(StatusChange {
            order,
            reversal,
            wallet_balance,
        })
    }
}

#[async_trait]
impl SettlementStore for PgStore {
    async fn settle(&self, order: Order) -> CoreResult<SettlementReceipt> {
        let mut tx = self.pool.begin().await.map_err(db_error)?;

        if let Some(key) = &order.idempotency_key {
            if let Some(existing) = fetch_by_idempotency_key(&mut tx, order.dropshipper_id, key).await? {
                let receipt = replay(&mut tx, existing).await?;
                tx.commit().await.map_err(db_error)?;
                return Ok(receipt);
            }
        }

        if !insert_order(&mut tx, &order).await? {
            // A concurrent request with the same key committed first.
            let key = order.idempotency_key.as_deref().unwrap_or_default();
            let existing = fetch_by_idempotency_key(&mut tx, order.dropshipper_id, key)
                .await?
                .ok_or_else(|| CoreError::PersistenceError(format!("order insert for {} was skipped", order.id)))?;
            let receipt = replay(&mut tx, existing).await?;
            tx.commit().await.map_err(db_error)?;
            return Ok(receipt);
        }

        let wallet = upsert_wallet(&mut tx, order.dropshipper_id).await?;
        let (wallet, outcome) = apply_credit(&mut tx, wallet.id, order.id, order.commission_amount).await?;

        tx.commit().await.map_err(db_error)?;

        Ok(SettlementReceipt {
            order,
            wallet,
            transaction: outcome.transaction().clone(),
            replayed: false,
        })
    }
}
