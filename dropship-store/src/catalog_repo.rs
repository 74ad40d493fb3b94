use async_trait::async_trait;
use dropship_core::catalog::{Product, ProductLookup};
use dropship_core::identity::{Dropshipper, IdentityLookup};
use dropship_core::CoreResult;
use rust_decimal::Decimal;
use sqlx::PgPool;
use uuid::Uuid;

use crate::database::db_error;

/// Read-only view of the catalog and user tables owned by other services.
#[derive(Clone)]
pub struct PgCatalog {
    pool: PgPool,
}

impl PgCatalog {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[derive(sqlx::FromRow)]
struct ProductRow {
    id: Uuid,
    name: String,
    wholesale_price: Decimal,
    suggested_retail_price: Decimal,
    commission_percentage: Option<Decimal>,
    min_commission: Option<Decimal>,
    max_commission: Option<Decimal>,
    stock: i32,
    is_active: bool,
}

impl From<ProductRow> for Product {
    fn from(row: ProductRow) -> Self {
        Product {
            id: row.id,
            name: row.name,
            wholesale_price: row.wholesale_price,
            suggested_retail_price: row.suggested_retail_price,
            commission_percentage: row.commission_percentage,
            min_commission: row.min_commission,
            max_commission: row.max_commission,
            stock: row.stock,
            is_active: row.is_active,
        }
    }
}

#[async_trait]
impl ProductLookup for PgCatalog {
    async fn get_product(&self, id: Uuid) -> CoreResult<Option<Product>> {
        let row: Option<ProductRow> = sqlx::query_as(
            "SELECT id, name, wholesale_price, suggested_retail_price, commission_percentage, \
             min_commission, max_commission, stock, is_active FROM products WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(db_error)?;
        Ok(row.map(Product::from))
    }
}

#[derive(sqlx::FromRow)]
struct UserRow {
    id: Uuid,
    name: String,
    email: Option<String>,
}

#[async_trait]
impl IdentityLookup for PgCatalog {
    async fn get_dropshipper(&self, id: Uuid) -> CoreResult<Option<Dropshipper>> {
        let row: Option<UserRow> = sqlx::query_as("SELECT id, name, email FROM users WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(db_error)?;
        Ok(row.map(|r| Dropshipper {
            id: r.id,
            name: r.name,
            email: r.email,
        }))
    }
}
