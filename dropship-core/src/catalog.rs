use async_trait::async_trait;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::CoreResult;

/// Catalog product as read at order time. The core never writes products.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Product {
    pub id: Uuid,
    pub name: String,
    pub wholesale_price: Decimal,
    pub suggested_retail_price: Decimal,
    /// Falls back to the configured default percentage when absent.
    pub commission_percentage: Option<Decimal>,
    pub min_commission: Option<Decimal>,
    pub max_commission: Option<Decimal>,
    pub stock: i32,
    pub is_active: bool,
}

#[async_trait]
pub trait ProductLookup: Send + Sync {
    async fn get_product(&self, id: Uuid) -> CoreResult<Option<Product>>;
}
