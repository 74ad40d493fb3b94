use chrono::Utc;
use dropship_core::catalog::ProductLookup;
use dropship_core::identity::{Requester, Role};
use dropship_core::{CoreError, CoreResult};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info};
use uuid::Uuid;

use crate::finance::CommissionPolicy;
use crate::models::{CustomerContact, DeliveryDetails, Order, OrderStatus, PaymentMethod};
use crate::queue::DispatchQueue;
use crate::repository::SettlementStore;

const MAX_IDEMPOTENCY_KEY_LEN: usize = 128;

#[derive(Debug, Clone, Deserialize)]
pub struct PlaceOrderInput {
    pub product_id: Uuid,
    pub customer: CustomerContact,
    pub delivery: DeliveryDetails,
    pub payment_method: PaymentMethod,
    pub quantity: i32,
    /// Overrides the product's suggested retail price.
    pub unit_price: Option<Decimal>,
    pub notes: Option<String>,
    /// Repeating a key returns the first order instead of settling again.
    pub idempotency_key: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct PlacedOrder {
    pub order_id: Uuid,
    pub total_amount: Decimal,
    pub commission_amount: Decimal,
    pub profit_per_unit: Decimal,
    pub replayed: bool,
    pub order: Order,
}

/// Turns a sale into a committed order plus commission credit, then queues
/// the notifications.
pub struct SettlementOrchestrator {
    products: Arc<dyn ProductLookup>,
    store: Arc<dyn SettlementStore>,
    policy: CommissionPolicy,
    queue: DispatchQueue,
}

impl SettlementOrchestrator {
    pub fn new(
        products: Arc<dyn ProductLookup>,
        store: Arc<dyn SettlementStore>,
        policy: CommissionPolicy,
        queue: DispatchQueue,
    ) -> Self {
        Self { products, store, policy, queue }
    }

    pub async fn place_order(&self, requester: &Requester, input: PlaceOrderInput) -> CoreResult<PlacedOrder> {
        if requester.role != Role::Dropshipper {
            return Err(CoreError::Forbidden("only dropshippers place orders".to_string()));
        }
        validate(&input)?;

        let product = self
            .products
            .get_product(input.product_id)
            .await?
            .filter(|p| p.is_active)
            .ok_or_else(|| CoreError::not_found("product", input.product_id))?;

        let unit_price = input.unit_price.unwrap_or(product.suggested_retail_price);
        let (commission_percentage, breakdown) = self.policy.settle(&product, unit_price, input.quantity)?;

        let now = Utc::now();
        let order = Order {
            id: Uuid::new_v4(),
            dropshipper_id: requester.user_id,
            product_id: product.id,
            customer: input.customer,
            delivery: input.delivery,
            payment_method: input.payment_method,
            quantity: input.quantity,
            unit_price,
            total_amount: breakdown.total,
            commission_percentage,
            commission_amount: breakdown.commission,
            status: OrderStatus::Pending,
            notes: input.notes.filter(|n| !n.trim().is_empty()),
            idempotency_key: input.idempotency_key,
            created_at: now,
            updated_at: now,
        };

        let receipt = self.store.settle(order).await?;
        let order = receipt.order;

        if receipt.replayed {
            info!(order_id = %order.id, dropshipper_id = %order.dropshipper_id, "Order replayed from idempotency key");
        } else {
            info!(
                order_id = %order.id,
                dropshipper_id = %order.dropshipper_id,
                total = %order.total_amount,
                commission = %order.commission_amount,
                wallet_id = %receipt.wallet.id,
                "Order settled"
            );
            let queued = self.queue.submit(&order, &product).await;
            debug!(order_id = %order.id, queued, "Notifications recorded");
        }

        Ok(PlacedOrder {
            order_id: order.id,
            total_amount: order.total_amount,
            commission_amount: order.commission_amount,
            profit_per_unit: order.profit_per_unit(),
            replayed: receipt.replayed,
            order,
        })
    }
}

fn validate(input: &PlaceOrderInput) -> CoreResult<()> {
    if input.customer.name.trim().is_empty() {
        return Err(CoreError::ValidationError("customer name is required".to_string()));
    }
    if input.customer.phone.inner().trim().is_empty() {
        return Err(CoreError::ValidationError("customer phone is required".to_string()));
    }
    if input.delivery.address.trim().is_empty() {
        return Err(CoreError::ValidationError("delivery address is required".to_string()));
    }
    if input.quantity < 1 {
        return Err(CoreError::ValidationError(format!(
            "quantity must be at least 1, got {}",
            input.quantity
        )));
    }
    if let Some(price) = input.unit_price {
        if price <= Decimal::ZERO {
            return Err(CoreError::ValidationError(format!("unit price must be positive, got {}", price)));
        }
    }
    if let Some(key) = &input.idempotency_key {
        if key.trim().is_empty() || key.len() > MAX_IDEMPOTENCY_KEY_LEN {
            return Err(CoreError::ValidationError(format!(
                "idempotency key must be 1..={} characters",
                MAX_IDEMPOTENCY_KEY_LEN
            )));
        }
    }
    Ok(())
}
