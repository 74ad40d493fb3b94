use dropship_core::identity::Requester;
use dropship_core::{CoreError, CoreResult};
use rust_decimal::Decimal;
use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;

use crate::models::{Order, OrderStatus};
use crate::repository::OrderRepository;

/// Order reads and lifecycle transitions with access checks.
pub struct OrderManager {
    orders: Arc<dyn OrderRepository>,
}

impl OrderManager {
    pub fn new(orders: Arc<dyn OrderRepository>) -> Self {
        Self { orders }
    }

    /// Owner or operator only.
    pub async fn get_order(&self, requester: &Requester, order_id: Uuid) -> CoreResult<Order> {
        let order = self.load(order_id).await?;
        requester.require_owner_or_operator(order.dropshipper_id)?;
        Ok(order)
    }

    /// The requester's own orders, newest first.
    pub async fn list_orders(&self, requester: &Requester) -> CoreResult<Vec<Order>> {
        self.orders.list_orders(requester.user_id).await
    }

    pub async fn list_orders_for(&self, requester: &Requester, dropshipper_id: Uuid) -> CoreResult<Vec<Order>> {
        requester.require_owner_or_operator(dropshipper_id)?;
        self.orders.list_orders(dropshipper_id).await
    }

    pub async fn list_all_orders(&self, requester: &Requester) -> CoreResult<Vec<Order>> {
        requester.require_operator()?;
        self.orders.list_all_orders().await
    }

    /// Operator-only. Rejects edges outside the lifecycle with `InvalidTransition`
    /// and leaves the order unchanged.
    pub async fn update_order_status(
        &self,
        requester: &Requester,
        order_id: Uuid,
        new_status: OrderStatus,
    ) -> CoreResult<Order> {
        requester.require_operator()?;

        let current = self.load(order_id).await?;
        current.status.transition(new_status)?;

        let change = self.orders.update_order_status(order_id, new_status).await?;

        info!(
            order_id = %order_id,
            from = %current.status,
            to = %new_status,
            operator = %requester.user_id,
            "Order status updated"
        );

        if let Some(reversal) = &change.reversal {
            info!(order_id = %order_id, amount = %reversal.amount, "Commission reversed");
            if let Some(balance) = change.wallet_balance.filter(|b| *b < Decimal::ZERO) {
                warn!(
                    order_id = %order_id,
                    wallet_id = %reversal.wallet_id,
                    balance = %balance,
                    "Wallet balance negative after commission reversal"
                );
            }
        }

        Ok(change.order)
    }

    async fn load(&self, order_id: Uuid) -> CoreResult<Order> {
        self.orders
            .get_order(order_id)
            .await?
            .ok_or_else(|| CoreError::not_found("order", order_id))
    }
}
