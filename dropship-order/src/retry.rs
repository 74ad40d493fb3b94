use chrono::Utc;
use dropship_core::catalog::ProductLookup;
use dropship_core::identity::{IdentityLookup, Requester};
use dropship_core::{CoreError, CoreResult};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};
use uuid::Uuid;

use crate::dispatcher::NotificationDispatcher;
use crate::notification::{EmailNotification, NotificationStatus, MAX_RETRIES};
use crate::repository::{NotificationRepository, OrderRepository};

pub const STALE_PENDING_REASON: &str = "delivery outcome unknown: attempt never completed";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RetrySweep {
    pub attempted: usize,
    pub sent: usize,
    pub still_failing: usize,
}

/// Re-sends failed notifications, at most `MAX_RETRIES` times per row.
pub struct RetryScheduler {
    dispatcher: Arc<NotificationDispatcher>,
    notifications: Arc<dyn NotificationRepository>,
    orders: Arc<dyn OrderRepository>,
    products: Arc<dyn ProductLookup>,
    identities: Arc<dyn IdentityLookup>,
    stale_after: Duration,
}

impl RetryScheduler {
    pub fn new(
        dispatcher: Arc<NotificationDispatcher>,
        notifications: Arc<dyn NotificationRepository>,
        orders: Arc<dyn OrderRepository>,
        products: Arc<dyn ProductLookup>,
        identities: Arc<dyn IdentityLookup>,
        stale_after: Duration,
    ) -> Self {
        Self {
            dispatcher,
            notifications,
            orders,
            products,
            identities,
            stale_after,
        }
    }

    pub async fn list_retryable(&self) -> CoreResult<Vec<EmailNotification>> {
        self.notifications.list_retryable().await
    }

    /// Re-renders the message from the stored order and sends it again to the
    /// recorded address.
    pub async fn retry(&self, id: Uuid) -> CoreResult<EmailNotification> {
        let row = self
            .notifications
            .get_notification(id)
            .await?
            .ok_or_else(|| CoreError::not_found("notification", id))?;
        ensure_retryable(&row)?;

        let order = self
            .orders
            .get_order(row.order_id)
            .await?
            .ok_or_else(|| CoreError::not_found("order", row.order_id))?;
        let product = self
            .products
            .get_product(order.product_id)
            .await?
            .ok_or_else(|| CoreError::not_found("product", order.product_id))?;
        let dropshipper = self.identities.get_dropshipper(order.dropshipper_id).await?;

        // Another sweep may have claimed it since the read above.
        let claimed = self
            .notifications
            .begin_retry(id)
            .await?
            .ok_or_else(|| CoreError::ValidationError(format!("notification {} is no longer retryable", id)))?;

        let message = self
            .dispatcher
            .render(claimed.recipient_type, &order, &product, dropshipper.as_ref());

        info!(notification_id = %id, attempt = claimed.retry_count, "Retrying notification");
        self.dispatcher
            .deliver(&claimed, &message)
            .await
            .ok_or_else(|| CoreError::PersistenceError(format!("could not record retry outcome for {}", id)))
    }

    /// Retries every row that is still eligible. One failing row does not stop the sweep.
    pub async fn run_once(&self) -> CoreResult<RetrySweep> {
        let rows = self.notifications.list_retryable().await?;
        let mut sweep = RetrySweep::default();

        for row in rows {
            sweep.attempted += 1;
            match self.retry(row.id).await {
                Ok(updated) if updated.status == NotificationStatus::Sent => sweep.sent += 1,
                Ok(_) => sweep.still_failing += 1,
                Err(e) => {
                    sweep.still_failing += 1;
                    warn!(notification_id = %row.id, "Retry skipped: {}", e);
                }
            }
        }

        if sweep.attempted > 0 {
            info!(
                attempted = sweep.attempted,
                sent = sweep.sent,
                still_failing = sweep.still_failing,
                "Notification retry sweep finished"
            );
        }
        Ok(sweep)
    }

    /// Rows left pending longer than the threshold are marked failed so the
    /// next sweep retries them.
    pub async fn recover_stale(&self) -> CoreResult<u64> {
        let threshold = chrono::Duration::from_std(self.stale_after)
            .map_err(|e| CoreError::ValidationError(format!("invalid stale threshold: {}", e)))?;
        let recovered = self
            .notifications
            .fail_stale_pending(Utc::now() - threshold, STALE_PENDING_REASON)
            .await?;
        if recovered > 0 {
            warn!(recovered, "Stale pending notifications marked as failed");
        }
        Ok(recovered)
    }

    pub async fn failed_notifications(&self, requester: &Requester) -> CoreResult<Vec<EmailNotification>> {
        requester.require_operator()?;
        self.notifications.list_failed().await
    }

    pub async fn retry_notification(&self, requester: &Requester, id: Uuid) -> CoreResult<EmailNotification> {
        requester.require_operator()?;
        self.retry(id).await
    }
}

fn ensure_retryable(row: &EmailNotification) -> CoreResult<()> {
    match row.status {
        NotificationStatus::Failed if row.retry_count < MAX_RETRIES => Ok(()),
        NotificationStatus::Failed => Err(CoreError::ValidationError(format!(
            "notification {} reached the retry limit ({})",
            row.id, MAX_RETRIES
        ))),
        other => Err(CoreError::ValidationError(format!(
            "notification {} is {} and cannot be retried",
            row.id, other
        ))),
    }
}
