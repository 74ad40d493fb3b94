use dropship_core::catalog::Product;
use dropship_core::identity::Dropshipper;
use dropship_core::transport::MessageTransport;
use dropship_core::TransportError;
use dropship_shared::pii::redact_email;
use futures_util::future::join_all;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::models::Order;
use crate::notification::{DeliveryOutcome, EmailNotification, NotificationStatus, RecipientType};
use crate::repository::NotificationRepository;
use crate::templates::{self, MessageContext, RenderedMessage};

#[derive(Debug, Clone)]
pub struct DispatchSettings {
    /// Company mailbox. No company message is sent when unset.
    pub operator_address: Option<String>,
    pub send_timeout: Duration,
    pub brand_name: String,
}

impl Default for DispatchSettings {
    fn default() -> Self {
        Self {
            operator_address: None,
            send_timeout: Duration::from_secs(10),
            brand_name: "La Hora de las Compras".to_string(),
        }
    }
}

/// A rendered message together with its notification row.
#[derive(Debug, Clone)]
pub struct PreparedNotification {
    pub row: EmailNotification,
    pub message: RenderedMessage,
    /// Whether the PENDING row made it to storage.
    pub recorded: bool,
}

/// Rows written by one dispatch, in recipient order.
#[derive(Debug, Clone, Default)]
pub struct DispatchReport {
    pub notifications: Vec<EmailNotification>,
}

impl DispatchReport {
    pub fn count(&self, status: NotificationStatus) -> usize {
        self.notifications.iter().filter(|n| n.status == status).count()
    }
}

/// Sends the per-recipient messages for an order and records every attempt.
///
/// Rows are written as PENDING before the transport is called, so a crash
/// before or during the send leaves a trace that the stale sweep later picks up. Nothing here
/// returns an error to the caller; failures end up on the rows.
pub struct NotificationDispatcher {
    transport: Arc<dyn MessageTransport>,
    notifications: Arc<dyn NotificationRepository>,
    settings: DispatchSettings,
}

impl NotificationDispatcher {
    pub fn new(
        transport: Arc<dyn MessageTransport>,
        notifications: Arc<dyn NotificationRepository>,
        settings: DispatchSettings,
    ) -> Self {
        Self { transport, notifications, settings }
    }

    pub fn settings(&self) -> &DispatchSettings {
        &self.settings
    }

    /// Recipients with a usable address.
    pub fn recipients(&self, order: &Order, dropshipper: Option<&Dropshipper>) -> Vec<(RecipientType, String)> {
        let candidates = [
            (RecipientType::Customer, order.customer.email.clone()),
            (RecipientType::Dropshipper, dropshipper.and_then(|d| d.email.clone())),
            (RecipientType::Company, self.settings.operator_address.clone()),
        ];

        candidates
            .into_iter()
            .filter_map(|(recipient, address)| match address {
                Some(a) if !a.trim().is_empty() => Some((recipient, a.trim().to_string())),
                _ => {
                    debug!(order_id = %order.id, recipient = %recipient, "No address, skipping");
                    None
                }
            })
            .collect()
    }

    pub fn render(
        &self,
        recipient: RecipientType,
        order: &Order,
        product: &Product,
        dropshipper: Option<&Dropshipper>,
    ) -> RenderedMessage {
        let ctx = MessageContext {
            order,
            product,
            dropshipper,
            brand_name: &self.settings.brand_name,
        };
        templates::render(recipient, &ctx)
    }

    /// Renders every recipient's message and writes its PENDING row. Rows are
    /// the durable record of intent: once written, the stale sweep and the
    /// retry path can finish the delivery even if the in-process job is lost.
    pub async fn prepare(
        &self,
        order: &Order,
        product: &Product,
        dropshipper: Option<&Dropshipper>,
    ) -> Vec<PreparedNotification> {
        let mut prepared = Vec::new();
        for (recipient, address) in self.recipients(order, dropshipper) {
            let message = self.render(recipient, order, product, dropshipper);
            let row = EmailNotification::pending(order.id, recipient, &address, &message.subject);
            let recorded = match self.notifications.create_notification(&row).await {
                Ok(()) => true,
                Err(e) => {
                    warn!(order_id = %order.id, recipient = %recipient, "Could not record notification, will retry at delivery: {}", e);
                    false
                }
            };
            prepared.push(PreparedNotification { row, message, recorded });
        }
        prepared
    }

    /// Delivers prepared notifications concurrently. Rows that could not be
    /// written during `prepare` get one more insert attempt before sending.
    pub async fn deliver_prepared(&self, order_id: Uuid, prepared: Vec<PreparedNotification>) -> DispatchReport {
        let sends = prepared.into_iter().map(|item| async move {
            if item.recorded {
                if !self.still_pending(&item.row).await {
                    return None;
                }
            } else if let Err(e) = self.notifications.create_notification(&item.row).await {
                error!(
                    order_id = %order_id,
                    recipient = %item.row.recipient_type,
                    "Could not record notification, recipient dropped: {}",
                    e
                );
                return None;
            }
            self.deliver(&item.row, &item.message).await
        });

        let notifications: Vec<EmailNotification> = join_all(sends).await.into_iter().flatten().collect();

        let report = DispatchReport { notifications };
        info!(
            order_id = %order_id,
            sent = report.count(NotificationStatus::Sent),
            failed = report.count(NotificationStatus::Failed),
            bounced = report.count(NotificationStatus::Bounced),
            "Order notifications dispatched"
        );
        report
    }

    pub async fn dispatch(
        &self,
        order: &Order,
        product: &Product,
        dropshipper: Option<&Dropshipper>,
    ) -> DispatchReport {
        let prepared = self.prepare(order, product, dropshipper).await;
        self.deliver_prepared(order.id, prepared).await
    }

    /// A queued row may have been swept and retried while it waited.
    async fn still_pending(&self, row: &EmailNotification) -> bool {
        match self.notifications.get_notification(row.id).await {
            Ok(Some(current)) if current.status == NotificationStatus::Pending && current.retry_count == row.retry_count => true,
            Ok(Some(current)) => {
                debug!(notification_id = %row.id, status = %current.status, "Row already handled, skipping queued send");
                false
            }
            Ok(None) => {
                error!(notification_id = %row.id, "Recorded notification disappeared");
                false
            }
            Err(e) => {
                // Leave it to the stale sweep.
                warn!(notification_id = %row.id, "Could not re-read notification: {}", e);
                false
            }
        }
    }

    /// Sends one message for an already recorded row and stores the outcome.
    pub async fn deliver(&self, row: &EmailNotification, message: &RenderedMessage) -> Option<EmailNotification> {
        let timeout = self.settings.send_timeout;
        let result = match tokio::time::timeout(
            timeout,
            self.transport.send(&row.recipient_address, &message.subject, &message.body),
        )
        .await
        {
            Ok(result) => result,
            Err(_) => Err(TransportError::Timeout(timeout)),
        };

        if let Err(e) = &result {
            warn!(
                notification_id = %row.id,
                to = %redact_email(&row.recipient_address),
                retry_count = row.retry_count,
                "Delivery failed: {}",
                e
            );
        }

        let outcome = DeliveryOutcome::from(result);
        match self.notifications.record_outcome(row.id, &outcome).await {
            Ok(updated) => Some(updated),
            Err(e) => {
                error!(notification_id = %row.id, "Failed to record delivery outcome: {}", e);
                None
            }
        }
    }
}
