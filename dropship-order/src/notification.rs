use chrono::{DateTime, Utc};
use dropship_core::{CoreError, TransportError};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Re-attempts allowed after the first failed send.
pub const MAX_RETRIES: i32 = 3;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RecipientType {
    Customer,
    Dropshipper,
    /// The operator mailbox.
    Company,
}

impl RecipientType {
    pub const ALL: [RecipientType; 3] = [
        RecipientType::Customer,
        RecipientType::Dropshipper,
        RecipientType::Company,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            RecipientType::Customer => "CUSTOMER",
            RecipientType::Dropshipper => "DROPSHIPPER",
            RecipientType::Company => "COMPANY",
        }
    }
}

impl fmt::Display for RecipientType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RecipientType {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "CUSTOMER" => Ok(RecipientType::Customer),
            "DROPSHIPPER" => Ok(RecipientType::Dropshipper),
            "COMPANY" => Ok(RecipientType::Company),
            other => Err(CoreError::PersistenceError(format!("unknown recipient type: {}", other))),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum NotificationStatus {
    Pending,
    Sent,
    Failed,
    /// Permanently refused by the remote side. Never retried.
    Bounced,
}

impl NotificationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            NotificationStatus::Pending => "PENDING",
            NotificationStatus::Sent => "SENT",
            NotificationStatus::Failed => "FAILED",
            NotificationStatus::Bounced => "BOUNCED",
        }
    }
}

impl fmt::Display for NotificationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for NotificationStatus {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "PENDING" => Ok(NotificationStatus::Pending),
            "SENT" => Ok(NotificationStatus::Sent),
            "FAILED" => Ok(NotificationStatus::Failed),
            "BOUNCED" => Ok(NotificationStatus::Bounced),
            other => Err(CoreError::PersistenceError(format!("unknown notification status: {}", other))),
        }
    }
}

/// Delivery record for one recipient of one order event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmailNotification {
    pub id: Uuid,
    pub order_id: Uuid,
    pub recipient_type: RecipientType,
    pub recipient_address: String,
    pub subject: String,
    pub status: NotificationStatus,
    pub sent_at: Option<DateTime<Utc>>,
    pub failure_reason: Option<String>,
    pub retry_count: i32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl EmailNotification {
    pub fn pending(
        order_id: Uuid,
        recipient_type: RecipientType,
        recipient_address: &str,
        subject: &str,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            order_id,
            recipient_type,
            recipient_address: recipient_address.to_string(),
            subject: subject.to_string(),
            status: NotificationStatus::Pending,
            sent_at: None,
            failure_reason: None,
            retry_count: 0,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn is_retryable(&self) -> bool {
        self.status == NotificationStatus::Failed && self.retry_count < MAX_RETRIES
    }

    /// Moves a retryable row back to pending and counts the attempt.
    /// Returns false when the row may not be retried.
    pub fn claim_retry(&mut self) -> bool {
        if !self.is_retryable() {
            return false;
        }
        self.status = NotificationStatus::Pending;
        self.retry_count += 1;
        self.updated_at = Utc::now();
        true
    }

    pub fn apply_outcome(&mut self, outcome: &DeliveryOutcome) {
        let now = Utc::now();
        match outcome {
            DeliveryOutcome::Sent => {
                self.status = NotificationStatus::Sent;
                self.sent_at = Some(now);
                self.failure_reason = None;
            }
            DeliveryOutcome::Failed(reason) => {
                self.status = NotificationStatus::Failed;
                self.failure_reason = Some(reason.clone());
            }
            DeliveryOutcome::Bounced(reason) => {
                self.status = NotificationStatus::Bounced;
                self.failure_reason = Some(reason.clone());
            }
        }
        self.updated_at = now;
    }
}

/// What happened to a single send attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeliveryOutcome {
    Sent,
    Failed(String),
    Bounced(String),
}

impl DeliveryOutcome {
    pub fn status(&self) -> NotificationStatus {
        match self {
            DeliveryOutcome::Sent => NotificationStatus::Sent,
            DeliveryOutcome::Failed(_) => NotificationStatus::Failed,
            DeliveryOutcome::Bounced(_) => NotificationStatus::Bounced,
        }
    }

    pub fn failure_reason(&self) -> Option<&str> {
        match self {
            DeliveryOutcome::Sent => None,
            DeliveryOutcome::Failed(reason) | DeliveryOutcome::Bounced(reason) => Some(reason),
        }
    }
}

impl From<Result<(), TransportError>> for DeliveryOutcome {
    fn from(result: Result<(), TransportError>) -> Self {
        match result {
            Ok(()) => DeliveryOutcome::Sent,
            Err(e) if e.is_permanent() => DeliveryOutcome::Bounced(e.to_string()),
            Err(e) => DeliveryOutcome::Failed(e.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_retry_cap() {
        let mut row = EmailNotification::pending(Uuid::new_v4(), RecipientType::Customer, "a@b.test", "s");
        row.apply_outcome(&DeliveryOutcome::Failed("relay down".to_string()));
        assert_eq!(row.retry_count, 0);

        for attempt in 1..=MAX_RETRIES {
            assert!(row.claim_retry());
            assert_eq!(row.status, NotificationStatus::Pending);
            assert_eq!(row.retry_count, attempt);
            row.apply_outcome(&DeliveryOutcome::Failed("relay down".to_string()));
        }

        assert_eq!(row.status, NotificationStatus::Failed);
        assert_eq!(row.retry_count, MAX_RETRIES);
        assert!(!row.is_retryable());
        assert!(!row.claim_retry());
    }

    #[test]
    fn test_sent_and_bounced_rows_are_not_retryable() {
        let mut sent = EmailNotification::pending(Uuid::new_v4(), RecipientType::Company, "ops@b.test", "s");
        sent.apply_outcome(&DeliveryOutcome::Sent);
        assert!(sent.sent_at.is_some());
        assert!(!sent.claim_retry());

        let mut bounced = EmailNotification::pending(Uuid::new_v4(), RecipientType::Customer, "x@b.test", "s");
        bounced.apply_outcome(&DeliveryOutcome::Bounced("no such mailbox".to_string()));
        assert!(!bounced.claim_retry());
    }

    #[test]
    fn test_outcome_from_transport_result() {
        assert_eq!(DeliveryOutcome::from(Ok(())), DeliveryOutcome::Sent);
        assert_eq!(
            DeliveryOutcome::from(Err(TransportError::Timeout(Duration::from_secs(5)))).status(),
            NotificationStatus::Failed
        );
        assert_eq!(
            DeliveryOutcome::from(Err(TransportError::Rejected("gone".to_string()))).status(),
            NotificationStatus::Bounced
        );
    }
}
