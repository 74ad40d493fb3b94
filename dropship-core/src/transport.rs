use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet};
use std::time::Duration;

use dropship_shared::pii::redact_email;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransportError {
    #[error("transport unavailable: {0}")]
    Unavailable(String),
    #[error("send timed out after {0:?}")]
    Timeout(Duration),
    /// The remote side refused the message for good (unknown mailbox, blocked domain).
    #[error("message rejected: {0}")]
    Rejected(String),
}

impl TransportError {
    /// Permanent failures are recorded as bounced and never retried.
    pub fn is_permanent(&self) -> bool {
        matches!(self, TransportError::Rejected(_))
    }
}

/// Outbound message channel (SMTP relay, HTTP mail API, ...).
#[async_trait]
pub trait MessageTransport: Send + Sync {
    async fn send(&self, address: &str, subject: &str, body: &str) -> Result<(), TransportError>;
}

/// Writes messages to the log instead of delivering them. Used in development.
pub struct LogTransport {
    sender: String,
}

impl LogTransport {
    pub fn new(sender: impl Into<String>) -> Self {
        Self { sender: sender.into() }
    }
}

#[async_trait]
impl MessageTransport for LogTransport {
    async fn send(&self, address: &str, subject: &str, body: &str) -> Result<(), TransportError> {
        tracing::info!(
            from = %self.sender,
            to = %redact_email(address),
            subject = %subject,
            body_len = body.len(),
            "Message delivered to log transport"
        );
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SentMessage {
    pub address: String,
    pub subject: String,
    pub body: String,
}

/// In-process transport that records every message. Addresses can be set to
/// fail, reject or stall so delivery failures can be reproduced.
#[derive(Default)]
pub struct MockTransport {
    sent: Mutex<Vec<SentMessage>>,
    failing: Mutex<HashSet<String>>,
    rejecting: Mutex<HashSet<String>>,
    stalling: Mutex<HashMap<String, Duration>>,
    attempts: Mutex<HashMap<String, u32>>,
}

impl MockTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_address(&self, address: &str) {
        self.failing.lock().insert(address.to_string());
    }

    pub fn reject_address(&self, address: &str) {
        self.rejecting.lock().insert(address.to_string());
    }

    pub fn stall_address(&self, address: &str, delay: Duration) {
        self.stalling.lock().insert(address.to_string(), delay);
    }

    /// Clears any configured failure for the address.
    pub fn heal_address(&self, address: &str) {
        self.failing.lock().remove(address);
        self.rejecting.lock().remove(address);
        self.stalling.lock().remove(address);
    }

    pub fn sent(&self) -> Vec<SentMessage> {
        self.sent.lock().clone()
    }

    pub fn sent_to(&self, address: &str) -> Vec<SentMessage> {
        self.sent
            .lock()
            .iter()
            .filter(|m| m.address == address)
            .cloned()
            .collect()
    }

    /// Number of send calls seen for the address, successful or not.
    pub fn attempts(&self, address: &str) -> u32 {
        self.attempts.lock().get(address).copied().unwrap_or(0)
    }
}

#[async_trait]
impl MessageTransport for MockTransport {
    async fn send(&self, address: &str, subject: &str, body: &str) -> Result<(), TransportError> {
        *self.attempts.lock().entry(address.to_string()).or_insert(0) += 1;

        let delay = self.stalling.lock().get(address).copied();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        if self.rejecting.lock().contains(address) {
            return Err(TransportError::Rejected(format!("mailbox {} does not exist", address)));
        }
        if self.failing.lock().contains(address) {
            return Err(TransportError::Unavailable("simulated relay outage".to_string()));
        }

        self.sent.lock().push(SentMessage {
            address: address.to_string(),
            subject: subject.to_string(),
            body: body.to_string(),
        });
        Ok(())
    }
}
