pub mod catalog;
pub mod identity;
pub mod transport;

use rust_decimal::Decimal;

pub use transport::TransportError;

#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    #[error("Validation failed: {0}")]
    ValidationError(String),
    #[error("Not found: {0}")]
    NotFound(String),
    #[error("Forbidden: {0}")]
    Forbidden(String),
    #[error("Invalid state transition from {from} to {to}")]
    InvalidTransition { from: String, to: String },
    #[error("Insufficient funds: requested {requested}, available {available}")]
    InsufficientFunds {
        requested: Decimal,
        available: Decimal,
    },
    #[error("Transport error: {0}")]
    TransportError(#[from] TransportError),
    #[error("Persistence error: {0}")]
    PersistenceError(String),
}

pub type CoreResult<T> = Result<T, CoreError>;

impl CoreError {
    pub fn not_found(kind: &str, id: impl std::fmt::Display) -> Self {
        CoreError::NotFound(format!("{} {}", kind, id))
    }
}
