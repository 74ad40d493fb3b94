pub mod money;
pub mod pii;

pub use money::{format_guarani, round_currency, CURRENCY};
pub use pii::Masked;
