use chrono::{DateTime, Utc};
use dropship_core::{CoreError, CoreResult};
use dropship_shared::pii::Masked;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Order status in the lifecycle
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderStatus {
    Pending,
    Confirmed,
    Processing,
    Shipped,
    Delivered,
    Cancelled,
    Refunded,
}

impl OrderStatus {
    pub const ALL: [OrderStatus; 7] = [
        OrderStatus::Pending,
        OrderStatus::Confirmed,
        OrderStatus::Processing,
        OrderStatus::Shipped,
        OrderStatus::Delivered,
        OrderStatus::Cancelled,
        OrderStatus::Refunded,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            OrderStatus::Pending => "PENDING",
            OrderStatus::Confirmed => "CONFIRMED",
            OrderStatus::Processing => "PROCESSING",
            OrderStatus::Shipped => "SHIPPED",
            OrderStatus::Delivered => "DELIVERED",
            OrderStatus::Cancelled => "CANCELLED",
            OrderStatus::Refunded => "REFUNDED",
        }
    }

    /// Allowed edges of the lifecycle:
    ///
    /// ```text
    /// PENDING -> CONFIRMED -> PROCESSING -> SHIPPED -> DELIVERED -> REFUNDED
    /// PENDING | CONFIRMED | PROCESSING -> CANCELLED
    /// ```
    pub fn can_transition_to(self, next: OrderStatus) -> bool {
        use OrderStatus::*;
        match self {
            Pending => matches!(next, Confirmed | Cancelled),
            Confirmed => matches!(next, Processing | Cancelled),
            Processing => matches!(next, Shipped | Cancelled),
            Shipped => matches!(next, Delivered),
            Delivered => matches!(next, Refunded),
            Cancelled | Refunded => false,
        }
    }

    pub fn transition(self, next: OrderStatus) -> CoreResult<OrderStatus> {
        if self.can_transition_to(next) {
            Ok(next)
        } else {
            Err(CoreError::InvalidTransition {
                from: self.to_string(),
                to: next.to_string(),
            })
        }
    }

    /// No outgoing edges. DELIVERED is not terminal since it can still be refunded.
    pub fn is_terminal(self) -> bool {
        OrderStatus::ALL.iter().all(|next| !self.can_transition_to(*next))
    }

    /// Entering this status takes the commission back out of the wallet.
    pub fn reverses_commission(self) -> bool {
        matches!(self, OrderStatus::Cancelled | OrderStatus::Refunded)
    }
}

impl fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OrderStatus {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        OrderStatus::ALL
            .into_iter()
            .find(|status| status.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| CoreError::ValidationError(format!("unknown order status: {}", s)))
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PaymentMethod {
    Card,
    Transfer,
    MobileWallet,
    Cash,
    CashOnDelivery,
}

impl PaymentMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentMethod::Card => "CARD",
            PaymentMethod::Transfer => "TRANSFER",
            PaymentMethod::MobileWallet => "MOBILE_WALLET",
            PaymentMethod::Cash => "CASH",
            PaymentMethod::CashOnDelivery => "CASH_ON_DELIVERY",
        }
    }

    /// Customer-facing label used in messages.
    pub fn label(&self) -> &'static str {
        match self {
            PaymentMethod::Card => "Tarjeta",
            PaymentMethod::Transfer => "Transferencia bancaria",
            PaymentMethod::MobileWallet => "Billetera móvil",
            PaymentMethod::Cash => "Efectivo",
            PaymentMethod::CashOnDelivery => "Pago contra entrega",
        }
    }
}

impl FromStr for PaymentMethod {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "CARD" => Ok(PaymentMethod::Card),
            "TRANSFER" => Ok(PaymentMethod::Transfer),
            "MOBILE_WALLET" => Ok(PaymentMethod::MobileWallet),
            "CASH" => Ok(PaymentMethod::Cash),
            "CASH_ON_DELIVERY" => Ok(PaymentMethod::CashOnDelivery),
            other => Err(CoreError::ValidationError(format!("unknown payment method: {}", other))),
        }
    }
}

/// End customer the dropshipper sold to.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CustomerContact {
    pub name: String,
    pub phone: Masked<String>,
    pub email: Option<String>,
    pub id_number: Option<Masked<String>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeliveryDetails {
    pub address: String,
    pub city: Option<String>,
    pub department: Option<String>,
    pub postal_code: Option<String>,
    pub maps_location: Option<String>,
}

impl DeliveryDetails {
    /// Single line for messages: address, city, department.
    pub fn summary(&self) -> String {
        [Some(self.address.as_str()), self.city.as_deref(), self.department.as_deref()]
            .into_iter()
            .flatten()
            .filter(|part| !part.trim().is_empty())
            .collect::<Vec<_>>()
            .join(", ")
    }
}

/// A settled sale. Money fields are fixed at placement and never recomputed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Order {
    pub id: Uuid,
    pub dropshipper_id: Uuid,
    pub product_id: Uuid,
    pub customer: CustomerContact,
    pub delivery: DeliveryDetails,
    pub payment_method: PaymentMethod,
    pub quantity: i32,
    pub unit_price: Decimal,
    pub total_amount: Decimal,
    pub commission_percentage: Decimal,
    pub commission_amount: Decimal,
    pub status: OrderStatus,
    pub notes: Option<String>,
    pub idempotency_key: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Order {
    /// Update order status
    pub fn update_status(&mut self, new_status: OrderStatus) {
        self.status = new_status;
        self.updated_at = Utc::now();
    }

    pub fn profit_per_unit(&self) -> Decimal {
        if self.quantity <= 0 {
            return Decimal::ZERO;
        }
        dropship_shared::round_currency(self.commission_amount / Decimal::from(self.quantity))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transition_table() {
        use OrderStatus::*;
        let allowed = [
            (Pending, Confirmed),
            (Pending, Cancelled),
            (Confirmed, Processing),
            (Confirmed, Cancelled),
            (Processing, Shipped),
            (Processing, Cancelled),
            (Shipped, Delivered),
            (Delivered, Refunded),
        ];

        for from in OrderStatus::ALL {
            for to in OrderStatus::ALL {
                let expected = allowed.contains(&(from, to));
                assert_eq!(
                    from.can_transition_to(to),
                    expected,
                    "{} -> {}",
                    from,
                    to
                );
            }
        }
    }

    #[test]
    fn test_transition_error() {
        let err = OrderStatus::Pending.transition(OrderStatus::Shipped).unwrap_err();
        match err {
            CoreError::InvalidTransition { from, to } => {
                assert_eq!(from, "PENDING");
                assert_eq!(to, "SHIPPED");
            }
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[test]
    fn test_status_parsing() {
        assert_eq!("shipped".parse::<OrderStatus>().unwrap(), OrderStatus::Shipped);
        assert_eq!("REFUNDED".parse::<OrderStatus>().unwrap(), OrderStatus::Refunded);
        assert!("LOST".parse::<OrderStatus>().is_err());
        assert!(OrderStatus::Cancelled.is_terminal());
        assert!(OrderStatus::Refunded.is_terminal());
        assert!(!OrderStatus::Delivered.is_terminal());
        assert!(!OrderStatus::Pending.is_terminal());
    }

    #[test]
    fn test_delivery_summary_skips_blank_parts() {
        let delivery = DeliveryDetails {
            address: "Av. Mcal. López 1234".to_string(),
            city: Some("Asunción".to_string()),
            department: Some(" ".to_string()),
            postal_code: None,
            maps_location: None,
        };
        assert_eq!(delivery.summary(), "Av. Mcal. López 1234, Asunción");
    }
}
