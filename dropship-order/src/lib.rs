pub mod dispatcher;
pub mod finance;
pub mod ledger;
pub mod manager;
pub mod models;
pub mod notification;
pub mod orchestrator;
pub mod queue;
pub mod repository;
pub mod retry;
pub mod templates;

pub use dispatcher::{DispatchReport, DispatchSettings, NotificationDispatcher, PreparedNotification};
pub use finance::{compute, CommissionBreakdown, CommissionPolicy};
pub use ledger::{CreditOutcome, LedgerService, TransactionStatus, TransactionType, Wallet, WalletTransaction};
pub use manager::OrderManager;
pub use models::{CustomerContact, DeliveryDetails, Order, OrderStatus, PaymentMethod};
pub use notification::{DeliveryOutcome, EmailNotification, NotificationStatus, RecipientType, MAX_RETRIES};
pub use orchestrator::{PlaceOrderInput, PlacedOrder, SettlementOrchestrator};
pub use queue::{DispatchJob, DispatchQueue, OrderNotifier};
pub use retry::{RetryScheduler, RetrySweep};
