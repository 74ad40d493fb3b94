use std::sync::Arc;
use std::time::Duration;

use dropship_core::catalog::ProductLookup;
use dropship_core::identity::IdentityLookup;
use dropship_core::transport::MessageTransport;
use dropship_order::repository::{LedgerRepository, NotificationRepository, OrderRepository, SettlementStore};
use dropship_order::{
    CommissionPolicy, DispatchQueue, DispatchSettings, LedgerService, NotificationDispatcher, OrderManager,
    OrderNotifier, RetryScheduler, SettlementOrchestrator,
};
use dropship_store::app_config::Config;
use dropship_store::{DbClient, MemoryCatalog, MemoryStore, PgCatalog, PgStore};
use tokio::task::JoinHandle;

#[derive(Clone)]
pub struct AuthConfig {
    pub secret: String,
    pub expiration: u64,
}

#[derive(Clone)]
pub struct AppState {
    pub orchestrator: Arc<SettlementOrchestrator>,
    pub orders: Arc<OrderManager>,
    pub ledger: Arc<LedgerService>,
    pub retries: Arc<RetryScheduler>,
    pub auth: AuthConfig,
}

/// Storage and lookup implementations the services run on.
pub struct Backends {
    pub orders: Arc<dyn OrderRepository>,
    pub ledger: Arc<dyn LedgerRepository>,
    pub settlement: Arc<dyn SettlementStore>,
    pub notifications: Arc<dyn NotificationRepository>,
    pub products: Arc<dyn ProductLookup>,
    pub identities: Arc<dyn IdentityLookup>,
}

impl Backends {
    pub fn memory(store: Arc<MemoryStore>, catalog: Arc<MemoryCatalog>) -> Self {
        Self {
            orders: store.clone(),
            ledger: store.clone(),
            settlement: store.clone(),
            notifications: store,
            products: catalog.clone(),
            identities: catalog,
        }
    }

    pub fn postgres(db: &DbClient) -> Self {
        let store = Arc::new(PgStore::new(db.pool.clone()));
        let catalog = Arc::new(PgCatalog::new(db.pool.clone()));
        Self {
            orders: store.clone(),
            ledger: store.clone(),
            settlement: store.clone(),
            notifications: store,
            products: catalog.clone(),
            identities: catalog,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ServiceSettings {
    pub dispatch: DispatchSettings,
    pub policy: CommissionPolicy,
    pub queue_capacity: usize,
    pub workers: usize,
    pub stale_after: Duration,
}

impl ServiceSettings {
    pub fn from_config(config: &Config) -> Self {
        let n = &config.notifications;
        Self {
            dispatch: DispatchSettings {
                operator_address: n.operator_email.clone(),
                send_timeout: n.send_timeout(),
                brand_name: n.brand_name.clone(),
            },
            policy: CommissionPolicy::new(config.settlement.default_commission_percentage),
            queue_capacity: n.queue_capacity,
            workers: n.workers,
            stale_after: n.stale_after(),
        }
    }
}

impl AppState {
    /// Wires the services together and starts the dispatch worker. The handle
    /// belongs to the dispatch queue loop.
    pub fn build(
        backends: Backends,
        transport: Arc<dyn MessageTransport>,
        settings: ServiceSettings,
        auth: AuthConfig,
    ) -> (Self, JoinHandle<()>) {
        let dispatcher = Arc::new(NotificationDispatcher::new(
            transport,
            backends.notifications.clone(),
            settings.dispatch,
        ));
        let notifier = Arc::new(OrderNotifier::new(dispatcher.clone(), backends.identities.clone()));
        let (queue, handle) = DispatchQueue::start(notifier, settings.queue_capacity, settings.workers);

        let state = Self {
            orchestrator: Arc::new(SettlementOrchestrator::new(
                backends.products.clone(),
                backends.settlement,
                settings.policy,
                queue,
            )),
            orders: Arc::new(OrderManager::new(backends.orders.clone())),
            ledger: Arc::new(LedgerService::new(backends.ledger)),
            retries: Arc::new(RetryScheduler::new(
                dispatcher,
                backends.notifications,
                backends.orders,
                backends.products,
                backends.identities,
                settings.stale_after,
            )),
            auth,
        };
        (state, handle)
    }
}
