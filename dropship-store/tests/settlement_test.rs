use dropship_core::catalog::Product;
use dropship_core::identity::{Dropshipper, Requester};
use dropship_core::transport::MockTransport;
use dropship_core::CoreError;
use dropship_order::notification::{EmailNotification, NotificationStatus, RecipientType};
use dropship_order::repository::{LedgerRepository, NotificationRepository};
use dropship_order::{
    CommissionPolicy, CustomerContact, DeliveryDetails, DispatchJob, DispatchQueue, DispatchSettings, LedgerService,
    NotificationDispatcher, OrderManager, OrderNotifier, OrderStatus, PaymentMethod, PlaceOrderInput,
    RetryScheduler, SettlementOrchestrator, TransactionType,
};
use dropship_shared::Masked;
use dropship_store::{MemoryCatalog, MemoryStore};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use uuid::Uuid;

const CUSTOMER: &str = "carlos@mail.test";
const SELLER: &str = "ana@shop.test";
const OPERATOR: &str = "pedidos@shop.test";

struct Harness {
    store: Arc<MemoryStore>,
    catalog: Arc<MemoryCatalog>,
    transport: Arc<MockTransport>,
    orchestrator: SettlementOrchestrator,
    orders: OrderManager,
    ledger: LedgerService,
    retries: RetryScheduler,
    seller: Requester,
    operator: Requester,
    product: Product,
    /// Held open but never drained when the dispatch worker is not started.
    _undrained: Option<mpsc::Receiver<DispatchJob>>,
}

fn harness() -> Harness {
    harness_with(Duration::from_secs(2), Duration::from_secs(300))
}

fn harness_with(send_timeout: Duration, stale_after: Duration) -> Harness {
    build_harness(send_timeout, stale_after, true)
}

fn build_harness(send_timeout: Duration, stale_after: Duration, start_worker: bool) -> Harness {
    let store = Arc::new(MemoryStore::new());
    let catalog = Arc::new(MemoryCatalog::new());
    let transport = Arc::new(MockTransport::new());

    let product = Product {
        id: Uuid::new_v4(),
        name: "Freidora de aire".to_string(),
        wholesale_price: dec!(100000),
        suggested_retail_price: dec!(150000),
        commission_percentage: Some(dec!(15)),
        min_commission: None,
        max_commission: None,
        stock: 20,
        is_active: true,
    };
    catalog.insert_product(product.clone());

    let seller_id = Uuid::new_v4();
    catalog.insert_dropshipper(Dropshipper {
        id: seller_id,
        name: "Ana".to_string(),
        email: Some(SELLER.to_string()),
    });

    let dispatcher = Arc::new(NotificationDispatcher::new(
        transport.clone(),
        store.clone(),
        DispatchSettings {
            operator_address: Some(OPERATOR.to_string()),
            send_timeout,
            brand_name: "La Hora de las Compras".to_string(),
        },
    ));
    let notifier = Arc::new(OrderNotifier::new(dispatcher.clone(), catalog.clone()));
    let (queue, undrained) = if start_worker {
        let (queue, _worker) = DispatchQueue::start(notifier, 16, 2);
        (queue, None)
    } else {
        let (queue, rx) = DispatchQueue::channel(notifier, 16);
        (queue, Some(rx))
    };

    Harness {
        orchestrator: SettlementOrchestrator::new(catalog.clone(), store.clone(), CommissionPolicy::default(), queue),
        orders: OrderManager::new(store.clone()),
        ledger: LedgerService::new(store.clone()),
        retries: RetryScheduler::new(
            dispatcher,
            store.clone(),
            store.clone(),
            catalog.clone(),
            catalog.clone(),
            stale_after,
        ),
        seller: Requester::dropshipper(seller_id),
        operator: Requester::operator(Uuid::new_v4()),
        store,
        catalog,
        transport,
        product,
        _undrained: undrained,
    }
}

fn sale(product_id: Uuid, quantity: i32) -> PlaceOrderInput {
    PlaceOrderInput {
        product_id,
        customer: CustomerContact {
            name: "Carlos Benítez".to_string(),
            phone: Masked::new("0981 123 456".to_string()),
            email: Some(CUSTOMER.to_string()),
            id_number: Some(Masked::new("4567890".to_string())),
        },
        delivery: DeliveryDetails {
            address: "Calle Palma 100".to_string(),
            city: Some("Asunción".to_string()),
            department: Some("Central".to_string()),
            postal_code: None,
            maps_location: None,
        },
        payment_method: PaymentMethod::CashOnDelivery,
        quantity,
        unit_price: None,
        notes: None,
        idempotency_key: None,
    }
}

/// Waits until the order has `expected` rows and none of them is pending.
async fn settled_notifications(store: &MemoryStore, order_id: Uuid, expected: usize) -> Vec<EmailNotification> {
    for _ in 0..200 {
        let rows = store.list_for_order(order_id).await.unwrap();
        if rows.len() == expected && rows.iter().all(|n| n.status != NotificationStatus::Pending) {
            return rows;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("notifications for {} did not settle", order_id);
}

fn row_for(rows: &[EmailNotification], recipient: RecipientType) -> &EmailNotification {
    rows.iter()
        .find(|n| n.recipient_type == recipient)
        .expect("row for recipient")
}

#[tokio::test]
async fn test_place_order_credits_commission_and_notifies() {
    let h = harness();

    let placed = h.orchestrator.place_order(&h.seller, sale(h.product.id, 2)).await.unwrap();
    assert_eq!(placed.total_amount, dec!(300000));
    assert_eq!(placed.commission_amount, dec!(45000));
    assert_eq!(placed.profit_per_unit, dec!(22500));
    assert!(!placed.replayed);
    assert_eq!(placed.order.status, OrderStatus::Pending);

    let wallet = h.ledger.get_wallet(&h.seller, h.seller.user_id).await.unwrap();
    assert_eq!(wallet.balance, dec!(45000));
    assert_eq!(wallet.total_earnings, dec!(45000));

    let history = h.ledger.transactions(&h.seller, h.seller.user_id).await.unwrap();
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].transaction_type, TransactionType::SaleCommission);
    assert_eq!(history[0].order_id, Some(placed.order_id));

    let rows = settled_notifications(&h.store, placed.order_id, 3).await;
    assert!(rows.iter().all(|n| n.status == NotificationStatus::Sent && n.retry_count == 0));
    assert_eq!(h.transport.sent_to(CUSTOMER).len(), 1);
    assert_eq!(h.transport.sent_to(SELLER).len(), 1);
    assert_eq!(h.transport.sent_to(OPERATOR).len(), 1);
}

#[tokio::test]
async fn test_customer_transport_failure_is_recorded_not_propagated() {
    let h = harness();
    h.transport.fail_address(CUSTOMER);

    let placed = h.orchestrator.place_order(&h.seller, sale(h.product.id, 1)).await.unwrap();
    let rows = settled_notifications(&h.store, placed.order_id, 3).await;

    let customer = row_for(&rows, RecipientType::Customer);
    assert_eq!(customer.status, NotificationStatus::Failed);
    assert_eq!(customer.retry_count, 0);
    assert!(customer.failure_reason.is_some());
    assert_eq!(row_for(&rows, RecipientType::Dropshipper).status, NotificationStatus::Sent);
    assert_eq!(row_for(&rows, RecipientType::Company).status, NotificationStatus::Sent);

    let order = h.orders.get_order(&h.seller, placed.order_id).await.unwrap();
    assert_eq!(order.status, OrderStatus::Pending);

    let failed = h.retries.failed_notifications(&h.operator).await.unwrap();
    assert_eq!(failed.len(), 1);
    assert_eq!(failed[0].id, customer.id);
}

#[tokio::test]
async fn test_retry_gives_up_after_three_attempts() {
    let h = harness();
    h.transport.fail_address(CUSTOMER);

    let placed = h.orchestrator.place_order(&h.seller, sale(h.product.id, 1)).await.unwrap();
    let rows = settled_notifications(&h.store, placed.order_id, 3).await;
    let customer_id = row_for(&rows, RecipientType::Customer).id;

    for attempt in 1..=3 {
        let sweep = h.retries.run_once().await.unwrap();
        assert_eq!(sweep.attempted, 1);
        assert_eq!(sweep.still_failing, 1);

        let row = h.store.get_notification(customer_id).await.unwrap().unwrap();
        assert_eq!(row.status, NotificationStatus::Failed);
        assert_eq!(row.retry_count, attempt);
    }

    assert_eq!(h.retries.run_once().await.unwrap().attempted, 0);
    assert!(h.retries.list_retryable().await.unwrap().is_empty());

    let err = h.retries.retry_notification(&h.operator, customer_id).await.unwrap_err();
    assert!(matches!(err, CoreError::ValidationError(_)));

    // One initial attempt plus three retries.
    assert_eq!(h.transport.attempts(CUSTOMER), 4);
    let row = h.store.get_notification(customer_id).await.unwrap().unwrap();
    assert_eq!(row.retry_count, 3);
}

#[tokio::test]
async fn test_manual_retry_delivers_after_recovery() {
    let h = harness();
    h.transport.fail_address(CUSTOMER);

    let placed = h.orchestrator.place_order(&h.seller, sale(h.product.id, 1)).await.unwrap();
    let rows = settled_notifications(&h.store, placed.order_id, 3).await;
    let customer_id = row_for(&rows, RecipientType::Customer).id;

    assert!(matches!(
        h.retries.retry_notification(&h.seller, customer_id).await,
        Err(CoreError::Forbidden(_))
    ));

    h.transport.heal_address(CUSTOMER);
    let row = h.retries.retry_notification(&h.operator, customer_id).await.unwrap();
    assert_eq!(row.status, NotificationStatus::Sent);
    assert_eq!(row.retry_count, 1);
    assert!(row.sent_at.is_some());

    let resent = h.transport.sent_to(CUSTOMER);
    assert_eq!(resent.len(), 1);
    assert!(resent[0].subject.starts_with("Pedido confirmado"));

    assert!(matches!(
        h.retries.retry_notification(&h.operator, customer_id).await,
        Err(CoreError::ValidationError(_))
    ));
    assert!(h.retries.failed_notifications(&h.operator).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_rejected_address_bounces_and_is_not_retried() {
    let h = harness();
    h.transport.reject_address(CUSTOMER);

    let placed = h.orchestrator.place_order(&h.seller, sale(h.product.id, 1)).await.unwrap();
    let rows = settled_notifications(&h.store, placed.order_id, 3).await;
    let customer = row_for(&rows, RecipientType::Customer);
    assert_eq!(customer.status, NotificationStatus::Bounced);

    assert_eq!(h.retries.run_once().await.unwrap().attempted, 0);
    assert_eq!(h.retries.failed_notifications(&h.operator).await.unwrap().len(), 1);
    assert!(h.retries.retry_notification(&h.operator, customer.id).await.is_err());
}

#[tokio::test]
async fn test_send_timeout_marks_row_failed() {
    let h = harness_with(Duration::from_millis(50), Duration::from_secs(300));
    h.transport.stall_address(SELLER, Duration::from_millis(500));

    let placed = h.orchestrator.place_order(&h.seller, sale(h.product.id, 1)).await.unwrap();
    let rows = settled_notifications(&h.store, placed.order_id, 3).await;

    let seller = row_for(&rows, RecipientType::Dropshipper);
    assert_eq!(seller.status, NotificationStatus::Failed);
    assert!(seller.failure_reason.as_deref().unwrap_or_default().contains("timed out"));
    assert_eq!(row_for(&rows, RecipientType::Customer).status, NotificationStatus::Sent);
}

#[tokio::test]
async fn test_stale_pending_rows_are_recovered() {
    let h = harness_with(Duration::from_secs(2), Duration::from_millis(1));

    let placed = h.orchestrator.place_order(&h.seller, sale(h.product.id, 1)).await.unwrap();
    settled_notifications(&h.store, placed.order_id, 3).await;

    // A send that never reported back.
    let orphan = EmailNotification::pending(placed.order_id, RecipientType::Customer, CUSTOMER, "Pedido");
    h.store.create_notification(&orphan).await.unwrap();
    tokio::time::sleep(Duration::from_millis(20)).await;

    assert_eq!(h.retries.recover_stale().await.unwrap(), 1);
    let row = h.store.get_notification(orphan.id).await.unwrap().unwrap();
    assert_eq!(row.status, NotificationStatus::Failed);
    assert_eq!(row.retry_count, 0);

    let sweep = h.retries.run_once().await.unwrap();
    assert_eq!(sweep.sent, 1);
    let row = h.store.get_notification(orphan.id).await.unwrap().unwrap();
    assert_eq!(row.status, NotificationStatus::Sent);
    assert_eq!(row.retry_count, 1);
}

#[tokio::test]
async fn test_rows_are_recorded_before_place_order_returns() {
    // No dispatch worker: queued jobs are never delivered.
    let h = build_harness(Duration::from_secs(2), Duration::from_millis(1), false);

    let placed = h.orchestrator.place_order(&h.seller, sale(h.product.id, 1)).await.unwrap();

    let rows = h.store.list_for_order(placed.order_id).await.unwrap();
    assert_eq!(rows.len(), 3);
    assert!(rows.iter().all(|n| n.status == NotificationStatus::Pending && n.retry_count == 0));
    assert!(h.transport.sent().is_empty());

    tokio::time::sleep(Duration::from_millis(20)).await;
    assert_eq!(h.retries.recover_stale().await.unwrap(), 3);

    let sweep = h.retries.run_once().await.unwrap();
    assert_eq!(sweep.attempted, 3);
    assert_eq!(sweep.sent, 3);

    let rows = h.store.list_for_order(placed.order_id).await.unwrap();
    assert!(rows.iter().all(|n| n.status == NotificationStatus::Sent));
    assert_eq!(h.transport.sent_to(CUSTOMER).len(), 1);
    assert_eq!(h.transport.sent_to(SELLER).len(), 1);
    assert_eq!(h.transport.sent_to(OPERATOR).len(), 1);
}

#[tokio::test]
async fn test_oversized_amounts_are_rejected_without_settling() {
    let h = harness();
    let mut input = sale(h.product.id, 1_000_000);
    input.unit_price = Some(Decimal::from_i128_with_scale(10_i128.pow(25), 0));

    let err = h.orchestrator.place_order(&h.seller, input).await.unwrap_err();
    assert!(matches!(err, CoreError::ValidationError(_)));

    assert!(h.orders.list_orders(&h.seller).await.unwrap().is_empty());
    let wallet = h.ledger.get_wallet(&h.seller, h.seller.user_id).await.unwrap();
    assert_eq!(wallet.balance, Decimal::ZERO);
}

#[tokio::test]
async fn test_invalid_transition_leaves_order_unchanged() {
    let h = harness();
    let placed = h.orchestrator.place_order(&h.seller, sale(h.product.id, 1)).await.unwrap();

    let err = h
        .orders
        .update_order_status(&h.operator, placed.order_id, OrderStatus::Shipped)
        .await
        .unwrap_err();
    assert!(matches!(err, CoreError::InvalidTransition { .. }));

    let order = h.orders.get_order(&h.operator, placed.order_id).await.unwrap();
    assert_eq!(order.status, OrderStatus::Pending);

    assert!(matches!(
        h.orders.update_order_status(&h.seller, placed.order_id, OrderStatus::Confirmed).await,
        Err(CoreError::Forbidden(_))
    ));
}

#[tokio::test]
async fn test_full_lifecycle_and_refund_reverses_commission() {
    let h = harness();
    let placed = h.orchestrator.place_order(&h.seller, sale(h.product.id, 2)).await.unwrap();

    for next in [
        OrderStatus::Confirmed,
        OrderStatus::Processing,
        OrderStatus::Shipped,
        OrderStatus::Delivered,
        OrderStatus::Refunded,
    ] {
        let order = h.orders.update_order_status(&h.operator, placed.order_id, next).await.unwrap();
        assert_eq!(order.status, next);
    }

    let wallet = h.ledger.get_wallet(&h.seller, h.seller.user_id).await.unwrap();
    assert_eq!(wallet.balance, dec!(0));
    assert_eq!(wallet.total_earnings, dec!(0));

    let history = h.ledger.transactions(&h.seller, h.seller.user_id).await.unwrap();
    assert_eq!(history.len(), 2);
    assert_eq!(history[0].transaction_type, TransactionType::Refund);
    assert_eq!(history[0].amount, dec!(45000));

    assert!(matches!(
        h.orders.update_order_status(&h.operator, placed.order_id, OrderStatus::Cancelled).await,
        Err(CoreError::InvalidTransition { .. })
    ));
}

#[tokio::test]
async fn test_cancel_after_withdrawal_can_leave_negative_balance() {
    let h = harness();
    let placed = h.orchestrator.place_order(&h.seller, sale(h.product.id, 2)).await.unwrap();

    let withdrawal = h.ledger.request_withdrawal(&h.seller, dec!(45000), None).await.unwrap();
    h.ledger.complete_withdrawal(&h.operator, withdrawal.id).await.unwrap();

    h.orders
        .update_order_status(&h.operator, placed.order_id, OrderStatus::Cancelled)
        .await
        .unwrap();

    let wallet = h.ledger.get_wallet(&h.operator, h.seller.user_id).await.unwrap();
    assert_eq!(wallet.balance, dec!(-45000));
    assert_eq!(wallet.total_withdrawn, dec!(45000));
    assert_eq!(wallet.balance, wallet.total_earnings - wallet.total_withdrawn);
}

#[tokio::test]
async fn test_idempotency_key_replays_without_second_credit() {
    let h = harness();
    let mut input = sale(h.product.id, 2);
    input.idempotency_key = Some("checkout-7f3a".to_string());

    let first = h.orchestrator.place_order(&h.seller, input.clone()).await.unwrap();
    let second = h.orchestrator.place_order(&h.seller, input).await.unwrap();

    assert!(!first.replayed);
    assert!(second.replayed);
    assert_eq!(first.order_id, second.order_id);

    assert_eq!(h.orders.list_orders(&h.seller).await.unwrap().len(), 1);
    let wallet = h.ledger.get_wallet(&h.seller, h.seller.user_id).await.unwrap();
    assert_eq!(wallet.balance, dec!(45000));

    settled_notifications(&h.store, first.order_id, 3).await;
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(h.store.list_for_order(first.order_id).await.unwrap().len(), 3);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_orders_each_credit_once() {
    let h = Arc::new(harness());

    let mut handles = Vec::new();
    for _ in 0..10 {
        let h = h.clone();
        handles.push(tokio::spawn(async move {
            h.orchestrator.place_order(&h.seller, sale(h.product.id, 1)).await.unwrap()
        }));
    }
    let mut commission_sum = Decimal::ZERO;
    for handle in handles {
        commission_sum += handle.await.unwrap().commission_amount;
    }

    let wallet = h.ledger.get_wallet(&h.seller, h.seller.user_id).await.unwrap();
    assert_eq!(wallet.total_earnings, commission_sum);
    assert_eq!(wallet.balance, dec!(225000));

    let credits = h.store.list_transactions(wallet.id).await.unwrap();
    assert_eq!(credits.len(), 10);
    assert_eq!(credits.iter().map(|t| t.amount).sum::<Decimal>(), wallet.total_earnings);
}

#[tokio::test]
async fn test_unknown_or_inactive_product_settles_nothing() {
    let h = harness();

    let err = h.orchestrator.place_order(&h.seller, sale(Uuid::new_v4(), 1)).await.unwrap_err();
    assert!(matches!(err, CoreError::NotFound(_)));

    let mut retired = h.product.clone();
    retired.id = Uuid::new_v4();
    retired.is_active = false;
    h.catalog.insert_product(retired.clone());
    let err = h.orchestrator.place_order(&h.seller, sale(retired.id, 1)).await.unwrap_err();
    assert!(matches!(err, CoreError::NotFound(_)));

    let err = h.orchestrator.place_order(&h.seller, sale(h.product.id, 0)).await.unwrap_err();
    assert!(matches!(err, CoreError::ValidationError(_)));

    assert!(h.orders.list_orders(&h.seller).await.unwrap().is_empty());
    let wallet = h.ledger.get_wallet(&h.seller, h.seller.user_id).await.unwrap();
    assert_eq!(wallet.balance, dec!(0));
}

#[tokio::test]
async fn test_order_visibility() {
    let h = harness();
    let placed = h.orchestrator.place_order(&h.seller, sale(h.product.id, 1)).await.unwrap();
    let stranger = Requester::dropshipper(Uuid::new_v4());

    assert!(matches!(
        h.orders.get_order(&stranger, placed.order_id).await,
        Err(CoreError::Forbidden(_))
    ));
    assert!(matches!(
        h.orders.get_order(&h.seller, Uuid::new_v4()).await,
        Err(CoreError::NotFound(_))
    ));
    assert!(h.orders.list_orders(&stranger).await.unwrap().is_empty());
    assert!(matches!(h.orders.list_all_orders(&h.seller).await, Err(CoreError::Forbidden(_))));
    assert_eq!(h.orders.list_all_orders(&h.operator).await.unwrap().len(), 1);
    assert!(matches!(
        h.ledger.get_wallet(&stranger, h.seller.user_id).await,
        Err(CoreError::Forbidden(_))
    ));
    assert!(matches!(
        h.orchestrator.place_order(&h.operator, sale(h.product.id, 1)).await,
        Err(CoreError::Forbidden(_))
    ));
}

#[tokio::test]
async fn test_unit_price_override_and_commission_cap() {
    let h = harness();
    let mut capped = h.product.clone();
    capped.id = Uuid::new_v4();
    capped.commission_percentage = None;
    capped.max_commission = Some(dec!(20000));
    h.catalog.insert_product(capped.clone());

    let mut input = sale(capped.id, 2);
    input.unit_price = Some(dec!(160000));
    let placed = h.orchestrator.place_order(&h.seller, input).await.unwrap();

    assert_eq!(placed.total_amount, dec!(320000));
    assert_eq!(placed.order.commission_percentage, dec!(15));
    assert_eq!(placed.commission_amount, dec!(20000));
    assert_eq!(placed.profit_per_unit, dec!(10000));
}

/// Notification log whose inserts fail for one address until `heal` is called.
struct FlakyNotifications {
    inner: Arc<MemoryStore>,
    failing: parking_lot::Mutex<Option<String>>,
}

#[async_trait::async_trait]
impl NotificationRepository for FlakyNotifications {
    async fn create_notification(&self, notification: &EmailNotification) -> dropship_core::CoreResult<()> {
        {
            let mut failing = self.failing.lock();
            if failing.as_deref() == Some(notification.recipient_address.as_str()) {
                // Fails once, then lets the next insert through.
                *failing = None;
                return Err(CoreError::PersistenceError("connection reset".to_string()));
            }
        }
        self.inner.create_notification(notification).await
    }

    async fn record_outcome(
        &self,
        id: Uuid,
        outcome: &dropship_order::DeliveryOutcome,
    ) -> dropship_core::CoreResult<EmailNotification> {
        self.inner.record_outcome(id, outcome).await
    }

    async fn get_notification(&self, id: Uuid) -> dropship_core::CoreResult<Option<EmailNotification>> {
        self.inner.get_notification(id).await
    }

    async fn begin_retry(&self, id: Uuid) -> dropship_core::CoreResult<Option<EmailNotification>> {
        self.inner.begin_retry(id).await
    }

    async fn list_retryable(&self) -> dropship_core::CoreResult<Vec<EmailNotification>> {
        self.inner.list_retryable().await
    }

    async fn list_failed(&self) -> dropship_core::CoreResult<Vec<EmailNotification>> {
        self.inner.list_failed().await
    }

    async fn list_for_order(&self, order_id: Uuid) -> dropship_core::CoreResult<Vec<EmailNotification>> {
        self.inner.list_for_order(order_id).await
    }

    async fn fail_stale_pending(
        &self,
        older_than: chrono::DateTime<chrono::Utc>,
        reason: &str,
    ) -> dropship_core::CoreResult<u64> {
        self.inner.fail_stale_pending(older_than, reason).await
    }
}

#[tokio::test]
async fn test_unrecorded_row_is_written_again_before_delivery() {
    let h = harness();
    let placed = h.orchestrator.place_order(&h.seller, sale(h.product.id, 1)).await.unwrap();
    settled_notifications(&h.store, placed.order_id, 3).await;

    let store = Arc::new(MemoryStore::new());
    let flaky = Arc::new(FlakyNotifications {
        inner: store.clone(),
        failing: parking_lot::Mutex::new(Some(CUSTOMER.to_string())),
    });
    let transport = Arc::new(MockTransport::new());
    let dispatcher = NotificationDispatcher::new(
        transport.clone(),
        flaky,
        DispatchSettings {
            operator_address: Some(OPERATOR.to_string()),
            ..DispatchSettings::default()
        },
    );

    let prepared = dispatcher.prepare(&placed.order, &h.product, None).await;
    assert_eq!(prepared.len(), 2);
    let customer = prepared
        .iter()
        .find(|p| p.row.recipient_type == RecipientType::Customer)
        .unwrap();
    assert!(!customer.recorded);
    assert_eq!(store.list_for_order(placed.order_id).await.unwrap().len(), 1);

    let report = dispatcher.deliver_prepared(placed.order_id, prepared).await;
    assert_eq!(report.count(NotificationStatus::Sent), 2);

    let rows = store.list_for_order(placed.order_id).await.unwrap();
    assert_eq!(rows.len(), 2);
    assert!(rows.iter().all(|n| n.status == NotificationStatus::Sent));
    assert_eq!(transport.sent_to(CUSTOMER).len(), 1);
}
