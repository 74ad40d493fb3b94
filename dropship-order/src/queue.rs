use dropship_core::catalog::Product;
use dropship_core::identity::IdentityLookup;
use std::sync::Arc;
use tokio::sync::{mpsc, Semaphore};
use tokio::task::JoinHandle;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::dispatcher::{DispatchReport, NotificationDispatcher, PreparedNotification};
use crate::models::Order;

/// Delivery work for one settled order. The rows it carries are already
/// stored as PENDING.
#[derive(Debug, Clone)]
pub struct DispatchJob {
    pub order_id: Uuid,
    pub notifications: Vec<PreparedNotification>,
}

/// Resolves the dropshipper identity, records the notification rows, and
/// delivers queued jobs.
pub struct OrderNotifier {
    dispatcher: Arc<NotificationDispatcher>,
    identities: Arc<dyn IdentityLookup>,
}

impl OrderNotifier {
    pub fn new(dispatcher: Arc<NotificationDispatcher>, identities: Arc<dyn IdentityLookup>) -> Self {
        Self { dispatcher, identities }
    }

    pub async fn record(&self, order: &Order, product: &Product) -> DispatchJob {
        let dropshipper = match self.identities.get_dropshipper(order.dropshipper_id).await {
            Ok(found) => found,
            Err(e) => {
                // Customer and company messages still go out.
                warn!(order_id = %order.id, "Dropshipper lookup failed: {}", e);
                None
            }
        };
        DispatchJob {
            order_id: order.id,
            notifications: self.dispatcher.prepare(order, product, dropshipper.as_ref()).await,
        }
    }

    pub async fn notify(&self, job: DispatchJob) -> DispatchReport {
        self.dispatcher.deliver_prepared(job.order_id, job.notifications).await
    }
}

/// Handle for queueing notification work after an order commits.
///
/// `submit` writes the PENDING rows before anything is queued, so the channel
/// only holds work that storage already knows about. Jobs go through a
/// bounded channel drained by a worker loop that runs at most `workers`
/// deliveries at once. Enqueueing never blocks the caller: a full queue hands
/// the job to a task that waits for room, a closed queue runs the job on its
/// own task.
#[derive(Clone)]
pub struct DispatchQueue {
    tx: mpsc::Sender<DispatchJob>,
    notifier: Arc<OrderNotifier>,
}

impl DispatchQueue {
    pub fn start(notifier: Arc<OrderNotifier>, capacity: usize, workers: usize) -> (Self, JoinHandle<()>) {
        let (queue, rx) = Self::channel(notifier.clone(), capacity);
        let handle = tokio::spawn(run_workers(rx, notifier, workers));
        (queue, handle)
    }

    /// Queue handle plus the receiving end, for callers that drive
    /// `run_workers` themselves.
    pub fn channel(notifier: Arc<OrderNotifier>, capacity: usize) -> (Self, mpsc::Receiver<DispatchJob>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        (Self { tx, notifier }, rx)
    }

    /// Records the order's notification rows, then queues their delivery.
    /// Returns the number of rows queued.
    pub async fn submit(&self, order: &Order, product: &Product) -> usize {
        let job = self.notifier.record(order, product).await;
        let queued = job.notifications.len();
        if queued > 0 {
            self.enqueue(job);
        }
        queued
    }

    pub fn enqueue(&self, job: DispatchJob) {
        match self.tx.try_send(job) {
            Ok(()) => {}
            Err(mpsc::error::TrySendError::Full(job)) => {
                warn!(order_id = %job.order_id, "Dispatch queue full, waiting for capacity");
                let tx = self.tx.clone();
                let notifier = self.notifier.clone();
                tokio::spawn(async move {
                    if let Err(mpsc::error::SendError(job)) = tx.send(job).await {
                        notifier.notify(job).await;
                    }
                });
            }
            Err(mpsc::error::TrySendError::Closed(job)) => {
                error!(order_id = %job.order_id, "Dispatch queue closed, sending inline");
                let notifier = self.notifier.clone();
                tokio::spawn(async move {
                    notifier.notify(job).await;
                });
            }
        }
    }
}

pub async fn run_workers(mut rx: mpsc::Receiver<DispatchJob>, notifier: Arc<OrderNotifier>, workers: usize) {
    let permits = Arc::new(Semaphore::new(workers.max(1)));
    info!(workers, "Notification dispatch worker started");

    while let Some(job) = rx.recv().await {
        let permit = match permits.clone().acquire_owned().await {
            Ok(permit) => permit,
            Err(_) => break,
        };
        let notifier = notifier.clone();
        tokio::spawn(async move {
            notifier.notify(job).await;
            drop(permit);
        });
    }

    info!("Notification dispatch worker stopped");
}
