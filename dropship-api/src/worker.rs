use std::sync::Arc;
use std::time::Duration;

use dropship_order::RetryScheduler;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{error, info};

const MIN_INTERVAL: Duration = Duration::from_secs(1);

/// Periodic sweep over the notification log: stale pending rows are marked
/// failed first, then every retryable row gets another attempt.
pub async fn start_notification_worker(retries: Arc<RetryScheduler>, every: Duration) {
    let every = every.max(MIN_INTERVAL);
    let mut ticker = interval(every);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    info!(interval_secs = every.as_secs(), "Notification retry worker started");

    loop {
        ticker.tick().await;

        if let Err(e) = retries.recover_stale().await {
            error!("Failed to recover stale notifications: {}", e);
        }
        if let Err(e) = retries.run_once().await {
            error!("Notification retry sweep failed: {}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dropship_core::transport::MockTransport;
    use dropship_order::{DispatchSettings, NotificationDispatcher};
    use dropship_store::{MemoryCatalog, MemoryStore};

    #[tokio::test]
    async fn test_zero_interval_does_not_kill_worker() {
        let store = Arc::new(MemoryStore::new());
        let catalog = Arc::new(MemoryCatalog::new());
        let dispatcher = Arc::new(NotificationDispatcher::new(
            Arc::new(MockTransport::new()),
            store.clone(),
            DispatchSettings::default(),
        ));
        let retries = Arc::new(RetryScheduler::new(
            dispatcher,
            store.clone(),
            store,
            catalog.clone(),
            catalog,
            Duration::from_secs(300),
        ));

        let handle = tokio::spawn(start_notification_worker(retries, Duration::ZERO));
        tokio::time::sleep(Duration::from_millis(50)).await;

        assert!(!handle.is_finished());
        handle.abort();
    }
}
