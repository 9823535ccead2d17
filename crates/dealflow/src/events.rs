//! Periodic pruning of old deal pipeline events, keeping the events table
//! bounded while recent history stays queryable.

use {
    crate::storage::Storage,
    chrono::{Duration as ChronoDuration, Utc},
    std::{sync::Arc, time::Duration},
};

pub struct DealEventsCleaner {
    store: Arc<dyn Storage>,
    retention: ChronoDuration,
}

impl DealEventsCleaner {
    pub fn new(store: Arc<dyn Storage>, retention: Duration) -> Self {
        Self {
            store,
            retention: ChronoDuration::from_std(retention).unwrap_or(ChronoDuration::days(90)),
        }
    }

    pub async fn cleanup_once(&self) -> crate::error::Result<()> {
        let cutoff = Utc::now() - self.retention;
        let deleted = self.store.delete_deal_events_before(cutoff).await?;
        if deleted > 0 {
            Metrics::get().deal_events_deleted.inc_by(deleted);
            tracing::debug!(deleted, %cutoff, "pruned deal events");
        }
        Ok(())
    }

    /// Cleanup loop; failures are logged and retried on the next tick.
    pub async fn run_forever(self: Arc<Self>, interval: Duration) -> ! {
        let mut interval = tokio::time::interval(interval);
        loop {
            interval.tick().await;
            if let Err(err) = self.cleanup_once().await {
                tracing::error!(?err, "deal event cleanup failed");
            }
        }
    }
}

#[derive(prometheus_metric_storage::MetricStorage)]
#[metric(subsystem = "events")]
struct Metrics {
    /// Number of deal events pruned by the retention cleanup.
    deal_events_deleted: prometheus::IntCounter,
}

impl Metrics {
    fn get() -> &'static Self {
        Metrics::instance(observe::metrics::get_storage_registry()).unwrap()
    }
}
