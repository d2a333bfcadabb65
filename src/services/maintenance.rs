use crate::services::{CacheMirror, DeviceService, TaskQueue};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Periodic upkeep: enqueues a cache rebuild for every user, purges expired cache
/// entries and, when a retention age is set, retires old events of every device.
pub struct Maintenance {
    pub queue: TaskQueue,
    pub repository: Arc<DeviceService>,
    pub cache: Arc<CacheMirror>,
    pub interval: Duration,
    pub event_max_age: Option<Duration>,
}

impl Maintenance {
    pub async fn tick(&self) {
        if let Err(err) = self.queue.trigger_cache_resync(None) {
            tracing::warn!(reason = %err, "failed to schedule cache resync");
        }
        let purged = self.cache.purge_expired();
        if purged > 0 {
            tracing::debug!(purged, "expired cache entries purged");
        }
        if let Some(max_age) = self.event_max_age {
            self.retire_old_events(max_age).await;
        }
    }

    async fn retire_old_events(&self, max_age: Duration) {
        let device_ids = match self.repository.list_device_ids().await {
            Ok(device_ids) => device_ids,
            Err(err) => {
                tracing::warn!(reason = ?err, "failed to list devices for retention");
                return;
            }
        };
        let max_age_ms = i64::try_from(max_age.as_millis()).unwrap_or(i64::MAX);
        let mut removed = 0;
        for device_id in &device_ids {
            match self.repository.retire_old_events(device_id, max_age_ms).await {
                Ok(count) => removed += count,
                Err(err) => tracing::warn!(device_id, reason = ?err, "retention failed"),
            }
        }
        tracing::info!(devices = device_ids.len(), removed, "retention sweep finished");
    }

    pub async fn run(self, shutdown: CancellationToken) -> anyhow::Result<()> {
        let mut interval = tokio::time::interval(self.interval);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        // the first tick fires immediately
        interval.tick().await;
        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = interval.tick() => self.tick().await,
            }
        }
        tracing::debug!("maintenance scheduler stopped");
        Ok(())
    }
}
