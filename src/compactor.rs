use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info, warn};

use crate::engine::{SchedulerError, Store};

const CHECK_INTERVAL: Duration = Duration::from_secs(30);

/// Compact the WAL when at least `threshold` events were appended since the
/// last compaction. Returns whether it did.
pub async fn compact_if_needed(store: &Store, threshold: u64) -> Result<bool, SchedulerError> {
    let appends = store.wal_appends_since_compact().await;
    if appends < threshold {
        debug!(appends, threshold, "WAL compaction not needed");
        return Ok(false);
    }
    store.compact_wal().await?;
    metrics::counter!(crate::observability::WAL_COMPACTIONS_TOTAL).increment(1);
    info!(appends, "compacted WAL");
    Ok(true)
}

/// Background task; runs for the life of the process.
pub async fn run_compactor(store: Arc<Store>, threshold: u64) {
    let mut interval = tokio::time::interval(CHECK_INTERVAL);
    interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    loop {
        interval.tick().await;
        if let Err(e) = compact_if_needed(&store, threshold).await {
            warn!("WAL compaction failed: {e}");
        }
    }
}
