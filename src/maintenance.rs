use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info, warn};

use crate::guard::Guard;

/// Background task that compacts a tenant's WAL once enough appends have
/// accumulated since the last compaction. The threshold bounds replay time
/// after a restart.
pub async fn run_compactor(guard: Arc<Guard>, threshold: u64) {
    let mut interval = tokio::time::interval(Duration::from_secs(60));
    loop {
        interval.tick().await;
        let appends = guard.wal_appends_since_compact().await;
        if appends < threshold {
            continue;
        }
        match guard.compact_wal().await {
            Ok(()) => info!("compacted WAL after {appends} appends"),
            // A contended parking defers compaction to the next tick.
            Err(e) => debug!("compaction skipped: {e}"),
        }
    }
}

/// One-shot compaction used at controlled points (tests, shutdown paths).
pub async fn compact_now(guard: &Guard) {
    if let Err(e) = guard.compact_wal().await {
        warn!("compaction failed: {e}");
    }
}
