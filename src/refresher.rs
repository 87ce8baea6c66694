use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::config::{load_rules, Rules};
use crate::engine::{Engine, RecomputeOptions};

/// Reload the rules file and refresh gap blocks across the booking horizon.
/// Changed rules are published on `rules_tx` before the recompute runs, so
/// readers never see blocks computed from rules they do not have yet.
pub async fn refresh_once(engine: &Engine, rules_path: &Path, rules_tx: &watch::Sender<Arc<Rules>>) {
    match load_rules(rules_path) {
        Ok(fresh) => {
            let changed = **rules_tx.borrow() != fresh;
            if changed {
                info!("rules reloaded from {}", rules_path.display());
                rules_tx.send_replace(Arc::new(fresh));
            }
        }
        Err(e) => warn!("keeping previous rules, reload of {} failed: {e}", rules_path.display()),
    }

    let rules = rules_tx.borrow().clone();
    if let Err(e) = engine.recompute_horizon(&rules, RecomputeOptions::default()).await {
        warn!("horizon gap-block refresh failed: {e}");
    }
}

/// Background task that keeps gap blocks current as the horizon rolls
/// forward and the rules file changes.
pub async fn run_refresher(
    engine: Arc<Engine>,
    rules_path: PathBuf,
    rules_tx: watch::Sender<Arc<Rules>>,
    interval_secs: u64,
) {
    let mut interval = tokio::time::interval(Duration::from_secs(interval_secs.max(1)));
    // The first tick fires immediately; startup already ran a recompute.
    interval.tick().await;
    loop {
        interval.tick().await;
        refresh_once(&engine, &rules_path, &rules_tx).await;
    }
}

/// Compact when the WAL has grown by `threshold` appends. Returns whether a
/// compaction ran.
pub async fn compact_if_due(engine: &Engine, threshold: u64) -> bool {
    let appends = engine.wal_appends_since_compact().await;
    if appends < threshold {
        return false;
    }
    match engine.compact_wal().await {
        Ok(()) => {
            metrics::counter!(crate::observability::WAL_COMPACTIONS_TOTAL).increment(1);
            true
        }
        Err(e) => {
            warn!("WAL compaction after {appends} appends failed: {e}");
            false
        }
    }
}

/// Background task that checks the WAL size periodically.
pub async fn run_compactor(engine: Arc<Engine>, threshold: u64) {
    let mut interval = tokio::time::interval(Duration::from_secs(60));
    loop {
        interval.tick().await;
        if !compact_if_due(&engine, threshold).await {
            debug!("compactor: nothing to do");
        }
    }
}
