use std::sync::Arc;

use tokio::sync::watch;
use tracing::info;

use slotkeeper::clock::Clock;
use slotkeeper::config::{load_rules, Settings};
use slotkeeper::engine::{Engine, RecomputeOptions};
use slotkeeper::notify::NotifyHub;
use slotkeeper::refresher;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    slotkeeper::logging::init();

    let settings = Settings::from_env()?;
    slotkeeper::observability::init(settings.metrics_port)?;

    // Ensure data directory exists
    std::fs::create_dir_all(&settings.data_dir)?;

    let rules = load_rules(&settings.rules_path)?;
    let notify = Arc::new(NotifyHub::new());
    let engine = Arc::new(Engine::new(
        settings.wal_path(),
        notify,
        Clock::System(settings.timezone),
    )?);

    info!("slotkeeper started");
    info!("  data_dir: {}", settings.data_dir.display());
    info!("  rules: {}", settings.rules_path.display());
    info!("  timezone: {}", settings.timezone);
    info!("  refresh every {}s, compact after {} appends", settings.refresh_secs, settings.compact_threshold);

    let report = engine.recompute_horizon(&rules, RecomputeOptions::default()).await?;
    info!(
        "startup recompute: {} dates, {} blocks written, {} removed",
        report.dates_processed, report.blocks_written, report.blocks_removed
    );

    let (rules_tx, _rules_rx) = watch::channel(Arc::new(rules));
    let refresher_engine = engine.clone();
    let rules_path = settings.rules_path.clone();
    let refresh_secs = settings.refresh_secs;
    tokio::spawn(async move {
        refresher::run_refresher(refresher_engine, rules_path, rules_tx, refresh_secs).await;
    });
    let compactor_engine = engine.clone();
    let threshold = settings.compact_threshold;
    tokio::spawn(async move {
        refresher::run_compactor(compactor_engine, threshold).await;
    });

    // Run until SIGTERM/ctrl-c
    let ctrl_c = tokio::signal::ctrl_c();
    #[cfg(unix)]
    {
        let mut sigterm = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())?;
        tokio::select! {
            _ = ctrl_c => {}
            _ = sigterm.recv() => {}
        }
    }
    #[cfg(not(unix))]
    {
        ctrl_c.await?;
    }
    info!("shutdown signal received");

    // Fold the log down before exit so the next start replays less.
    if let Err(e) = engine.compact_wal().await {
        tracing::warn!("final WAL compaction failed: {e}");
    }

    info!("slotkeeper stopped");
    Ok(())
}
