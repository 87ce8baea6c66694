use std::net::SocketAddr;

// ── Booking traffic ─────────────────────────────────────────────

/// Counter: reservation attempts. Labels: outcome (`booked`, a rejection code, or `error`).
pub const RESERVATIONS_TOTAL: &str = "slotkeeper_reservations_total";

/// Counter: availability queries served.
pub const AVAILABILITY_QUERIES_TOTAL: &str = "slotkeeper_availability_queries_total";

// ── Gap-block maintenance ───────────────────────────────────────

/// Histogram: wall time of one range or horizon recompute, in seconds.
pub const GAP_RECOMPUTE_DURATION_SECONDS: &str = "slotkeeper_gap_recompute_duration_seconds";

/// Counter: auto gap blocks persisted.
pub const GAP_BLOCKS_WRITTEN_TOTAL: &str = "slotkeeper_gap_blocks_written_total";

// ── WAL ─────────────────────────────────────────────────────────

/// Histogram: WAL group-commit flush duration in seconds.
pub const WAL_FLUSH_DURATION_SECONDS: &str = "slotkeeper_wal_flush_duration_seconds";

/// Histogram: WAL group-commit batch size (events per flush).
pub const WAL_FLUSH_BATCH_SIZE: &str = "slotkeeper_wal_flush_batch_size";

/// Counter: WAL compactions performed.
pub const WAL_COMPACTIONS_TOTAL: &str = "slotkeeper_wal_compactions_total";

/// Install the Prometheus exporter on the given port. No-op if port is None.
pub fn init(port: Option<u16>) -> Result<(), metrics_exporter_prometheus::BuildError> {
    let Some(port) = port else { return Ok(()) };
    let addr: SocketAddr = ([0, 0, 0, 0], port).into();
    metrics_exporter_prometheus::PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()?;
    tracing::info!("metrics endpoint: http://0.0.0.0:{port}/metrics");
    Ok(())
}
