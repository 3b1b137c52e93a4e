use std::net::SocketAddr;

// ── RED metrics (request-driven) ────────────────────────────────

/// Counter: reservations admitted. Labels: kind (cafeteria, room).
pub const RESERVATIONS_CREATED_TOTAL: &str = "slotbook_reservations_created_total";

/// Counter: create requests refused. Labels: kind, reason.
pub const ADMISSION_REJECTIONS_TOTAL: &str = "slotbook_admission_rejections_total";

/// Counter: HTTP error responses. Labels: code.
pub const API_ERRORS_TOTAL: &str = "slotbook_api_errors_total";

// ── Background work ─────────────────────────────────────────────

/// Counter: sweep passes. Labels: status (ok, error).
pub const SWEEP_RUNS_TOTAL: &str = "slotbook_sweep_runs_total";

/// Counter: status changes made by the sweep. Labels: kind, transition.
pub const SWEEP_TRANSITIONS_TOTAL: &str = "slotbook_sweep_transitions_total";

/// Histogram: sweep pass duration in seconds.
pub const SWEEP_DURATION_SECONDS: &str = "slotbook_sweep_duration_seconds";

/// Counter: reservations reactivated by the correction routine.
pub const CORRECTIONS_TOTAL: &str = "slotbook_corrections_total";

/// Counter: WAL compactions. Labels: status (ok, error).
pub const COMPACTIONS_TOTAL: &str = "slotbook_compactions_total";

// ── USE metrics (resource utilization) ──────────────────────────

/// Histogram: WAL group-commit flush duration in seconds.
pub const WAL_FLUSH_DURATION_SECONDS: &str = "slotbook_wal_flush_duration_seconds";

/// Histogram: WAL group-commit batch size (events per flush).
pub const WAL_FLUSH_BATCH_SIZE: &str = "slotbook_wal_flush_batch_size";

/// Install Prometheus metrics exporter on the given port. No-op if port is None.
pub fn init(port: Option<u16>) -> Result<(), metrics_exporter_prometheus::BuildError> {
    let Some(port) = port else { return Ok(()) };
    let addr: SocketAddr = ([0, 0, 0, 0], port).into();
    metrics_exporter_prometheus::PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()?;
    tracing::info!("metrics endpoint: http://0.0.0.0:{port}/metrics");
    Ok(())
}
