use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::engine::Engine;
use crate::observability;

/// How often the status sweep runs, and how soon it retries after a failure.
#[derive(Debug, Clone, Copy)]
pub struct SweepSchedule {
    pub interval: Duration,
    pub retry: Duration,
}

/// Background task driving the status sweep. The first pass runs
/// immediately; a failed pass is logged and retried after `retry`.
pub async fn run_sweeper(engine: Arc<Engine>, schedule: SweepSchedule, shutdown: CancellationToken) {
    info!(
        interval_secs = schedule.interval.as_secs(),
        retry_secs = schedule.retry.as_secs(),
        "status sweeper started"
    );
    let mut delay = Duration::ZERO;
    loop {
        tokio::select! {
            _ = shutdown.cancelled() => break,
            _ = tokio::time::sleep(delay) => {}
        }

        let started = Instant::now();
        match engine.sweep().await {
            Ok(report) => {
                metrics::counter!(observability::SWEEP_RUNS_TOTAL, "status" => "ok").increment(1);
                if report.total() > 0 {
                    info!(started = report.started, expired = report.expired, "sweep applied transitions");
                } else {
                    debug!("sweep found nothing to do");
                }
                delay = schedule.interval;
            }
            Err(e) => {
                metrics::counter!(observability::SWEEP_RUNS_TOTAL, "status" => "error").increment(1);
                warn!(error = %e, retry_secs = schedule.retry.as_secs(), "sweep failed, will retry");
                delay = schedule.retry;
            }
        }
        metrics::histogram!(observability::SWEEP_DURATION_SECONDS)
            .record(started.elapsed().as_secs_f64());
    }
    info!("status sweeper stopped");
}

/// Background task that compacts the WAL once enough appends accumulate.
pub async fn run_compactor(
    engine: Arc<Engine>,
    threshold: u64,
    check_every: Duration,
    shutdown: CancellationToken,
) {
    let mut interval = tokio::time::interval(check_every);
    loop {
        tokio::select! {
            _ = shutdown.cancelled() => break,
            _ = interval.tick() => {}
        }
        let appends = engine.wal_appends_since_compact().await;
        if appends < threshold {
            continue;
        }
        match engine.compact_wal().await {
            Ok(()) => {
                metrics::counter!(observability::COMPACTIONS_TOTAL, "status" => "ok").increment(1);
                info!(appends, "compacted WAL");
            }
            Err(e) => {
                metrics::counter!(observability::COMPACTIONS_TOTAL, "status" => "error").increment(1);
                warn!(error = %e, "WAL compaction failed");
            }
        }
    }
    debug!("compactor stopped");
}
