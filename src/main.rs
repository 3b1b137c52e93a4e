use std::sync::Arc;
use std::time::Duration;

use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::info;
use tracing_subscriber::EnvFilter;

use slotbook::api::{self, AppState};
use slotbook::auth::HeaderIdentity;
use slotbook::clock::{Clock, OffsetClock, SystemClock, zone_from_minutes};
use slotbook::config::Config;
use slotbook::engine::Engine;
use slotbook::model::{Role, User};
use slotbook::sweeper::{self, SweepSchedule};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = Config::from_env()?;
    slotbook::observability::init(config.metrics_port)?;

    let zone = zone_from_minutes(config.utc_offset_minutes);
    let clock: Arc<dyn Clock> = match config.simulated_offset_minutes {
        Some(minutes) => {
            tracing::warn!(minutes, "running on a shifted clock");
            Arc::new(OffsetClock::new(zone, chrono::Duration::minutes(minutes)))
        }
        None => Arc::new(SystemClock::new(zone)),
    };

    // Ensure data directory exists
    std::fs::create_dir_all(&config.data_dir)?;

    let engine = Arc::new(Engine::new(config.wal_path(), config.engine_settings(), clock)?);

    if let Some(id) = config.bootstrap_hr.filter(|id| engine.get_user(id).is_none()) {
        engine
            .upsert_user(User {
                id,
                name: "HR".into(),
                role: Role::Hr,
                active: true,
            })
            .await?;
        info!(user_id = %id, "bootstrap HR user created");
    }

    // A crash between sweeps can leave today's reservations expired early.
    let corrected = engine.correct_expired().await?;
    if corrected > 0 {
        info!(corrected, "startup correction reactivated reservations");
    }

    let shutdown = CancellationToken::new();
    let sweeper_handle = tokio::spawn(sweeper::run_sweeper(
        engine.clone(),
        SweepSchedule {
            interval: config.sweep_interval,
            retry: config.sweep_retry,
        },
        shutdown.clone(),
    ));
    let compactor_handle = tokio::spawn(sweeper::run_compactor(
        engine.clone(),
        config.compact_threshold,
        Duration::from_secs(60),
        shutdown.clone(),
    ));

    let state = AppState {
        engine,
        identity: Arc::new(HeaderIdentity),
    };
    let app = api::router(state);

    let addr = format!("{}:{}", config.bind, config.port);
    let listener = TcpListener::bind(&addr).await?;
    info!("slotbook listening on {addr}");
    info!("  data_dir: {}", config.data_dir.display());
    info!("  utc_offset_minutes: {}", config.utc_offset_minutes);
    info!("  capacity: {}, cutoff: {}", config.capacity, config.cutoff.format("%H:%M"));
    info!(
        "  metrics: {}",
        config
            .metrics_port
            .map_or("disabled".to_string(), |p| format!("http://0.0.0.0:{p}/metrics"))
    );

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    // Let an in-flight sweep finish before exiting (up to 10s)
    info!("stopping background tasks...");
    shutdown.cancel();
    let drain = async {
        let _ = sweeper_handle.await;
        let _ = compactor_handle.await;
    };
    if tokio::time::timeout(Duration::from_secs(10), drain).await.is_err() {
        tracing::warn!("background tasks did not stop within 10s");
    }

    info!("slotbook stopped");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("failed to listen for ctrl-c: {e}");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                tracing::error!("failed to register SIGTERM handler: {e}");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
    info!("shutdown signal received");
}
