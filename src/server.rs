use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use tokio::net::TcpListener;
use tokio::sync::RwLock;
use tracing::{error, info, warn};

use mediafetch::api::{self, AppState};
use mediafetch::config::Config;
use mediafetch::extractor::{YtDlp, transcoder};
use mediafetch::ledger::FjallStore;
use mediafetch::observability::Metrics;
use mediafetch::progress::ProgressTracker;
use mediafetch::queue::{FjallQueue, TaskBroker};
use mediafetch::storage::{ArtifactStore, RetentionSweeper};
use mediafetch::worker::{FetchPolicy, FetchWorker, spawn_workers};

type AnyError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// How long running jobs get to finish after the listener stops
const SHUTDOWN_GRACE: Duration = Duration::from_secs(30);

pub fn load_config(path: Option<PathBuf>) -> Result<Config, AnyError> {
    info!("Loading configuration");
    let config = match path {
        Some(path) => Config::load_from_path(path),
        None => Config::load(),
    }
    .map_err(|e| format!("Failed to load config: {e}"))?;
    Ok(config)
}

pub async fn run(config: Config, address: Option<SocketAddr>) -> Result<(), AnyError> {
    let address = address.unwrap_or(config.server.bind_addr);

    info!(path = %config.server.ledger_path().display(), "Opening ledger");
    let ledger = Arc::new(
        FjallStore::open(config.server.ledger_path())
            .map_err(|e| format!("Failed to open ledger: {e}"))?,
    );

    info!(path = %config.server.queue_path().display(), "Opening FjallQueue");
    let queue = Arc::new(RwLock::new(
        FjallQueue::open(config.server.queue_path())
            .map_err(|e| format!("Failed to open queue: {e}"))?,
    ));

    let artifacts = ArtifactStore::new(&config.storage.root);
    artifacts.ensure().await?;

    let metrics = Arc::new(Metrics::new());
    let fetch = FetchWorker::new(
        Arc::new(YtDlp::new(&config.worker.extractor_path)),
        artifacts.clone(),
        Arc::new(ProgressTracker::new(ledger.clone())),
        FetchPolicy::from_config(&config.worker, transcoder::locate(&config.worker.transcoder)),
    )
    .with_metrics(metrics.clone());

    let (broker, receivers) =
        TaskBroker::new(queue.clone(), config.worker.count, config.worker.channel_size);
    let workers = spawn_workers(receivers, queue.clone(), Arc::new(fetch), metrics.clone());
    let broker = Arc::new(broker);
    broker.recover().await?;

    let sweeper = RetentionSweeper::new(
        &config.storage.root,
        ledger.clone(),
        config.retention.clone(),
        metrics.clone(),
    )
    .with_queue(queue.clone())
    .spawn();

    let state = AppState::new(config, ledger.clone(), broker.clone(), artifacts, metrics);
    let app = api::router(state);

    let listener = TcpListener::bind(address).await?;
    info!(%address, "mediafetch listening");

    axum::serve(listener, app.into_make_service())
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    sweeper.abort();

    // Dropping the last broker handle closes the worker channels
    drop(broker);
    let deadline = tokio::time::Instant::now() + SHUTDOWN_GRACE;
    for handle in workers {
        if tokio::time::timeout_at(deadline, handle).await.is_err() {
            warn!("Worker still busy at shutdown, its job will be failed on next start");
        }
    }

    queue.read().await.flush()?;
    ledger.persist()?;
    info!("Shutdown complete");

    Ok(())
}

/// One retention pass, for cron-style deployments
pub async fn sweep(config: Config) -> Result<(), AnyError> {
    let ledger = Arc::new(
        FjallStore::open(config.server.ledger_path())
            .map_err(|e| format!("Failed to open ledger: {e}"))?,
    );

    let queue = Arc::new(RwLock::new(
        FjallQueue::open(config.server.queue_path())
            .map_err(|e| format!("Failed to open queue: {e}"))?,
    ));

    let stats = RetentionSweeper::new(
        &config.storage.root,
        ledger.clone(),
        config.retention.clone(),
        Arc::new(Metrics::new()),
    )
    .with_queue(queue.clone())
    .run_once()
    .await;

    queue.read().await.flush()?;
    ledger.persist()?;
    info!(
        removed = stats.removed,
        kept = stats.kept,
        staging_removed = stats.staging_removed,
        errors = stats.errors,
        "Sweep complete"
    );
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{SignalKind, signal};
        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("Shutdown signal received");
}
