use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use tuneforge_worker::analysis::AnalysisPool;
use tuneforge_worker::config::Config;
use tuneforge_worker::db;
use tuneforge_worker::queue::QueueManager;
use tuneforge_worker::scanner::{ScanMode, Scanner};
use tuneforge_worker::store::FeatureStore;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "tuneforge_worker=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load environment variables
    dotenvy::dotenv().ok();

    tracing::info!("Starting TuneForge worker");

    let config = Config::from_env()?;
    let pool = db::connect(config.database()).await?;

    let cancel = CancellationToken::new();
    let queue = Arc::new(QueueManager::new(
        pool.clone(),
        config.max_attempts,
        config.stall_threshold_secs,
    ));
    let store = Arc::new(FeatureStore::new(
        pool.clone(),
        Duration::from_secs(config.stats_ttl_secs),
    ));

    // Recover entries stranded in processing by a previous run
    queue.reset_stuck().await?;

    // Initial incremental scan to pick up library changes since last run
    let scanner = Scanner::new(
        pool.clone(),
        config.music_library_path().clone(),
        config.min_file_size_bytes,
        config.max_file_size_bytes,
        config.max_path_length,
        cancel.clone(),
    );
    match scanner.scan(ScanMode::Incremental, &queue).await {
        Ok(summary) => {
            tracing::info!(
                inserted = summary.inserted,
                updated = summary.updated,
                removed = summary.removed,
                "Startup scan complete"
            );
        }
        Err(e) => {
            tracing::error!(error = %e, "Startup scan failed");
        }
    }

    let analysis = AnalysisPool::new(
        pool.clone(),
        Arc::clone(&queue),
        Arc::clone(&store),
        config.worker_count,
        Duration::from_secs(config.analysis_timeout_secs),
        Duration::from_secs(config.poll_interval_secs),
        cancel.clone(),
    );
    let workers = analysis.spawn();

    // Periodic stall sweep alongside the workers
    let sweep_queue = Arc::clone(&queue);
    let sweep_cancel = cancel.clone();
    let sweep_interval = Duration::from_secs(config.stall_threshold_secs.max(60));
    let sweeper = tokio::spawn(async move {
        loop {
            tokio::select! {
                _ = sweep_cancel.cancelled() => break,
                _ = tokio::time::sleep(sweep_interval) => {
                    if let Err(e) = sweep_queue.reset_stuck().await {
                        tracing::error!(error = %e, "Stall sweep failed");
                    }
                }
            }
        }
    });

    tokio::signal::ctrl_c().await?;
    tracing::info!("Shutdown requested");
    cancel.cancel();

    for handle in workers {
        let _ = handle.await;
    }
    let _ = sweeper.await;

    tracing::info!("Worker stopped");
    Ok(())
}
