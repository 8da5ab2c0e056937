use std::sync::Arc;

use anyhow::Result;
use tracing::info;

use visitstat_core::config::Config;
use visitstat_duckdb::DuckDbBackend;
use visitstat_worker::rollup::RollupWorker;

#[tokio::main]
async fn main() -> Result<()> {
    // Structured JSON logging. Level controlled via RUST_LOG.
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("visitstat=info".parse()?),
        )
        .json()
        .init();

    let cfg = Config::from_env().map_err(|e| anyhow::anyhow!(e))?;

    std::fs::create_dir_all(&cfg.data_dir)?;
    let db_path = cfg.db_path();
    let db = Arc::new(DuckDbBackend::open(&db_path, &cfg.store_config())?);
    db.ping().await?;

    let worker = Arc::new(RollupWorker::from_config(Arc::clone(&db), &cfg));
    info!(
        db = %db_path,
        scope = %cfg.scope,
        interval_secs = cfg.rollup_interval_secs,
        "visitstat worker ready"
    );

    tokio::select! {
        _ = worker.run_loop(cfg.rollup_interval()) => {}
        _ = tokio::signal::ctrl_c() => {
            info!("Shutdown signal received");
        }
    }

    Ok(())
}
