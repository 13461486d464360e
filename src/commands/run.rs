//! Run command implementation

use anyhow::{Context, Result};
use coincheck_poller::scheduler::{spawn_signal_listener, Scheduler, ShutdownMode};
use coincheck_poller::store::Store;
use coincheck_poller::Config;
use tracing::info;

pub fn run(
    mut config: Config,
    sleeping_seconds: Option<u64>,
    cooldown_seconds: Option<u64>,
    confirm_stop: bool,
) -> Result<()> {
    if let Some(secs) = sleeping_seconds {
        config.scheduler.sleeping_seconds = secs;
    }
    if let Some(secs) = cooldown_seconds {
        config.scheduler.cooldown_seconds = secs;
    }
    if confirm_stop {
        config.scheduler.shutdown_mode = ShutdownMode::Confirm;
    }

    config.validate().context("Invalid configuration")?;

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("Failed to build tokio runtime")?;

    runtime.block_on(run_async(config))
}

async fn run_async(config: Config) -> Result<()> {
    info!(
        pair = %config.exchange.pair,
        base_url = %config.exchange.base_url,
        storage = ?config.storage.backend,
        shutdown_mode = ?config.scheduler.shutdown_mode,
        "Starting poller"
    );

    let client = config.client()?;
    let store = Store::open(&config.storage).context("Failed to open store")?;
    let mut scheduler = Scheduler::new(&config, client, store)?;

    let (shutdown, listener) = spawn_signal_listener(config.scheduler.shutdown_mode);
    scheduler.run(shutdown).await?;
    listener.abort();

    info!("Shutdown complete");
    Ok(())
}
