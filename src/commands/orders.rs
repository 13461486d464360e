//! Orders command implementation

use anyhow::{Context, Result};
use coincheck_poller::store::Store;
use coincheck_poller::Config;
use tracing::info;

pub fn run(config: Config, limit: usize) -> Result<()> {
    let store = Store::open(&config.storage).context("Failed to open store")?;
    let orders = store.orders.query_recent(limit)?;
    info!(
        shown = orders.len(),
        total = store.orders.count()?,
        "Latest simulated orders"
    );

    if orders.is_empty() {
        println!("No simulated orders recorded");
        return Ok(());
    }

    println!(
        "{:>6}  {:<4}  {:>16}  {:>10}  {:<8}  {}",
        "id", "side", "rate", "amount", "pair", "created_at"
    );
    for order in &orders {
        println!(
            "{:>6}  {:<4}  {:>16}  {:>10}  {:<8}  {}",
            order.id.unwrap_or_default(),
            order.side,
            order.rate,
            order.amount,
            order.pair,
            order.created_at.format("%Y-%m-%d %H:%M:%S")
        );
    }

    Ok(())
}
