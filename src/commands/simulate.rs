//! Simulate command implementation

use anyhow::{Context, Result};
use chrono::Utc;
use coincheck_poller::simulation::{random_walk, replay, WalkParams};
use coincheck_poller::simulator::OrderSimulator;
use coincheck_poller::store::Store;
use coincheck_poller::strategy::StrategyEngine;
use coincheck_poller::Config;
use tracing::info;

pub fn run(
    config: Config,
    ticks: usize,
    start_price: f64,
    volatility: f64,
    seed: Option<u64>,
) -> Result<()> {
    config.validate().context("Invalid configuration")?;

    let params = WalkParams {
        ticks,
        start_price,
        volatility,
        seed,
        pair: config.exchange.pair.clone(),
    };
    info!(
        ticks,
        start_price,
        volatility,
        seed = ?seed,
        "Generating synthetic price series"
    );

    let series = random_walk(&params, Utc::now())?;
    let first = series.first().map(|t| t.rate);
    let last = series.last().map(|t| t.rate);

    let store = Store::in_memory();
    let mut engine = StrategyEngine::new(config.strategy.indicator_params());
    let simulator = OrderSimulator::new(&config.exchange.pair, config.strategy.order_amount);
    let summary = replay(
        series,
        &store,
        &mut engine,
        &simulator,
        config.strategy.history_size,
    )?;

    println!("Series:        {:?} -> {:?}", first, last);
    println!(
        "Evaluations:   {} ({} skipped for insufficient data)",
        summary.evaluations, summary.skipped
    );
    println!(
        "Actions:       {} buy / {} sell / {} hold",
        summary.buys, summary.sells, summary.holds
    );
    println!("Orders:        {}", summary.orders.len());
    for order in &summary.orders {
        println!(
            "  #{:<4} {:<4} {} @ {} ({})",
            order.id.unwrap_or_default(),
            order.side,
            order.amount,
            order.rate,
            order.created_at.format("%H:%M:%S")
        );
    }

    Ok(())
}
