//! Evaluate command implementation

use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use chrono::{DateTime, Duration, Utc};
use coincheck_poller::evaluation::{evaluate_periods, split_periods, PeriodOutcome};
use coincheck_poller::report::StrategyReport;
use coincheck_poller::store::Store;
use coincheck_poller::strategy::{StrategyEngine, StrategyError, StrategyState};
use coincheck_poller::Config;
use tracing::{info, warn};

const DEFAULT_PERIOD_REPORT: &str = "reports/strategy_periods.csv";

pub fn run(config: Config) -> Result<()> {
    config.validate().context("Invalid configuration")?;

    let store = Store::open(&config.storage).context("Failed to open store")?;
    let ticks = store.ticks.query_recent(config.strategy.history_size)?;
    let last_order = store.orders.latest()?;
    let state = StrategyState::after_order(last_order.as_ref().map(|o| o.side));

    info!(ticks = ticks.len(), state = ?state, "Evaluating stored history");

    let mut engine = StrategyEngine::with_state(config.strategy.indicator_params(), state);
    let decision = match engine.evaluate(&ticks) {
        Ok(decision) => decision,
        Err(StrategyError::InsufficientData {
            required,
            available,
        }) => {
            warn!(required, available, "Not enough price history to evaluate");
            return Ok(());
        }
    };

    let rsi = decision
        .snapshot
        .normalized_rsi
        .map_or_else(|| "n/a".to_string(), |v| format!("{:+.3}", v));

    println!("Window:        {} .. {}", decision.window_start, decision.window_end);
    println!("Price:         {:.2}", decision.current_price);
    println!("Rolling mean:  {:.2}", decision.snapshot.rolling_mean);
    println!(
        "Bands:         {:.2} / {:.2}",
        decision.snapshot.lower_band, decision.snapshot.upper_band
    );
    println!("RSI (norm.):   {}", rsi);
    println!("Volatility:    {:.4}", decision.snapshot.volatility);
    println!(
        "Action:        {} ({:?} -> {:?})",
        decision.action, decision.state_before, decision.state_after
    );

    Ok(())
}

/// Evaluate each period of `[from, to]` and write one report row per period
pub fn run_periods(
    config: Config,
    from: DateTime<Utc>,
    to: Option<DateTime<Utc>>,
    period_days: Option<u32>,
    output: Option<PathBuf>,
) -> Result<()> {
    config.validate().context("Invalid configuration")?;

    let to = to.unwrap_or_else(Utc::now);
    if from >= to {
        bail!("--from ({}) must be before --to ({})", from, to);
    }

    let periods = split_periods(from, to, period_days.map(|d| Duration::days(d as i64)));
    let report_path = output
        .or_else(|| config.strategy.report_path.clone())
        .unwrap_or_else(|| PathBuf::from(DEFAULT_PERIOD_REPORT));
    let report = StrategyReport::new(report_path);
    info!(
        %from,
        %to,
        periods = periods.len(),
        report = %report.path().display(),
        "Evaluating stored history by period"
    );

    let store = Store::open(&config.storage).context("Failed to open store")?;
    let mut engine = StrategyEngine::new(config.strategy.indicator_params());
    let results = evaluate_periods(
        store.ticks.as_ref(),
        &mut engine,
        &periods,
        config.strategy.history_size,
        Some(&report),
    )?;

    println!(
        "{:<19}  {:<19}  {:>6}  {:>14}  {:>14}  {}",
        "from", "to", "trades", "price", "mean", "action"
    );
    for result in &results {
        let (price, mean, action) = match &result.outcome {
            PeriodOutcome::Evaluated(d) => (
                format!("{:.2}", d.current_price),
                format!("{:.2}", d.snapshot.rolling_mean),
                d.action.to_string(),
            ),
            PeriodOutcome::Empty => ("-".into(), "-".into(), "no trades".into()),
            PeriodOutcome::Insufficient { .. } => ("-".into(), "-".into(), "insufficient".into()),
        };
        println!(
            "{:<19}  {:<19}  {:>6}  {:>14}  {:>14}  {}",
            result.period.start.format("%Y-%m-%d %H:%M:%S"),
            result.period.end.format("%Y-%m-%d %H:%M:%S"),
            result.ticks,
            price,
            mean,
            action
        );
    }
    println!("Report: {}", report.path().display());

    Ok(())
}
