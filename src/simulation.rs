//! Synthetic price data and offline strategy replay
//!
//! Generates a normally distributed random walk (one trade per minute,
//! prices floored at zero) and replays the strategy and order simulator over
//! it through the same repositories the scheduler uses.

use anyhow::{anyhow, Result};
use chrono::{DateTime, Duration, Utc};
use rand::distributions::Distribution;
use rand::rngs::StdRng;
use rand::SeedableRng;
use rust_decimal::prelude::FromPrimitive;
use rust_decimal::Decimal;
use statrs::distribution::Normal;
use tracing::debug;

use crate::simulator::OrderSimulator;
use crate::store::Store;
use crate::strategy::{Action, StrategyEngine, StrategyError};
use crate::types::{PriceTick, Side, SimulatedOrder};

#[derive(Debug, Clone, PartialEq)]
pub struct WalkParams {
    pub ticks: usize,
    pub start_price: f64,
    /// Standard deviation of each price step, in price units
    pub volatility: f64,
    pub seed: Option<u64>,
    pub pair: String,
}

impl Default for WalkParams {
    fn default() -> Self {
        Self {
            ticks: 500,
            start_price: 5_000_000.0,
            volatility: 5_000.0,
            seed: None,
            pair: "btc_jpy".to_string(),
        }
    }
}

/// Random-walk trades, oldest first, starting at `start`
pub fn random_walk(params: &WalkParams, start: DateTime<Utc>) -> Result<Vec<PriceTick>> {
    if !(params.volatility.is_finite() && params.volatility >= 0.0) {
        return Err(anyhow!("volatility must be a non-negative number"));
    }

    let mut rng = match params.seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_entropy(),
    };
    let normal = if params.volatility > 0.0 {
        Some(Normal::new(0.0, params.volatility).map_err(|e| anyhow!("invalid volatility: {}", e))?)
    } else {
        None
    };

    let mut price = params.start_price.max(0.0);
    let mut ticks = Vec::with_capacity(params.ticks);
    for i in 0..params.ticks {
        let step = normal.as_ref().map_or(0.0, |n| n.sample(&mut rng));
        let next = (price + step).max(0.0);
        let side = if next >= price { Side::Buy } else { Side::Sell };
        price = next;

        let rate = Decimal::from_f64(price)
            .ok_or_else(|| anyhow!("price {} is not representable", price))?
            .round_dp(2);
        ticks.push(PriceTick {
            id: i as u64 + 1,
            pair: params.pair.clone(),
            rate,
            amount: Decimal::new(1, 2),
            side,
            timestamp: start + Duration::minutes(i as i64),
        });
    }

    Ok(ticks)
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ReplaySummary {
    pub evaluations: usize,
    pub skipped: usize,
    pub buys: usize,
    pub sells: usize,
    pub holds: usize,
    pub orders: Vec<SimulatedOrder>,
}

/// Feed `ticks` (oldest first) one at a time into the store and evaluate the
/// strategy after each one
pub fn replay(
    ticks: Vec<PriceTick>,
    store: &Store,
    engine: &mut StrategyEngine,
    simulator: &OrderSimulator,
    history_size: usize,
) -> Result<ReplaySummary> {
    let mut summary = ReplaySummary::default();

    for tick in ticks {
        store.ticks.append(tick)?;
        let history = store.ticks.query_recent(history_size)?;

        let decision = match engine.decide(&history) {
            Ok(decision) => decision,
            Err(StrategyError::InsufficientData { .. }) => {
                summary.skipped += 1;
                continue;
            }
        };

        summary.evaluations += 1;
        match decision.action {
            Action::Buy => summary.buys += 1,
            Action::Sell => summary.sells += 1,
            Action::Hold => summary.holds += 1,
        }

        let order = simulator.record(&decision, store.orders.as_ref())?;
        engine.commit(&decision);
        if let Some(order) = order {
            debug!(side = %order.side, rate = %order.rate, "Replay order");
            summary.orders.push(order);
        }
    }

    Ok(summary)
}
