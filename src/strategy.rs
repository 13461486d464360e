//! Rolling-mean crossover strategy with an alternating buy/sell state
//!
//! The engine holds a single piece of state, whether it is waiting to buy or
//! waiting to sell. Each evaluation compares the latest rolling mean with the
//! current price:
//!
//! | state        | mean < price | mean > price | otherwise |
//! |--------------|--------------|--------------|-----------|
//! | ReadyToBuy   | BUY -> ReadyToSell | HOLD   | HOLD      |
//! | ReadyToSell  | HOLD         | SELL -> ReadyToBuy | HOLD |

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::indicators::{IndicatorParams, IndicatorSnapshot};
use crate::types::{PriceTick, Side};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StrategyError {
    #[error("insufficient data: need {required} ticks, have {available}")]
    InsufficientData { required: usize, available: usize },
}

/// What the engine is waiting for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum StrategyState {
    #[default]
    ReadyToBuy,
    ReadyToSell,
}

impl StrategyState {
    /// State implied by the most recent recorded order
    pub fn after_order(side: Option<Side>) -> Self {
        match side {
            Some(Side::Buy) => Self::ReadyToSell,
            Some(Side::Sell) | None => Self::ReadyToBuy,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Action {
    Buy,
    Sell,
    Hold,
}

impl Action {
    pub fn side(&self) -> Option<Side> {
        match self {
            Action::Buy => Some(Side::Buy),
            Action::Sell => Some(Side::Sell),
            Action::Hold => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Action::Buy => "BUY",
            Action::Sell => "SELL",
            Action::Hold => "HOLD",
        }
    }
}

impl std::fmt::Display for Action {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.pad(self.as_str())
    }
}

/// Pure transition function of the state machine
pub fn transition(state: StrategyState, rolling_mean: f64, price: f64) -> (Action, StrategyState) {
    match state {
        StrategyState::ReadyToBuy if rolling_mean < price => (Action::Buy, StrategyState::ReadyToSell),
        StrategyState::ReadyToSell if rolling_mean > price => (Action::Sell, StrategyState::ReadyToBuy),
        _ => (Action::Hold, state),
    }
}

/// Full result of one evaluation, kept for audit/export
#[derive(Debug, Clone, PartialEq)]
pub struct StrategyDecision {
    pub action: Action,
    pub current_rate: Decimal,
    pub current_price: f64,
    pub snapshot: IndicatorSnapshot,
    pub state_before: StrategyState,
    pub state_after: StrategyState,
    /// Timestamp of the oldest tick in the evaluated history
    pub window_start: DateTime<Utc>,
    /// Timestamp of the most recent tick
    pub window_end: DateTime<Utc>,
    pub evaluated_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct StrategyEngine {
    params: IndicatorParams,
    state: StrategyState,
}

impl StrategyEngine {
    pub fn new(params: IndicatorParams) -> Self {
        Self::with_state(params, StrategyState::default())
    }

    pub fn with_state(params: IndicatorParams, state: StrategyState) -> Self {
        Self { params, state }
    }

    pub fn state(&self) -> StrategyState {
        self.state
    }

    pub fn params(&self) -> &IndicatorParams {
        &self.params
    }

    /// Evaluate and immediately adopt the resulting state.
    ///
    /// On `InsufficientData` the state is left untouched.
    pub fn evaluate(&mut self, ticks: &[PriceTick]) -> Result<StrategyDecision, StrategyError> {
        let decision = self.decide(ticks)?;
        self.commit(&decision);
        Ok(decision)
    }

    /// Adopt the state a decision moved to. Callers that persist the decision
    /// first (orders, report) commit only once that has succeeded.
    pub fn commit(&mut self, decision: &StrategyDecision) {
        self.state = decision.state_after;
    }

    /// Evaluate the strategy over `ticks`, ordered **most recent first**,
    /// without changing the engine state.
    pub fn decide(&self, ticks: &[PriceTick]) -> Result<StrategyDecision, StrategyError> {
        let insufficient = || StrategyError::InsufficientData {
            required: self.params.window,
            available: ticks.len(),
        };

        let (latest, oldest) = match (ticks.first(), ticks.last()) {
            (Some(latest), Some(oldest)) if ticks.len() >= self.params.window => (latest, oldest),
            _ => return Err(insufficient()),
        };

        let rates: Vec<f64> = ticks.iter().rev().map(PriceTick::rate_f64).collect();
        let snapshot = IndicatorSnapshot::latest(&rates, &self.params).ok_or_else(insufficient)?;
        let current_price = latest.rate_f64();

        let state_before = self.state;
        let (action, state_after) = transition(state_before, snapshot.rolling_mean, current_price);

        Ok(StrategyDecision {
            action,
            current_rate: latest.rate,
            current_price,
            snapshot,
            state_before,
            state_after,
            window_start: oldest.timestamp,
            window_end: latest.timestamp,
            evaluated_at: Utc::now(),
        })
    }
}
