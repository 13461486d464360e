//! Paper order generation
//!
//! Turns a strategy decision into a simulated order. Consecutive orders always
//! alternate direction: a signal in the same direction as the last recorded
//! order produces nothing.

use anyhow::Result;
use chrono::Utc;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use tracing::{debug, info};

use crate::store::Repository;
use crate::strategy::StrategyDecision;
use crate::types::SimulatedOrder;

pub const DEFAULT_ORDER_AMOUNT: Decimal = dec!(0.05);

#[derive(Debug, Clone)]
pub struct OrderSimulator {
    pair: String,
    amount: Decimal,
}

impl OrderSimulator {
    pub fn new(pair: impl Into<String>, amount: Decimal) -> Self {
        Self {
            pair: pair.into(),
            amount,
        }
    }

    pub fn pair(&self) -> &str {
        &self.pair
    }

    pub fn amount(&self) -> Decimal {
        self.amount
    }

    /// Order implied by `decision`, given the most recent recorded order
    pub fn decide(
        &self,
        decision: &StrategyDecision,
        last_order: Option<&SimulatedOrder>,
    ) -> Option<SimulatedOrder> {
        let side = decision.action.side()?;

        if let Some(last) = last_order {
            if last.side == side {
                debug!(side = %side, last_id = ?last.id, "Same direction as last order, skipping");
                return None;
            }
        }

        Some(SimulatedOrder {
            id: None,
            side,
            rate: decision.current_rate,
            amount: self.amount,
            pair: self.pair.clone(),
            created_at: Utc::now(),
        })
    }

    /// Decide against the latest stored order and append the result
    pub fn record(
        &self,
        decision: &StrategyDecision,
        orders: &dyn Repository<SimulatedOrder>,
    ) -> Result<Option<SimulatedOrder>> {
        let last = orders.latest()?;
        let Some(order) = self.decide(decision, last.as_ref()) else {
            return Ok(None);
        };

        let stored = orders.append(order)?;
        info!(
            id = ?stored.id,
            side = %stored.side,
            rate = %stored.rate,
            amount = %stored.amount,
            pair = %stored.pair,
            "Simulated order recorded"
        );
        Ok(Some(stored))
    }
}

impl Default for OrderSimulator {
    fn default() -> Self {
        Self::new("btc_jpy", DEFAULT_ORDER_AMOUNT)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::indicators::IndicatorSnapshot;
    use crate::store::MemoryRepository;
    use crate::strategy::{Action, StrategyState};
    use crate::types::Side;

    fn decision(action: Action, rate: Decimal) -> StrategyDecision {
        let now = Utc::now();
        StrategyDecision {
            action,
            current_rate: rate,
            current_price: 0.0,
            snapshot: IndicatorSnapshot {
                rolling_mean: 0.0,
                upper_band: 0.0,
                lower_band: 0.0,
                normalized_rsi: None,
                volatility: 0.0,
            },
            state_before: StrategyState::ReadyToBuy,
            state_after: StrategyState::ReadyToBuy,
            window_start: now,
            window_end: now,
            evaluated_at: now,
        }
    }

    #[test]
    fn test_hold_produces_nothing() {
        let sim = OrderSimulator::default();
        assert!(sim.decide(&decision(Action::Hold, dec!(100)), None).is_none());
    }

    #[test]
    fn test_first_order_follows_action() {
        let sim = OrderSimulator::new("eth_jpy", dec!(0.5));
        let order = sim.decide(&decision(Action::Sell, dec!(123.4)), None).unwrap();
        assert_eq!(order.side, Side::Sell);
        assert_eq!(order.rate, dec!(123.4));
        assert_eq!(order.amount, dec!(0.5));
        assert_eq!(order.pair, "eth_jpy");
        assert_eq!(order.id, None);
    }

    #[test]
    fn test_same_direction_is_skipped() {
        let sim = OrderSimulator::default();
        let last = sim.decide(&decision(Action::Buy, dec!(100)), None).unwrap();
        assert!(sim.decide(&decision(Action::Buy, dec!(101)), Some(&last)).is_none());

        let next = sim.decide(&decision(Action::Sell, dec!(102)), Some(&last)).unwrap();
        assert_eq!(next.side, Side::Sell);
    }

    #[test]
    fn test_alternation_law() {
        let sim = OrderSimulator::default();
        let repo = MemoryRepository::new();

        let actions = [
            Action::Buy,
            Action::Buy,
            Action::Hold,
            Action::Sell,
            Action::Sell,
            Action::Buy,
            Action::Hold,
            Action::Sell,
            Action::Buy,
            Action::Buy,
        ];
        for (i, action) in actions.iter().enumerate() {
            sim.record(&decision(*action, Decimal::from(100 + i as i64)), &repo)
                .unwrap();
        }

        let mut orders = repo.query_recent(usize::MAX).unwrap();
        orders.reverse();
        let sides: Vec<Side> = orders.iter().map(|o| o.side).collect();
        assert_eq!(
            sides,
            vec![Side::Buy, Side::Sell, Side::Buy, Side::Sell, Side::Buy]
        );
        assert!(orders.windows(2).all(|w| w[0].side != w[1].side));
    }

    #[test]
    fn test_record_returns_stored_order() {
        let sim = OrderSimulator::default();
        let repo = MemoryRepository::new();

        let stored = sim
            .record(&decision(Action::Buy, dec!(100)), &repo)
            .unwrap()
            .unwrap();
        assert_eq!(stored.id, Some(1));
        assert!(sim
            .record(&decision(Action::Hold, dec!(100)), &repo)
            .unwrap()
            .is_none());
    }
}
