//! Strategy evaluation over stored history
//!
//! A date range is cut into consecutive periods; each period is evaluated on
//! the trades recorded inside it and written to the CSV report. Periods with
//! no trades are logged and skipped. The engine state carries over from one
//! period to the next, and no simulated order is written.

use anyhow::Result;
use chrono::{DateTime, Duration, NaiveDate, NaiveDateTime, Utc};
use tracing::{info, warn};

use crate::report::StrategyReport;
use crate::store::Repository;
use crate::strategy::{StrategyDecision, StrategyEngine, StrategyError};
use crate::types::PriceTick;

/// Inclusive time range
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Period {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

/// Cut `[from, to]` into consecutive periods of `length`; the last one is
/// clamped to `to`. Without a (positive) length the whole range is one period.
pub fn split_periods(from: DateTime<Utc>, to: DateTime<Utc>, length: Option<Duration>) -> Vec<Period> {
    let length = match length {
        Some(length) if length > Duration::zero() => length,
        _ => to - from,
    };

    let mut periods = Vec::new();
    let mut start = from;
    while start < to {
        let end = (start + length).min(to);
        periods.push(Period { start, end });
        start = end;
    }
    periods
}

#[derive(Debug, Clone, PartialEq)]
pub enum PeriodOutcome {
    Evaluated(StrategyDecision),
    /// No trades recorded in the period
    Empty,
    Insufficient { required: usize, available: usize },
}

#[derive(Debug, Clone, PartialEq)]
pub struct PeriodResult {
    pub period: Period,
    pub ticks: usize,
    pub outcome: PeriodOutcome,
}

/// Evaluate every period on its most recent `history_size` trades and append
/// each decision to `report`
pub fn evaluate_periods(
    ticks: &dyn Repository<PriceTick>,
    engine: &mut StrategyEngine,
    periods: &[Period],
    history_size: usize,
    report: Option<&StrategyReport>,
) -> Result<Vec<PeriodResult>> {
    let mut results = Vec::with_capacity(periods.len());

    for &period in periods {
        info!(from = %period.start, to = %period.end, "Applying strategy to period");
        let history = ticks.query_between(period.start, period.end, history_size)?;

        let outcome = if history.is_empty() {
            info!(from = %period.start, to = %period.end, "No trades in period, skipping");
            PeriodOutcome::Empty
        } else {
            match engine.evaluate(&history) {
                Ok(decision) => {
                    if let Some(report) = report {
                        report.append(&decision, None)?;
                    }
                    info!(
                        action = %decision.action,
                        price = decision.current_price,
                        rolling_mean = decision.snapshot.rolling_mean,
                        "Period evaluated"
                    );
                    PeriodOutcome::Evaluated(decision)
                }
                Err(StrategyError::InsufficientData {
                    required,
                    available,
                }) => {
                    warn!(required, available, "Not enough trades in period, skipping");
                    PeriodOutcome::Insufficient {
                        required,
                        available,
                    }
                }
            }
        };

        results.push(PeriodResult {
            period,
            ticks: history.len(),
            outcome,
        });
    }

    Ok(results)
}

/// Parse a UTC timestamp given as RFC 3339, `YYYY-MM-DD HH:MM:SS` or `YYYY-MM-DD`
pub fn parse_timestamp(input: &str) -> Result<DateTime<Utc>, String> {
    let input = input.trim();
    if let Ok(ts) = DateTime::parse_from_rfc3339(input) {
        return Ok(ts.with_timezone(&Utc));
    }
    if let Ok(ts) = NaiveDateTime::parse_from_str(input, "%Y-%m-%d %H:%M:%S") {
        return Ok(ts.and_utc());
    }
    NaiveDate::parse_from_str(input, "%Y-%m-%d")
        .ok()
        .and_then(|date| date.and_hms_opt(0, 0, 0))
        .map(|ts| ts.and_utc())
        .ok_or_else(|| format!("invalid timestamp '{}': expected YYYY-MM-DD[ HH:MM:SS]", input))
}
