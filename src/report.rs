//! CSV audit trail of strategy evaluations
//!
//! One row per evaluation. The header is written only when the file is
//! created, so the report can be appended to across restarts.

use std::fs::OpenOptions;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use csv::WriterBuilder;
use serde::Serialize;

use crate::strategy::{Action, StrategyDecision, StrategyState};
use crate::types::SimulatedOrder;

#[derive(Debug, Serialize)]
struct ReportRow {
    evaluated_at: DateTime<Utc>,
    window_start: DateTime<Utc>,
    window_end: DateTime<Utc>,
    action: Action,
    current_price: f64,
    rolling_mean: f64,
    upper_band: f64,
    lower_band: f64,
    normalized_rsi: Option<f64>,
    volatility: f64,
    state: StrategyState,
    order_id: Option<i64>,
}

impl ReportRow {
    fn new(decision: &StrategyDecision, order: Option<&SimulatedOrder>) -> Self {
        Self {
            evaluated_at: decision.evaluated_at,
            window_start: decision.window_start,
            window_end: decision.window_end,
            action: decision.action,
            current_price: decision.current_price,
            rolling_mean: decision.snapshot.rolling_mean,
            upper_band: decision.snapshot.upper_band,
            lower_band: decision.snapshot.lower_band,
            normalized_rsi: decision.snapshot.normalized_rsi,
            volatility: decision.snapshot.volatility,
            state: decision.state_after,
            order_id: order.and_then(|o| o.id),
        }
    }
}

#[derive(Debug, Clone)]
pub struct StrategyReport {
    path: PathBuf,
}

impl StrategyReport {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append one evaluation, creating the file (and header) if needed
    pub fn append(&self, decision: &StrategyDecision, order: Option<&SimulatedOrder>) -> Result<()> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }

        let is_new = !self.path.exists();
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .with_context(|| format!("Failed to open report: {}", self.path.display()))?;

        let mut wtr = WriterBuilder::new().has_headers(is_new).from_writer(file);
        wtr.serialize(ReportRow::new(decision, order))
            .context("Failed to write report row")?;
        wtr.flush()?;
        Ok(())
    }
}
