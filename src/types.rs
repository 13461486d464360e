//! Core data types used across the poller

use chrono::{DateTime, Utc};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Trade direction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Side {
    Buy,
    Sell,
}

impl Side {
    pub fn as_str(&self) -> &'static str {
        match self {
            Side::Buy => "BUY",
            Side::Sell => "SELL",
        }
    }

    pub fn opposite(&self) -> Self {
        match self {
            Side::Buy => Side::Sell,
            Side::Sell => Side::Buy,
        }
    }
}

impl std::fmt::Display for Side {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.pad(self.as_str())
    }
}

impl std::str::FromStr for Side {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "BUY" => Ok(Side::Buy),
            "SELL" => Ok(Side::Sell),
            other => Err(format!("unknown side: {}", other)),
        }
    }
}

/// One public trade, used as a price observation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriceTick {
    /// Exchange trade id
    pub id: u64,
    pub pair: String,
    pub rate: Decimal,
    pub amount: Decimal,
    pub side: Side,
    pub timestamp: DateTime<Utc>,
}

impl PriceTick {
    pub fn rate_f64(&self) -> f64 {
        self.rate.to_f64().unwrap_or(f64::NAN)
    }
}

/// Latest ticker values
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TickerSnapshot {
    pub last: Decimal,
    pub bid: Decimal,
    pub ask: Decimal,
    pub high: Decimal,
    pub low: Decimal,
    pub volume: Decimal,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BookLevel {
    pub price: Decimal,
    pub quantity: Decimal,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderBookSnapshot {
    pub asks: Vec<BookLevel>,
    pub bids: Vec<BookLevel>,
    pub captured_at: DateTime<Utc>,
}

impl OrderBookSnapshot {
    pub fn best_ask(&self) -> Option<&BookLevel> {
        self.asks.first()
    }

    pub fn best_bid(&self) -> Option<&BookLevel> {
        self.bids.first()
    }

    pub fn spread(&self) -> Option<Decimal> {
        Some(self.best_ask()?.price - self.best_bid()?.price)
    }
}

/// A paper order produced by the order simulator
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimulatedOrder {
    /// Row id, assigned by the repository
    pub id: Option<i64>,
    pub side: Side,
    pub rate: Decimal,
    pub amount: Decimal,
    pub pair: String,
    pub created_at: DateTime<Utc>,
}
