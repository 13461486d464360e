//! Coincheck market poller
//!
//! Periodically pulls ticker, trade and order-book data from the Coincheck
//! REST API, derives Bollinger Band / RSI signals from recent trades and
//! records simulated orders that alternate between buy and sell.

pub mod coincheck;
pub mod common;
pub mod config;
pub mod evaluation;
pub mod indicators;
pub mod report;
pub mod scheduler;
pub mod simulation;
pub mod simulator;
pub mod store;
pub mod strategy;
pub mod types;

pub use config::{Config, ConfigError};
pub use types::*;
