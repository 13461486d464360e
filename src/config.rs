//! Configuration management
//!
//! JSON file with every section defaulted. Credentials and the base URL can be
//! overridden from the environment (after `.env` has been loaded).

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use reqwest::Url;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::coincheck::{
    ClientConfig, CoincheckClient, Credentials, EndpointTable, RequestSpec, COINCHECK_BASE_URL,
};
use crate::indicators::IndicatorParams;
use crate::scheduler::{ShutdownMode, TaskKind};
use crate::simulator::DEFAULT_ORDER_AMOUNT;
use crate::store::StorageConfig;

pub const ENV_API_KEY: &str = "COINCHECK_API_KEY";
pub const ENV_API_SECRET: &str = "COINCHECK_API_SECRET";
pub const ENV_BASE_URL: &str = "COINCHECK_BASE_URL";

/// Start-up configuration errors; polling never begins when one is raised
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConfigError {
    #[error("task '{task}' needs API credentials (COINCHECK_API_KEY / COINCHECK_API_SECRET)")]
    MissingCredentials { task: String },

    #[error("invalid base URL '{0}'")]
    InvalidBaseUrl(String),

    #[error("invalid endpoint table: {0}")]
    InvalidEndpoints(String),

    #[error("task '{task}' needs endpoint '{request}', which is not registered")]
    MissingEndpoint { task: String, request: String },

    #[error("invalid parameter {name}: {reason}")]
    InvalidParameter { name: &'static str, reason: String },

    #[error("unknown task '{0}'")]
    UnknownTask(String),
}

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub exchange: ExchangeConfig,
    pub strategy: StrategyConfig,
    pub scheduler: SchedulerConfig,
    pub storage: StorageConfig,
    pub logging: LoggingConfig,
}

impl Config {
    /// Load configuration from a JSON file, then apply environment overrides
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        let mut config: Config =
            serde_json::from_str(&contents).context("Failed to parse config JSON")?;

        config.apply_env();
        Ok(config)
    }

    /// `from_file` when a path is given, defaults plus environment otherwise
    pub fn load(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(path) => Self::from_file(path),
            None => {
                let mut config = Self::default();
                config.apply_env();
                Ok(config)
            }
        }
    }

    pub fn apply_env(&mut self) {
        if let Ok(api_key) = std::env::var(ENV_API_KEY) {
            self.exchange.api_key = Some(api_key);
        }
        if let Ok(api_secret) = std::env::var(ENV_API_SECRET) {
            self.exchange.api_secret = Some(api_secret);
        }
        if let Ok(base_url) = std::env::var(ENV_BASE_URL) {
            self.exchange.base_url = base_url;
        }
    }

    /// Configured endpoint table, or the built-in Coincheck table
    pub fn endpoint_table(&self) -> Result<EndpointTable, ConfigError> {
        match &self.exchange.endpoints {
            Some(specs) => EndpointTable::from_specs(specs.clone()),
            None => Ok(EndpointTable::coincheck()),
        }
    }

    /// Ordered task registry
    pub fn tasks(&self) -> Result<Vec<TaskKind>, ConfigError> {
        self.scheduler
            .tasks
            .iter()
            .map(|name| {
                name.parse::<TaskKind>()
                    .map_err(|_| ConfigError::UnknownTask(name.clone()))
            })
            .collect()
    }

    pub fn credentials(&self) -> Credentials {
        Credentials::new(
            self.exchange.api_key.clone().unwrap_or_default(),
            self.exchange.api_secret.clone().unwrap_or_default(),
        )
    }

    /// Exchange client built from the `exchange` section
    pub fn client(&self) -> Result<CoincheckClient> {
        let client_config = ClientConfig::default()
            .with_timeout(Duration::from_secs(self.exchange.request_timeout_secs))
            .with_rate_limit(self.exchange.rate_limit);

        CoincheckClient::with_config(
            self.exchange.base_url.clone(),
            self.endpoint_table()?,
            self.credentials(),
            client_config,
        )
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        match Url::parse(&self.exchange.base_url) {
            Ok(url) if matches!(url.scheme(), "http" | "https") => {}
            _ => return Err(ConfigError::InvalidBaseUrl(self.exchange.base_url.clone())),
        }

        if self.exchange.pair.trim().is_empty() {
            return Err(invalid("exchange.pair", "must not be empty"));
        }
        if self.exchange.request_timeout_secs == 0 {
            return Err(invalid("exchange.request_timeout_secs", "must be positive"));
        }
        if self.exchange.rate_limit == 0 {
            return Err(invalid("exchange.rate_limit", "must be positive"));
        }

        self.strategy.validate()?;

        if self.scheduler.sleeping_seconds == 0 {
            return Err(invalid("scheduler.sleeping_seconds", "must be positive"));
        }

        let endpoints = self.endpoint_table()?;
        let credentials = self.credentials();
        for task in self.tasks()? {
            for request in task.required_requests() {
                if !endpoints.contains(request) {
                    return Err(ConfigError::MissingEndpoint {
                        task: task.name().to_string(),
                        request: request.to_string(),
                    });
                }
            }
            if task.is_private() && credentials.is_empty() {
                return Err(ConfigError::MissingCredentials {
                    task: task.name().to_string(),
                });
            }
        }

        Ok(())
    }
}

fn invalid(name: &'static str, reason: impl Into<String>) -> ConfigError {
    ConfigError::InvalidParameter {
        name,
        reason: reason.into(),
    }
}

#[derive(Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ExchangeConfig {
    pub base_url: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_secret: Option<String>,
    pub pair: String,
    pub request_timeout_secs: u64,
    /// Requests per second
    pub rate_limit: usize,
    /// Replaces the built-in endpoint table when present
    #[serde(skip_serializing_if = "Option::is_none")]
    pub endpoints: Option<Vec<RequestSpec>>,
}

impl std::fmt::Debug for ExchangeConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExchangeConfig")
            .field("base_url", &self.base_url)
            .field("api_key", &self.api_key)
            .field("api_secret", &self.api_secret.as_ref().map(|_| "***"))
            .field("pair", &self.pair)
            .field("request_timeout_secs", &self.request_timeout_secs)
            .field("rate_limit", &self.rate_limit)
            .field("endpoints", &self.endpoints.as_ref().map(Vec::len))
            .finish()
    }
}

impl Default for ExchangeConfig {
    fn default() -> Self {
        Self {
            base_url: COINCHECK_BASE_URL.to_string(),
            api_key: None,
            api_secret: None,
            pair: "btc_jpy".to_string(),
            request_timeout_secs: 10,
            rate_limit: 5,
            endpoints: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StrategyConfig {
    pub window: usize,
    pub std_dev_multiplier: f64,
    pub rsi_period: usize,
    /// Number of most recent ticks handed to the strategy
    pub history_size: usize,
    pub order_amount: Decimal,
    /// CSV audit file; disabled when unset
    #[serde(skip_serializing_if = "Option::is_none")]
    pub report_path: Option<PathBuf>,
}

impl Default for StrategyConfig {
    fn default() -> Self {
        Self {
            window: 20,
            std_dev_multiplier: 2.0,
            rsi_period: 14,
            history_size: 200,
            order_amount: DEFAULT_ORDER_AMOUNT,
            report_path: None,
        }
    }
}

impl StrategyConfig {
    pub fn indicator_params(&self) -> IndicatorParams {
        IndicatorParams {
            window: self.window,
            std_dev_multiplier: self.std_dev_multiplier,
            rsi_period: self.rsi_period,
        }
    }

    fn validate(&self) -> Result<(), ConfigError> {
        // sample std needs at least two points
        if self.window < 2 {
            return Err(invalid("strategy.window", "must be at least 2"));
        }
        if !(self.std_dev_multiplier.is_finite() && self.std_dev_multiplier > 0.0) {
            return Err(invalid("strategy.std_dev_multiplier", "must be a positive number"));
        }
        if self.rsi_period == 0 {
            return Err(invalid("strategy.rsi_period", "must be positive"));
        }
        if self.history_size < self.window {
            return Err(invalid(
                "strategy.history_size",
                format!("must be at least window ({})", self.window),
            ));
        }
        if self.order_amount <= Decimal::ZERO {
            return Err(invalid("strategy.order_amount", "must be positive"));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    pub sleeping_seconds: u64,
    pub cooldown_seconds: u64,
    pub shutdown_mode: ShutdownMode,
    pub tasks: Vec<String>,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            sleeping_seconds: 5,
            cooldown_seconds: 60,
            shutdown_mode: ShutdownMode::Immediate,
            tasks: TaskKind::DEFAULT
                .iter()
                .map(|t| t.name().to_string())
                .collect(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub dir: PathBuf,
    /// JSON console output instead of the human-readable format
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            dir: PathBuf::from("logs"),
            json: false,
        }
    }
}
