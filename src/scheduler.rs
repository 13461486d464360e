//! Polling scheduler
//!
//! Runs the ordered task registry once per tick, then sleeps. A failed tick
//! is logged and followed by a longer cool-down; the loop itself only ends on
//! shutdown. Shutdown requests travel through a `watch` channel and are seen
//! between ticks and while sleeping, never in the middle of a request.

use std::io::{self, BufRead, Write};
use std::str::FromStr;
use std::time::Duration;

use anyhow::{Context, Result};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{sleep_until, Instant};
use tracing::{debug, error, info, warn};

use crate::coincheck::{CoincheckClient, PublicTrade};
use crate::config::Config;
use crate::report::StrategyReport;
use crate::simulator::OrderSimulator;
use crate::store::Store;
use crate::strategy::{Action, StrategyEngine, StrategyError, StrategyState};
use crate::types::{PriceTick, SimulatedOrder, TickerSnapshot};

/// One entry of the task registry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TaskKind {
    Ticker,
    Trades,
    OrderBook,
    Strategy,
    /// Logs the account balance; needs credentials
    Balance,
}

impl TaskKind {
    pub const DEFAULT: [TaskKind; 4] = [
        TaskKind::Ticker,
        TaskKind::Trades,
        TaskKind::OrderBook,
        TaskKind::Strategy,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            TaskKind::Ticker => "ticker",
            TaskKind::Trades => "trades",
            TaskKind::OrderBook => "order_book",
            TaskKind::Strategy => "strategy",
            TaskKind::Balance => "balance",
        }
    }

    /// Endpoints the task calls
    pub fn required_requests(&self) -> &'static [&'static str] {
        match self {
            TaskKind::Ticker => &["get_ticker"],
            TaskKind::Trades => &["get_public_trades"],
            TaskKind::OrderBook => &["get_orderbooks"],
            TaskKind::Strategy => &[],
            TaskKind::Balance => &["get_balance"],
        }
    }

    pub fn is_private(&self) -> bool {
        matches!(self, TaskKind::Balance)
    }
}

impl FromStr for TaskKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "ticker" => Ok(TaskKind::Ticker),
            "trades" => Ok(TaskKind::Trades),
            "order_book" => Ok(TaskKind::OrderBook),
            "strategy" => Ok(TaskKind::Strategy),
            "balance" => Ok(TaskKind::Balance),
            other => Err(format!("unknown task: {}", other)),
        }
    }
}

impl std::fmt::Display for TaskKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ShutdownMode {
    /// Stop on the first interrupt
    #[default]
    Immediate,
    /// Ask on the terminal before stopping
    Confirm,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedulerState {
    Running,
    Stopped,
}

pub const CONFIRM_PROMPT: &str = "Do you want to continue (y/n)? ";

/// Ask whether to keep running. Returns `true` when the loop should stop.
///
/// `n` stops, `y` continues, anything else is warned about and continues.
/// A closed input stops, since nobody is left to answer.
pub fn confirm_stop<R: BufRead, W: Write>(input: &mut R, output: &mut W) -> io::Result<bool> {
    output.write_all(CONFIRM_PROMPT.as_bytes())?;
    output.flush()?;

    let mut answer = String::new();
    if input.read_line(&mut answer)? == 0 {
        return Ok(true);
    }

    match answer.trim().to_ascii_lowercase().as_str() {
        "n" => Ok(true),
        "y" => Ok(false),
        other => {
            warn!(answer = other, "Unrecognized answer, continuing");
            Ok(false)
        }
    }
}

/// Listen for Ctrl+C and publish shutdown requests on the returned channel
pub fn spawn_signal_listener(mode: ShutdownMode) -> (watch::Receiver<bool>, JoinHandle<()>) {
    let (tx, rx) = watch::channel(false);

    let handle = tokio::spawn(async move {
        loop {
            if let Err(e) = tokio::signal::ctrl_c().await {
                error!("Error setting up signal handler: {}", e);
                return;
            }

            let stop = match mode {
                ShutdownMode::Immediate => true,
                ShutdownMode::Confirm => {
                    let answer = tokio::task::spawn_blocking(|| {
                        confirm_stop(&mut io::stdin().lock(), &mut io::stdout())
                    })
                    .await;
                    match answer {
                        Ok(Ok(stop)) => stop,
                        Ok(Err(e)) => {
                            warn!("Failed to read confirmation: {}", e);
                            true
                        }
                        Err(e) => {
                            warn!("Confirmation prompt failed: {}", e);
                            true
                        }
                    }
                }
            };

            if stop {
                info!("Received Ctrl+C, initiating shutdown...");
                let _ = tx.send(true);
                return;
            }
            info!("Continuing");
        }
    });

    (rx, handle)
}

/// What one successful tick did
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TickSummary {
    pub tick: u64,
    pub new_trades: usize,
    pub action: Option<Action>,
    pub order: Option<SimulatedOrder>,
}

pub struct Scheduler {
    client: CoincheckClient,
    store: Store,
    pair: String,
    tasks: Vec<TaskKind>,
    history_size: usize,
    engine: StrategyEngine,
    simulator: OrderSimulator,
    report: Option<StrategyReport>,
    interval: Duration,
    cooldown: Duration,
    state: SchedulerState,
    tick_count: u64,
}

impl Scheduler {
    /// Build from a validated config; strategy state is recovered from the
    /// latest stored simulated order
    pub fn new(config: &Config, client: CoincheckClient, store: Store) -> Result<Self> {
        let tasks = config.tasks()?;
        let last_order = store
            .orders
            .latest()
            .context("Failed to read latest simulated order")?;
        let state = StrategyState::after_order(last_order.as_ref().map(|o| o.side));
        if let Some(order) = &last_order {
            info!(
                id = ?order.id,
                side = %order.side,
                state = ?state,
                "Recovered strategy state from last simulated order"
            );
        }

        Ok(Self {
            client,
            store,
            pair: config.exchange.pair.clone(),
            tasks,
            history_size: config.strategy.history_size,
            engine: StrategyEngine::with_state(config.strategy.indicator_params(), state),
            simulator: OrderSimulator::new(&config.exchange.pair, config.strategy.order_amount),
            report: config.strategy.report_path.clone().map(StrategyReport::new),
            interval: Duration::from_secs(config.scheduler.sleeping_seconds),
            cooldown: Duration::from_secs(config.scheduler.cooldown_seconds),
            state: SchedulerState::Stopped,
            tick_count: 0,
        })
    }

    pub fn with_timing(mut self, interval: Duration, cooldown: Duration) -> Self {
        self.interval = interval;
        self.cooldown = cooldown;
        self
    }

    pub fn state(&self) -> SchedulerState {
        self.state
    }

    pub fn strategy_state(&self) -> StrategyState {
        self.engine.state()
    }

    pub fn tick_count(&self) -> u64 {
        self.tick_count
    }

    pub fn tasks(&self) -> &[TaskKind] {
        &self.tasks
    }

    /// Run until `shutdown` turns true
    pub async fn run(&mut self, mut shutdown: watch::Receiver<bool>) -> Result<()> {
        self.state = SchedulerState::Running;
        info!(
            pair = %self.pair,
            tasks = ?self.tasks.iter().map(TaskKind::name).collect::<Vec<_>>(),
            interval_secs = self.interval.as_secs_f64(),
            cooldown_secs = self.cooldown.as_secs_f64(),
            "Scheduler started"
        );

        while !*shutdown.borrow() {
            let delay = match self.tick().await {
                Ok(summary) => {
                    debug!(tick = summary.tick, "Tick completed");
                    self.interval
                }
                Err(e) => {
                    error!(tick = self.tick_count, "Tick failed: {:#}", e);
                    self.cooldown
                }
            };

            Self::wait(delay, &mut shutdown).await;
        }

        self.state = SchedulerState::Stopped;
        info!(ticks = self.tick_count, "Scheduler stopped");
        Ok(())
    }

    /// Sleep for `delay` or until shutdown is requested
    async fn wait(delay: Duration, shutdown: &mut watch::Receiver<bool>) {
        let deadline = Instant::now() + delay;
        tokio::select! {
            _ = sleep_until(deadline) => {}
            changed = shutdown.changed() => {
                // sender gone: no further requests can arrive
                if changed.is_err() {
                    sleep_until(deadline).await;
                }
            }
        }
    }

    /// Run every registered task once, in order. The first failure fails the tick.
    pub async fn tick(&mut self) -> Result<TickSummary> {
        self.tick_count += 1;
        let mut summary = TickSummary {
            tick: self.tick_count,
            ..Default::default()
        };

        for task in self.tasks.clone() {
            self.run_task(task, &mut summary)
                .await
                .with_context(|| format!("task '{}' failed", task))?;
        }

        Ok(summary)
    }

    async fn run_task(&mut self, task: TaskKind, summary: &mut TickSummary) -> Result<()> {
        match task {
            TaskKind::Ticker => self.fetch_ticker().await,
            TaskKind::Trades => {
                summary.new_trades = self.fetch_trades().await?;
                Ok(())
            }
            TaskKind::OrderBook => self.fetch_order_book().await,
            TaskKind::Strategy => {
                if let Some((action, order)) = self.evaluate_strategy()? {
                    summary.action = Some(action);
                    summary.order = order;
                }
                Ok(())
            }
            TaskKind::Balance => self.log_balance().await,
        }
    }

    async fn fetch_ticker(&self) -> Result<()> {
        let snapshot: TickerSnapshot = self.client.ticker(&self.pair).await?.into();
        info!(
            pair = %self.pair,
            last = %snapshot.last,
            bid = %snapshot.bid,
            ask = %snapshot.ask,
            "Ticker"
        );
        self.store.tickers.append(snapshot)?;
        Ok(())
    }

    /// Store trades newer than the latest stored one, oldest first
    async fn fetch_trades(&self) -> Result<usize> {
        let trades = self.client.public_trades(&self.pair).await?;
        let fetched = trades.len();
        let newest_stored = self.store.ticks.latest()?.map(|t| t.id);

        let mut fresh: Vec<PublicTrade> = trades
            .into_iter()
            .filter(|t| newest_stored.map_or(true, |id| t.id > id))
            .collect();
        fresh.sort_by_key(|t| t.id);

        let ticks: Vec<PriceTick> = fresh.into_iter().map(PriceTick::from).collect();
        let inserted = self.store.ticks.append_all(ticks)?;
        info!(pair = %self.pair, fetched, inserted, "Trades stored");
        Ok(inserted)
    }

    async fn fetch_order_book(&self) -> Result<()> {
        let snapshot = self
            .client
            .order_books(&self.pair)
            .await?
            .into_snapshot(Utc::now());
        debug!(
            asks = snapshot.asks.len(),
            bids = snapshot.bids.len(),
            spread = ?snapshot.spread(),
            "Order book"
        );
        self.store.order_books.append(snapshot)?;
        Ok(())
    }

    fn evaluate_strategy(&mut self) -> Result<Option<(Action, Option<SimulatedOrder>)>> {
        let ticks = self.store.ticks.query_recent(self.history_size)?;

        let decision = match self.engine.decide(&ticks) {
            Ok(decision) => decision,
            Err(StrategyError::InsufficientData {
                required,
                available,
            }) => {
                info!(required, available, "Not enough price history yet, skipping strategy");
                return Ok(None);
            }
        };

        info!(
            action = %decision.action,
            price = decision.current_price,
            rolling_mean = decision.snapshot.rolling_mean,
            upper_band = decision.snapshot.upper_band,
            lower_band = decision.snapshot.lower_band,
            rsi = ?decision.snapshot.normalized_rsi,
            volatility = decision.snapshot.volatility,
            state = ?decision.state_after,
            "Strategy evaluated"
        );

        // engine state follows the order log: commit only once the order is stored
        let order = self.simulator.record(&decision, self.store.orders.as_ref())?;
        self.engine.commit(&decision);
        if let Some(report) = &self.report {
            report.append(&decision, order.as_ref())?;
        }

        Ok(Some((decision.action, order)))
    }

    async fn log_balance(&self) -> Result<()> {
        let balance = self.client.balance().await?;
        let (base, quote) = self.pair.split_once('_').unwrap_or((self.pair.as_str(), "jpy"));
        info!(
            base = ?balance.available(base),
            quote = ?balance.available(quote),
            "Account balance"
        );
        Ok(())
    }
}
