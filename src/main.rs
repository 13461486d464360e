//! Coincheck poller - main entry point
//!
//! This binary provides four subcommands:
//! - run: poll the exchange and record simulated orders until interrupted
//! - evaluate: one strategy evaluation over stored history, or one per period
//!   of a date range
//! - simulate: replay the strategy over a synthetic random walk
//! - orders: print the latest simulated orders

use std::path::{Path, PathBuf};

use anyhow::Result;
use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand};
use coincheck_poller::config::LoggingConfig;
use coincheck_poller::evaluation::parse_timestamp;
use coincheck_poller::Config;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

mod commands;

#[derive(Parser, Debug)]
#[command(name = "coincheck-poller")]
#[command(about = "Coincheck market poller with simulated alternating orders", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Verbose output
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Poll the exchange until interrupted
    Run {
        /// Path to configuration file
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Seconds to sleep between ticks (overrides config file)
        #[arg(long)]
        sleeping_seconds: Option<u64>,

        /// Seconds to wait after a failed tick (overrides config file)
        #[arg(long)]
        cooldown_seconds: Option<u64>,

        /// Ask before stopping on Ctrl+C
        #[arg(long)]
        confirm_stop: bool,
    },

    /// Evaluate the strategy over stored history (no order is written)
    Evaluate {
        /// Path to configuration file
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Start of the range to evaluate, UTC ("YYYY-MM-DD HH:MM:SS")
        #[arg(long, value_parser = parse_timestamp)]
        from: Option<DateTime<Utc>>,

        /// End of the range (default: now)
        #[arg(long, value_parser = parse_timestamp, requires = "from")]
        to: Option<DateTime<Utc>>,

        /// Split the range into periods of this many days (default: one period)
        #[arg(long, requires = "from", value_parser = clap::value_parser!(u32).range(1..))]
        period_days: Option<u32>,

        /// CSV file for the per-period rows (overrides config file)
        #[arg(short, long, requires = "from")]
        output: Option<PathBuf>,
    },

    /// Replay the strategy over a synthetic random walk
    Simulate {
        /// Path to configuration file
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Number of synthetic trades
        #[arg(long, default_value = "500")]
        ticks: usize,

        /// Starting price
        #[arg(long, default_value = "5000000")]
        start_price: f64,

        /// Standard deviation of each price step
        #[arg(long, default_value = "5000")]
        volatility: f64,

        /// RNG seed for a reproducible series
        #[arg(long)]
        seed: Option<u64>,
    },

    /// Print the latest simulated orders
    Orders {
        /// Path to configuration file
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Number of orders to show
        #[arg(short, long, default_value = "20")]
        limit: usize,
    },
}

impl Commands {
    fn name(&self) -> &'static str {
        match self {
            Commands::Run { .. } => "run",
            Commands::Evaluate { .. } => "evaluate",
            Commands::Simulate { .. } => "simulate",
            Commands::Orders { .. } => "orders",
        }
    }

    fn config_path(&self) -> Option<&Path> {
        match self {
            Commands::Run { config, .. }
            | Commands::Evaluate { config, .. }
            | Commands::Simulate { config, .. }
            | Commands::Orders { config, .. } => config.as_deref(),
        }
    }
}

fn setup_logging(verbose: bool, command_name: &str, logging: &LoggingConfig) -> Result<()> {
    std::fs::create_dir_all(&logging.dir)?;

    // {command}_{date}.log
    let log_filename = format!(
        "{}_{}.log",
        command_name,
        chrono::Local::now().format("%Y-%m-%d_%H-%M-%S")
    );
    let log_path = logging.dir.join(&log_filename);

    // Set log level - filter out noisy external crates
    let level = if verbose { "debug" } else { "info" };
    let filter_str = format!(
        "{},hyper=warn,hyper_util=warn,reqwest=warn,rustls=warn,h2=warn,rusqlite=warn",
        level
    );
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&filter_str));

    let file_appender = tracing_appender::rolling::never(&logging.dir, &log_filename);

    let console_layer = if logging.json {
        tracing_subscriber::fmt::layer()
            .json()
            .with_target(true)
            .with_current_span(false)
            .boxed()
    } else {
        tracing_subscriber::fmt::layer()
            .with_target(true)
            .with_line_number(true)
            .with_file(true)
            .with_ansi(true)
            .boxed()
    };

    // same format as the console but without ANSI colors
    let file_layer = tracing_subscriber::fmt::layer()
        .with_writer(file_appender)
        .with_target(true)
        .with_line_number(true)
        .with_file(true)
        .with_ansi(false);

    tracing_subscriber::registry()
        .with(env_filter)
        .with(console_layer)
        .with(file_layer)
        .init();

    info!("Logging initialized");
    info!("Log file: {}", log_path.display());
    Ok(())
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    dotenv::dotenv().ok();

    let config = Config::load(cli.command.config_path())?;
    setup_logging(cli.verbose, cli.command.name(), &config.logging)?;

    match cli.command {
        Commands::Run {
            sleeping_seconds,
            cooldown_seconds,
            confirm_stop,
            ..
        } => commands::run::run(config, sleeping_seconds, cooldown_seconds, confirm_stop),

        Commands::Evaluate {
            from,
            to,
            period_days,
            output,
            ..
        } => match from {
            Some(from) => commands::evaluate::run_periods(config, from, to, period_days, output),
            None => commands::evaluate::run(config),
        },

        Commands::Simulate {
            ticks,
            start_price,
            volatility,
            seed,
            ..
        } => commands::simulate::run(config, ticks, start_price, volatility, seed),

        Commands::Orders { limit, .. } => commands::orders::run(config, limit),
    }
}
