//! Coincheck Exchange API Library
//!
//! - [`auth`]: nonce generation and HMAC-SHA256 request signing
//! - [`endpoints`]: request name -> path/verb table and URL construction
//! - [`client`]: public/private calls with outcome classification
//! - [`types`]: response payloads
//! - [`error`]: [`ApiError`]
//!
//! # Quick Start
//!
//! ```no_run
//! use coincheck_poller::coincheck::{ClientConfig, CoincheckClient, Credentials, EndpointTable};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let client = CoincheckClient::with_config(
//!         "https://coincheck.com",
//!         EndpointTable::coincheck(),
//!         Credentials::from_env()?,
//!         ClientConfig::default(),
//!     )?;
//!
//!     for trade in client.public_trades("btc_jpy").await? {
//!         println!("{} {} @ {}", trade.id, trade.amount, trade.rate);
//!     }
//!
//!     let balance = client.balance().await?;
//!     println!("JPY: {:?}", balance.available("jpy"));
//!     Ok(())
//! }
//! ```

pub mod auth;
pub mod client;
pub mod endpoints;
pub mod error;
pub mod types;

pub use auth::{Credentials, NonceGenerator, SignedHeaders, Signer};
pub use client::{ClientConfig, CoincheckClient};
pub use endpoints::{EndpointTable, HttpVerb, RequestSpec, COINCHECK_BASE_URL};
pub use error::{ApiError, ApiResult};
pub use types::{Balance, NewOrder, OrderBook, OrderSide, PublicTrade, Ticker};
