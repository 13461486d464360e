//! Coincheck API Client
//!
//! Every call is classified into exactly one of:
//! - `Ok(json)`: 2xx response with a JSON body
//! - `ApiError::Http { status, body }`: non-2xx response
//! - `ApiError::Transport(message)`: timeout, DNS/connection failure, unreadable body
//!
//! Requests are addressed by name through the [`EndpointTable`], and every call
//! emits a single `tracing` event describing its outcome.
//!
//! # Example
//!
//! ```no_run
//! use coincheck_poller::coincheck::{CoincheckClient, ClientConfig, Credentials, EndpointTable};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let client = CoincheckClient::with_config(
//!         "https://coincheck.com",
//!         EndpointTable::coincheck(),
//!         Credentials::new("key", "secret"),
//!         ClientConfig::default(),
//!     )?;
//!     let ticker = client.ticker("btc_jpy").await?;
//!     println!("last: {}", ticker.last);
//!     Ok(())
//! }
//! ```

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use reqwest::{Client, Url};
use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::{info, warn};

use super::auth::{Credentials, SignedHeaders, Signer};
use super::endpoints::{EndpointTable, HttpVerb};
use super::error::{ApiError, ApiResult};
use super::types::{Balance, NewOrder, OrderBook, PublicTrade, PublicTrades, Ticker};
use crate::common::{RateLimiter, RateLimiterConfig};

/// Client configuration
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Per-request timeout; bounds how long shutdown can be delayed by a hung call
    pub timeout: Duration,
    pub rate_limiter: RateLimiterConfig,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(10),
            rate_limiter: RateLimiterConfig::default(),
        }
    }
}

impl ClientConfig {
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_rate_limit(mut self, requests_per_second: usize) -> Self {
        self.rate_limiter = self.rate_limiter.with_rate(requests_per_second);
        self
    }
}

/// Coincheck REST client
#[derive(Clone)]
pub struct CoincheckClient {
    base_url: String,
    endpoints: Arc<EndpointTable>,
    signer: Arc<Signer>,
    http_client: Client,
    rate_limiter: RateLimiter,
}

impl CoincheckClient {
    pub fn with_config(
        base_url: impl Into<String>,
        endpoints: EndpointTable,
        credentials: Credentials,
        config: ClientConfig,
    ) -> Result<Self> {
        let http_client = Client::builder()
            .timeout(config.timeout)
            .pool_max_idle_per_host(4)
            .pool_idle_timeout(Duration::from_secs(90))
            .build()
            .context("Failed to build HTTP client")?;

        Ok(Self {
            base_url: base_url.into(),
            endpoints: Arc::new(endpoints),
            signer: Arc::new(Signer::new(credentials)),
            http_client,
            rate_limiter: RateLimiter::new(config.rate_limiter),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn endpoints(&self) -> &EndpointTable {
        &self.endpoints
    }

    pub fn build_url(
        &self,
        request: &str,
        path_param: Option<&str>,
        query: &BTreeMap<String, String>,
    ) -> ApiResult<Url> {
        self.endpoints
            .build_url(&self.base_url, request, path_param, query)
    }

    /// Unsigned request. Endpoints marked private are refused.
    pub async fn call_public(
        &self,
        request: &str,
        path_param: Option<&str>,
        query: &BTreeMap<String, String>,
    ) -> ApiResult<Value> {
        let (verb, url) = self.prepare(request, path_param, query, false)?;
        self.dispatch(request, verb, url, None).await
    }

    /// Signed request; the signature covers the fully built URL including query
    pub async fn call_private(
        &self,
        request: &str,
        path_param: Option<&str>,
        query: &BTreeMap<String, String>,
    ) -> ApiResult<Value> {
        let (verb, url) = self.prepare(request, path_param, query, true)?;
        let headers = self.signer.sign(url.as_str());
        self.dispatch(request, verb, url, Some(headers)).await
    }

    /// Resolve verb and URL; a rejected call is logged here since it never
    /// reaches `dispatch`
    fn prepare(
        &self,
        request: &str,
        path_param: Option<&str>,
        query: &BTreeMap<String, String>,
        signed: bool,
    ) -> ApiResult<(HttpVerb, Url)> {
        let prepared = self.endpoints.get(request).and_then(|spec| {
            if spec.private && !signed {
                return Err(ApiError::SigningRequired(request.to_string()));
            }
            let verb = spec.verb()?;
            let url = self.build_url(request, path_param, query)?;
            Ok((verb, url))
        });

        if let Err(e) = &prepared {
            warn!(request, private = signed, error = %e, "Request rejected");
        }
        prepared
    }

    async fn dispatch(
        &self,
        request: &str,
        verb: HttpVerb,
        url: Url,
        headers: Option<SignedHeaders>,
    ) -> ApiResult<Value> {
        self.rate_limiter.acquire().await;

        let started = Instant::now();
        let mut builder = self.http_client.request(verb.as_method(), url.clone());
        if let Some(headers) = &headers {
            for (name, value) in headers.as_pairs() {
                builder = builder.header(name, value);
            }
        }

        let outcome = match builder.send().await {
            Ok(response) => {
                let status = response.status();
                match response.text().await {
                    Ok(body) if status.is_success() => serde_json::from_str(&body)
                        .map_err(|e| ApiError::Transport(format!("invalid JSON body: {}", e))),
                    Ok(body) => Err(ApiError::Http {
                        status: status.as_u16(),
                        body,
                    }),
                    Err(e) => Err(ApiError::Transport(e.to_string())),
                }
            }
            Err(e) => Err(ApiError::from(e)),
        };

        let elapsed_ms = started.elapsed().as_millis() as u64;
        match &outcome {
            Ok(_) => info!(
                request,
                method = %verb,
                url = %url,
                private = headers.is_some(),
                elapsed_ms,
                "Request succeeded"
            ),
            Err(e) => warn!(
                request,
                method = %verb,
                url = %url,
                private = headers.is_some(),
                elapsed_ms,
                error = %e,
                "Request failed"
            ),
        }

        outcome
    }

    fn decode<T: DeserializeOwned>(request: &str, value: Value) -> ApiResult<T> {
        serde_json::from_value(value)
            .map_err(|e| ApiError::Transport(format!("unexpected payload for {}: {}", request, e)))
    }

    fn pair_query(pair: &str) -> BTreeMap<String, String> {
        BTreeMap::from([("pair".to_string(), pair.to_string())])
    }

    // ==================== PUBLIC ENDPOINTS ====================

    pub async fn ticker(&self, pair: &str) -> ApiResult<Ticker> {
        let value = self
            .call_public("get_ticker", None, &Self::pair_query(pair))
            .await?;
        Self::decode("get_ticker", value)
    }

    /// Latest public trades, most recent first
    pub async fn public_trades(&self, pair: &str) -> ApiResult<Vec<PublicTrade>> {
        let value = self
            .call_public("get_public_trades", None, &Self::pair_query(pair))
            .await?;
        let trades: PublicTrades = Self::decode("get_public_trades", value)?;
        Ok(trades.data)
    }

    pub async fn order_books(&self, pair: &str) -> ApiResult<OrderBook> {
        let value = self
            .call_public("get_orderbooks", None, &Self::pair_query(pair))
            .await?;
        Self::decode("get_orderbooks", value)
    }

    pub async fn standard_rate(&self, pair: &str) -> ApiResult<Value> {
        self.call_public("get_standard_rate", Some(pair), &BTreeMap::new())
            .await
    }

    // ==================== PRIVATE ENDPOINTS ====================

    pub async fn balance(&self) -> ApiResult<Balance> {
        let value = self
            .call_private("get_balance", None, &BTreeMap::new())
            .await?;
        Self::decode("get_balance", value)
    }

    pub async fn unsettled_orders(&self) -> ApiResult<Value> {
        self.call_private("get_unsettled_order_list", None, &BTreeMap::new())
            .await
    }

    pub async fn cancel_order(&self, order_id: &str) -> ApiResult<Value> {
        self.call_private("delet_cancel_order", Some(order_id), &BTreeMap::new())
            .await
    }

    pub async fn new_order(&self, order: &NewOrder) -> ApiResult<Value> {
        self.call_private("post_new_order", None, &order.to_query())
            .await
    }
}
