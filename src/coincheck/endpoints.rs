//! Request name -> endpoint table
//!
//! Requests are addressed by name (`get_ticker`, `delet_cancel_order`, ...).
//! The HTTP verb comes from the entry's explicit `method` or, when absent, from
//! an exact lookup on the first `_`-separated token of the name.

use std::collections::{BTreeMap, HashMap};

use reqwest::Url;
use serde::{Deserialize, Serialize};

use super::error::{ApiError, ApiResult};
use crate::config::ConfigError;

/// Base URL for the Coincheck REST API
pub const COINCHECK_BASE_URL: &str = "https://coincheck.com";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum HttpVerb {
    Get,
    Post,
    Delete,
}

impl HttpVerb {
    /// Verb encoded in a request name's leading token.
    ///
    /// `delet` is the historical spelling used by the endpoint names.
    pub fn from_request_name(name: &str) -> Option<Self> {
        match name.split('_').next()? {
            "get" => Some(Self::Get),
            "post" => Some(Self::Post),
            "delet" | "delete" => Some(Self::Delete),
            _ => None,
        }
    }

    pub fn as_method(self) -> reqwest::Method {
        match self {
            Self::Get => reqwest::Method::GET,
            Self::Post => reqwest::Method::POST,
            Self::Delete => reqwest::Method::DELETE,
        }
    }
}

impl std::fmt::Display for HttpVerb {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_method().as_str())
    }
}

/// One registered endpoint
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestSpec {
    pub name: String,
    /// Path template, e.g. `/api/exchange/orders/{id}`
    pub path: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub method: Option<HttpVerb>,
    #[serde(default)]
    pub private: bool,
}

impl RequestSpec {
    pub fn public(name: &str, path: &str) -> Self {
        Self {
            name: name.to_string(),
            path: path.to_string(),
            method: None,
            private: false,
        }
    }

    pub fn private(name: &str, path: &str) -> Self {
        Self {
            private: true,
            ..Self::public(name, path)
        }
    }

    pub fn requires_path_param(&self) -> bool {
        placeholder(&self.path).is_some()
    }

    pub fn verb(&self) -> ApiResult<HttpVerb> {
        self.method
            .or_else(|| HttpVerb::from_request_name(&self.name))
            .ok_or_else(|| ApiError::UnsupportedMethod(self.name.clone()))
    }

    /// Substitute the path placeholder, if any.
    pub fn render_path(&self, path_param: Option<&str>) -> ApiResult<String> {
        match (placeholder(&self.path), path_param) {
            (None, _) => Ok(self.path.clone()),
            (Some(_), None) => Err(ApiError::MissingPathParameter(self.name.clone())),
            (Some((start, end)), Some(param)) => Ok(format!(
                "{}{}{}",
                &self.path[..start],
                param,
                &self.path[end..]
            )),
        }
    }
}

/// Byte range of the first `{...}` placeholder in a template.
fn placeholder(path: &str) -> Option<(usize, usize)> {
    let start = path.find('{')?;
    let end = start + path[start..].find('}')?;
    Some((start, end + 1))
}

/// Immutable table of registered requests
#[derive(Debug, Clone)]
pub struct EndpointTable {
    specs: HashMap<String, RequestSpec>,
}

impl EndpointTable {
    /// The Coincheck endpoints the poller knows about
    pub fn coincheck() -> Self {
        let specs = vec![
            RequestSpec::public("get_ticker", "/api/ticker"),
            RequestSpec::public("get_public_trades", "/api/trades"),
            RequestSpec::public("get_orderbooks", "/api/order_books"),
            RequestSpec::public("get_calc_rate", "/api/exchange/orders/rate"),
            RequestSpec::public("get_standard_rate", "/api/rate/{pair}"),
            RequestSpec::private("post_new_order", "/api/exchange/orders"),
            RequestSpec::private("get_unsettled_order_list", "/api/exchange/orders/opens"),
            RequestSpec::private("delet_cancel_order", "/api/exchange/orders/{id}"),
            RequestSpec::private(
                "get_order_cancellation_status",
                "/api/exchange/orders/cancel_status",
            ),
            RequestSpec::private(
                "get_transaction_history",
                "/api/exchange/orders/transactions",
            ),
            RequestSpec::private("get_balance", "/api/accounts/balance"),
            RequestSpec::private("get_account_information", "/api/accounts"),
        ];
        Self {
            specs: specs.into_iter().map(|s| (s.name.clone(), s)).collect(),
        }
    }

    /// Build a table from configuration, rejecting malformed entries.
    pub fn from_specs(specs: Vec<RequestSpec>) -> Result<Self, ConfigError> {
        if specs.is_empty() {
            return Err(ConfigError::InvalidEndpoints(
                "endpoint table is empty".to_string(),
            ));
        }

        let mut table = HashMap::with_capacity(specs.len());
        for spec in specs {
            if spec.name.is_empty() {
                return Err(ConfigError::InvalidEndpoints(
                    "endpoint with empty name".to_string(),
                ));
            }
            if !spec.path.starts_with('/') {
                return Err(ConfigError::InvalidEndpoints(format!(
                    "{}: path must start with '/'",
                    spec.name
                )));
            }
            if spec.path.contains('{') && placeholder(&spec.path).is_none() {
                return Err(ConfigError::InvalidEndpoints(format!(
                    "{}: unterminated placeholder in {}",
                    spec.name, spec.path
                )));
            }
            let name = spec.name.clone();
            if table.insert(name.clone(), spec).is_some() {
                return Err(ConfigError::InvalidEndpoints(format!(
                    "duplicate endpoint {}",
                    name
                )));
            }
        }

        Ok(Self { specs: table })
    }

    pub fn get(&self, name: &str) -> ApiResult<&RequestSpec> {
        self.specs
            .get(name)
            .ok_or_else(|| ApiError::UnknownRequest(name.to_string()))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.specs.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.specs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.specs.is_empty()
    }

    /// Build the absolute URL for a request.
    ///
    /// Query parameters are appended in key order so the same inputs always
    /// produce the same URL (and therefore the same signature).
    pub fn build_url(
        &self,
        base_url: &str,
        name: &str,
        path_param: Option<&str>,
        query: &BTreeMap<String, String>,
    ) -> ApiResult<Url> {
        let spec = self.get(name)?;
        let path = spec.render_path(path_param)?;

        let mut url = Url::parse(&format!("{}{}", base_url.trim_end_matches('/'), path))
            .map_err(|e| ApiError::Transport(format!("invalid URL for {}: {}", name, e)))?;

        if !query.is_empty() {
            url.query_pairs_mut().extend_pairs(query.iter());
        }

        Ok(url)
    }
}

impl Default for EndpointTable {
    fn default() -> Self {
        Self::coincheck()
    }
}
