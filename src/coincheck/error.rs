//! Coincheck client error types

use thiserror::Error;

/// Every failure the client can report.
///
/// The first four variants are programming errors on our side (bad request
/// name or arguments). They are raised before anything is sent. `Http` and `Transport` are the two failure outcomes of
/// a request that was actually dispatched.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ApiError {
    #[error("unknown request: {0}")]
    UnknownRequest(String),

    #[error("request {0} requires a path parameter")]
    MissingPathParameter(String),

    #[error("unsupported HTTP method for request {0}")]
    UnsupportedMethod(String),

    #[error("request {0} is private and must be signed")]
    SigningRequired(String),

    #[error("HTTP {status}: {body}")]
    Http { status: u16, body: String },

    #[error("transport error: {0}")]
    Transport(String),
}

impl ApiError {
    /// Whether retrying later can reasonably succeed.
    pub fn is_recoverable(&self) -> bool {
        matches!(self, Self::Http { .. } | Self::Transport(_))
    }

    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Http { status, .. } => Some(*status),
            _ => None,
        }
    }
}

impl From<reqwest::Error> for ApiError {
    fn from(err: reqwest::Error) -> Self {
        Self::Transport(err.to_string())
    }
}

pub type ApiResult<T> = Result<T, ApiError>;
