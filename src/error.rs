//! Error taxonomy shared by the broker client and everything built on it.
//!
//! Mirrors the failure kinds the core must branch on (spec §7). Call sites
//! that only need to log-and-continue wrap these in `anyhow::Result`, the
//! same split the rest of the codebase uses between typed errors at the
//! boundary and `anyhow` everywhere above it.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum CoreError {
    #[error("network error: {0}")]
    Network(String),

    #[error("http status {0}")]
    HttpStatus(u16),

    #[error("failed to decode response body")]
    Decode(#[source] anyhow::Error),

    #[error("brokerage rate limit exceeded")]
    RateExceeded,

    #[error("token refresh failed: {0}")]
    TokenFailure(String),

    #[error("broker rejected request: rt_cd={rt_cd} msg1={msg1}")]
    BrokerReject { rt_cd: String, msg1: String },

    #[error("expected data missing from store: {0}")]
    DataMissing(String),

    #[error("invalid argument: {0}")]
    ArgumentInvalid(String),
}

impl CoreError {
    /// C4's retry policy: Network, HttpStatus(5xx) and RateExceeded are
    /// retryable; everything else surfaces immediately.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            CoreError::Network(_) | CoreError::RateExceeded
        ) || matches!(self, CoreError::HttpStatus(s) if *s >= 500)
    }
}

pub type CoreResult<T> = Result<T, CoreError>;
