//! C4 — Rate-limited HTTP client.
//!
//! Enforces a process-wide minimum spacing between outgoing brokerage
//! calls, retries bounded failures with a fixed backoff, and decodes JSON
//! into the declared typed envelope. The spacing gate follows the same
//! `Instant`-based windowing `scrapers/polymarket_api.rs::RateLimiter` uses,
//! generalized from a sliding window to a single "time since last call"
//! gate (spec §4.2 asks for spacing, not a request budget).

use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use reqwest::{Client, Method, StatusCode};
use serde::de::DeserializeOwned;
use tokio::time::{sleep, timeout};
use tracing::{debug, warn};

use crate::broker::token::TokenManager;
use crate::error::CoreError;

const MIN_CALL_SPACING: Duration = Duration::from_millis(1000);
const MAX_ATTEMPTS: u32 = 3;
const RETRY_BACKOFF: Duration = Duration::from_millis(1000);
const CALL_TIMEOUT: Duration = Duration::from_secs(10);
const RATE_LIMIT_SENTINEL: &str = "EGW00201";

/// Single process-wide "time of last outgoing call", guarded by a short
/// critical section (spec §5: "the last call timestamp ... single atomic
/// variable").
struct Spacer {
    last_call: Mutex<Option<Instant>>,
}

impl Spacer {
    fn new() -> Self {
        Self {
            last_call: Mutex::new(None),
        }
    }

    async fn wait_turn(&self) {
        loop {
            let wait = {
                let mut guard = self.last_call.lock();
                let now = Instant::now();
                match *guard {
                    Some(last) if now.duration_since(last) < MIN_CALL_SPACING => {
                        Some(MIN_CALL_SPACING - now.duration_since(last))
                    }
                    _ => {
                        *guard = Some(now);
                        None
                    }
                }
            };
            match wait {
                Some(d) => sleep(d).await,
                None => return,
            }
        }
    }
}

pub struct RateLimitedClient {
    client: Client,
    base_url: String,
    app_key: String,
    app_secret: String,
    token: Arc<TokenManager>,
    spacer: Spacer,
}

impl RateLimitedClient {
    pub fn new(client: Client, base_url: String, app_key: String, app_secret: String, token: Arc<TokenManager>) -> Self {
        Self {
            client,
            base_url,
            app_key,
            app_secret,
            token,
            spacer: Spacer::new(),
        }
    }

    /// GET with query params, decoded as `T`.
    pub async fn get<T: DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, &str)],
        tr_id: &str,
    ) -> Result<T, CoreError> {
        self.call(Method::GET, path, query, tr_id, None).await
    }

    /// POST with a JSON body, decoded as `T`.
    pub async fn post<B: serde::Serialize, T: DeserializeOwned>(
        &self,
        path: &str,
        tr_id: &str,
        body: &B,
    ) -> Result<T, CoreError> {
        let json = serde_json::to_value(body).map_err(|e| CoreError::Decode(e.into()))?;
        self.call(Method::POST, path, &[], tr_id, Some(json)).await
    }

    async fn call<T: DeserializeOwned>(
        &self,
        method: Method,
        path: &str,
        query: &[(&str, &str)],
        tr_id: &str,
        body: Option<serde_json::Value>,
    ) -> Result<T, CoreError> {
        let mut last_err = CoreError::Network("no attempt made".to_string());

        for attempt in 1..=MAX_ATTEMPTS {
            self.spacer.wait_turn().await;

            let token = self.token.get_token().await?;
            let url = format!("{}{}", self.base_url, path);
            let mut req = self
                .client
                .request(method.clone(), &url)
                .header("Authorization", format!("Bearer {token}"))
                .header("appkey", &self.app_key)
                .header("appsecret", &self.app_secret)
                .header("tr_id", tr_id);

            if !query.is_empty() {
                req = req.query(query);
            }
            if let Some(b) = &body {
                req = req.json(b);
            }

            let outcome = timeout(CALL_TIMEOUT, req.send()).await;

            // `Ok(body_text)` short-circuits the retry loop with a decoded
            // success; `Err` carries the failure to classify below.
            let step: Result<String, CoreError> = match outcome {
                Err(_) => Err(CoreError::Network("request timed out".to_string())),
                Ok(Err(e)) => Err(CoreError::Network(e.to_string())),
                Ok(Ok(response)) => {
                    let status = response.status();
                    if status.is_success() {
                        let text = response
                            .text()
                            .await
                            .map_err(|e| CoreError::Decode(e.into()))?;
                        if text.contains(RATE_LIMIT_SENTINEL) {
                            Err(CoreError::RateExceeded)
                        } else {
                            Ok(text)
                        }
                    } else if status == StatusCode::TOO_MANY_REQUESTS {
                        Err(CoreError::RateExceeded)
                    } else {
                        let text = response.text().await.unwrap_or_default();
                        if text.contains(RATE_LIMIT_SENTINEL) {
                            Err(CoreError::RateExceeded)
                        } else {
                            Err(CoreError::HttpStatus(status.as_u16()))
                        }
                    }
                }
            };

            match step {
                Ok(text) => {
                    return serde_json::from_str::<T>(&text).map_err(|e| CoreError::Decode(e.into()))
                }
                Err(e) => {
                    last_err = e;
                    if !last_err.is_retryable() {
                        return Err(last_err);
                    }
                    if attempt < MAX_ATTEMPTS {
                        debug!(attempt, "retrying brokerage call after {:?}", RETRY_BACKOFF);
                        sleep(RETRY_BACKOFF).await;
                    }
                }
            }
        }

        warn!(path, "brokerage call exhausted retries");
        Err(last_err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Property 5: under N concurrent callers, the observed interval
    /// between adjacent requests is >= 1000ms minus tolerance.
    #[tokio::test]
    async fn spacer_enforces_minimum_interval() {
        let spacer = Arc::new(Spacer::new());
        let timestamps = Arc::new(Mutex::new(Vec::<Instant>::new()));

        let mut handles = Vec::new();
        for _ in 0..4 {
            let spacer = spacer.clone();
            let timestamps = timestamps.clone();
            handles.push(tokio::spawn(async move {
                spacer.wait_turn().await;
                timestamps.lock().push(Instant::now());
            }));
        }
        for h in handles {
            h.await.unwrap();
        }

        let mut ts = timestamps.lock().clone();
        ts.sort();
        for pair in ts.windows(2) {
            let gap = pair[1].duration_since(pair[0]);
            assert!(
                gap + Duration::from_millis(20) >= MIN_CALL_SPACING,
                "gap {:?} too small",
                gap
            );
        }
    }

    #[test]
    fn rate_limit_sentinel_detected_in_body() {
        let body = r#"{"rt_cd":"1","msg1":"EGW00201 too many requests"}"#;
        assert!(body.contains(RATE_LIMIT_SENTINEL));
    }

    #[test]
    fn retryable_errors_are_classified_correctly() {
        assert!(CoreError::Network("x".into()).is_retryable());
        assert!(CoreError::RateExceeded.is_retryable());
        assert!(CoreError::HttpStatus(503).is_retryable());
        assert!(!CoreError::HttpStatus(404).is_retryable());
        assert!(!CoreError::ArgumentInvalid("x".into()).is_retryable());
    }
}
