//! C3 — Token manager.
//!
//! Caches the brokerage bearer token to a durable text-file store (line 1 =
//! token, line 2 = ISO-8601 local `expiresAt`) and refreshes it single-flight
//! against the OAuth2 client-credentials endpoint on expiry. Mirrors the
//! `Arc<parking_lot::Mutex<..>>`-guarded state + `tokio::sync::Mutex` single-
//! flight pattern the rest of the codebase uses for shared mutable state
//! (`signals/enrichment.rs`'s semaphore-gated workers, `db_storage.rs`'s
//! guarded `Connection`).

use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::{DateTime, Local, NaiveDateTime, TimeZone};
use reqwest::Client;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::broker::types::{TokenRequest, TokenResponse};
use crate::error::CoreError;

const TOKEN_LIFETIME_HOURS: i64 = 23;
const MIN_REMAINING_MINUTES: i64 = 1;
const MAX_REFRESH_ATTEMPTS: u32 = 2;

#[derive(Debug, Clone)]
struct CachedToken {
    token: String,
    expires_at: DateTime<Local>,
}

/// Durable file-backed token cache plus single-flight refresh.
///
/// The `tokio::sync::Mutex` around the cached token is the single-flight
/// gate: a refresh holds it for the full duration of the network call, so
/// concurrent `get_token()` callers queue behind it instead of each firing
/// their own request.
pub struct TokenManager {
    client: Client,
    base_url: String,
    app_key: String,
    app_secret: String,
    store_path: PathBuf,
    cached: Mutex<Option<CachedToken>>,
}

impl TokenManager {
    pub fn new(client: Client, base_url: String, app_key: String, app_secret: String, store_path: impl AsRef<Path>) -> Self {
        Self {
            client,
            base_url,
            app_key,
            app_secret,
            store_path: store_path.as_ref().to_path_buf(),
            cached: Mutex::new(None),
        }
    }

    /// Returns a token valid for at least one more minute, refreshing (at
    /// most once per concurrent wave of callers) if needed.
    pub async fn get_token(&self) -> Result<String, CoreError> {
        let mut guard = self.cached.lock().await;

        if let Some(cached) = guard.as_ref() {
            if cached.expires_at - Local::now() > chrono::Duration::minutes(MIN_REMAINING_MINUTES) {
                return Ok(cached.token.clone());
            }
        } else if let Some(from_disk) = self.load_from_disk() {
            if from_disk.expires_at - Local::now() > chrono::Duration::minutes(MIN_REMAINING_MINUTES) {
                let token = from_disk.token.clone();
                *guard = Some(from_disk);
                return Ok(token);
            }
        }

        let refreshed = self.refresh_with_retry().await?;
        let token = refreshed.token.clone();
        self.persist_to_disk(&refreshed);
        *guard = Some(refreshed);
        Ok(token)
    }

    async fn refresh_with_retry(&self) -> Result<CachedToken, CoreError> {
        let mut last_err = None;
        for attempt in 0..=MAX_REFRESH_ATTEMPTS {
            match self.refresh_once().await {
                Ok(cached) => return Ok(cached),
                Err(e) => {
                    warn!(attempt, error = %e, "token refresh failed");
                    last_err = Some(e);
                }
            }
        }
        Err(last_err.unwrap_or_else(|| CoreError::TokenFailure("unknown".to_string())))
    }

    async fn refresh_once(&self) -> Result<CachedToken, CoreError> {
        let url = format!("{}/oauth2/tokenP", self.base_url);
        let body = TokenRequest {
            grant_type: "client_credentials",
            appkey: &self.app_key,
            appsecret: &self.app_secret,
        };

        let response = self
            .client
            .post(&url)
            .json(&body)
            .send()
            .await
            .map_err(|e| CoreError::TokenFailure(e.to_string()))?;

        if !response.status().is_success() {
            return Err(CoreError::TokenFailure(format!(
                "status {}",
                response.status()
            )));
        }

        let parsed: TokenResponse = response
            .json()
            .await
            .map_err(|e| CoreError::TokenFailure(e.to_string()))?;

        if parsed.access_token.is_empty() {
            return Err(CoreError::TokenFailure("empty access_token".to_string()));
        }

        info!("brokerage token refreshed");
        Ok(CachedToken {
            token: parsed.access_token,
            expires_at: Local::now() + chrono::Duration::hours(TOKEN_LIFETIME_HOURS),
        })
    }

    fn load_from_disk(&self) -> Option<CachedToken> {
        let raw = std::fs::read_to_string(&self.store_path).ok()?;
        let mut lines = raw.lines();
        let token = lines.next()?.trim().to_string();
        let expires_raw = lines.next()?.trim();
        if token.is_empty() {
            return None;
        }
        let naive = NaiveDateTime::parse_from_str(expires_raw, "%Y-%m-%dT%H:%M:%S%.f").ok()?;
        let expires_at = Local.from_local_datetime(&naive).single()?;
        debug!("loaded cached brokerage token from disk");
        Some(CachedToken { token, expires_at })
    }

    fn persist_to_disk(&self, cached: &CachedToken) {
        let contents = format!(
            "{}\n{}\n",
            cached.token,
            cached.expires_at.format("%Y-%m-%dT%H:%M:%S%.f")
        );
        if let Err(e) = std::fs::write(&self.store_path, contents) {
            warn!(error = %e, "failed to persist brokerage token to disk");
        }
    }
}

pub fn shared(client: Client, base_url: String, app_key: String, app_secret: String, store_path: impl AsRef<Path>) -> Arc<TokenManager> {
    Arc::new(TokenManager::new(client, base_url, app_key, app_secret, store_path))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn disk_round_trip_parses_back() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("token.txt");
        let cached = CachedToken {
            token: "abc123".to_string(),
            expires_at: Local::now() + chrono::Duration::hours(1),
        };
        let mgr = TokenManager::new(
            Client::new(),
            "http://example.invalid".to_string(),
            "k".to_string(),
            "s".to_string(),
            &path,
        );
        mgr.persist_to_disk(&cached);
        let loaded = mgr.load_from_disk().expect("should parse");
        assert_eq!(loaded.token, "abc123");
    }

    #[test]
    fn missing_file_is_absent() {
        let mgr = TokenManager::new(
            Client::new(),
            "http://example.invalid".to_string(),
            "k".to_string(),
            "s".to_string(),
            "/nonexistent/path/token.txt",
        );
        assert!(mgr.load_from_disk().is_none());
    }

    #[test]
    fn partial_file_is_treated_as_absent() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("token.txt");
        std::fs::write(&path, "only-one-line\n").unwrap();
        let mgr = TokenManager::new(
            Client::new(),
            "http://example.invalid".to_string(),
            "k".to_string(),
            "s".to_string(),
            &path,
        );
        assert!(mgr.load_from_disk().is_none());
    }

    #[tokio::test]
    async fn concurrent_get_token_single_flights_when_cache_warm() {
        // With a warm, far-future cache, concurrent callers should all
        // return instantly without taking the refresh path at all.
        let mgr = Arc::new(TokenManager::new(
            Client::new(),
            "http://example.invalid".to_string(),
            "k".to_string(),
            "s".to_string(),
            "/nonexistent/path/token.txt",
        ));
        *mgr.cached.lock().await = Some(CachedToken {
            token: "warm-token".to_string(),
            expires_at: Local::now() + chrono::Duration::hours(1),
        });

        let calls = Arc::new(AtomicUsize::new(0));
        let mut handles = Vec::new();
        for _ in 0..8 {
            let mgr = mgr.clone();
            let calls = calls.clone();
            handles.push(tokio::spawn(async move {
                let t = mgr.get_token().await.unwrap();
                calls.fetch_add(1, Ordering::SeqCst);
                t
            }));
        }
        for h in handles {
            assert_eq!(h.await.unwrap(), "warm-token");
        }
        assert_eq!(calls.load(Ordering::SeqCst), 8);
    }

    /// Property 6: under N concurrent `get_token()` calls with an expired
    /// cache, exactly one network refresh occurs. Stands up a tiny local
    /// HTTP stub instead of mocking the client, so the single-flight gate
    /// on `self.cached` is exercised for real.
    #[tokio::test]
    async fn concurrent_refresh_is_single_flight() {
        use tokio::io::{AsyncReadExt, AsyncWriteExt};
        use tokio::net::TcpListener;

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let hits = Arc::new(AtomicUsize::new(0));

        let server_hits = hits.clone();
        tokio::spawn(async move {
            loop {
                let (mut socket, _) = match listener.accept().await {
                    Ok(v) => v,
                    Err(_) => break,
                };
                server_hits.fetch_add(1, Ordering::SeqCst);
                tokio::spawn(async move {
                    let mut buf = [0u8; 1024];
                    let _ = socket.read(&mut buf).await;
                    let body = r#"{"access_token":"fresh-token"}"#;
                    let resp = format!(
                        "HTTP/1.1 200 OK\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                        body.len(),
                        body
                    );
                    let _ = socket.write_all(resp.as_bytes()).await;
                });
            }
        });

        let mgr = Arc::new(TokenManager::new(
            Client::new(),
            format!("http://{addr}"),
            "k".to_string(),
            "s".to_string(),
            "/nonexistent/path/token.txt",
        ));

        let mut handles = Vec::new();
        for _ in 0..6 {
            let mgr = mgr.clone();
            handles.push(tokio::spawn(async move { mgr.get_token().await.unwrap() }));
        }
        for h in handles {
            assert_eq!(h.await.unwrap(), "fresh-token");
        }

        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }
}
