//! Bearer-token acquisition with a time-based cache.
//!
//! A [`TokenCache`] holds at most one access token. The token is reused until
//! `expires_at - latency_buffer`; after that the next caller refreshes it.
//! The cache mutex is held across the fetch, so concurrent callers that find
//! the token stale wait for a single refresh instead of each starting one.

use aas_bridge_core::{wrap_response, ApiError, ErrorKind, RawResponse, TransportError};
use async_trait::async_trait;
use serde::Deserialize;
use std::fmt;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;

/// Default margin subtracted from a token's lifetime.
pub const DEFAULT_LATENCY_BUFFER: Duration = Duration::from_secs(10);

/// A freshly issued access token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccessToken {
    /// Token value for the `Authorization: Bearer` header
    pub token: String,
    /// Lifetime counted from the moment it was received
    pub expires_in: Duration,
}

/// Source of access tokens.
#[async_trait]
pub trait TokenFetcher: Send + Sync {
    /// Request a new token.
    ///
    /// # Errors
    ///
    /// Returns error if the token endpoint is unreachable or rejects the request.
    async fn fetch_token(&self) -> Result<AccessToken, ApiError>;
}

struct CachedToken {
    token: String,
    expires_at: Instant,
}

/// Process-wide token cache with lazy refresh.
pub struct TokenCache {
    fetcher: Box<dyn TokenFetcher>,
    latency_buffer: Duration,
    slot: Mutex<Option<CachedToken>>,
}

impl fmt::Debug for TokenCache {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenCache")
            .field("latency_buffer", &self.latency_buffer)
            .finish_non_exhaustive()
    }
}

impl TokenCache {
    /// Create an empty cache. The first call to [`TokenCache::bearer`] fetches.
    pub fn new(fetcher: impl TokenFetcher + 'static, latency_buffer: Duration) -> Self {
        Self {
            fetcher: Box::new(fetcher),
            latency_buffer,
            slot: Mutex::new(None),
        }
    }

    /// Return a valid token, fetching a new one if the cached one is stale.
    ///
    /// # Errors
    ///
    /// Returns the fetcher's error; a failed fetch leaves the cache empty.
    pub async fn bearer(&self) -> Result<String, ApiError> {
        let mut slot = self.slot.lock().await;

        if let Some(cached) = slot.as_ref() {
            if Instant::now() + self.latency_buffer < cached.expires_at {
                return Ok(cached.token.clone());
            }
            tracing::debug!("Cached access token expired");
        }

        *slot = None;
        let fresh = self.fetcher.fetch_token().await.map_err(|e| {
            tracing::warn!(error = %e, "Access token request failed");
            e
        })?;
        tracing::debug!(expires_in = ?fresh.expires_in, "Fetched access token");

        let token = fresh.token.clone();
        *slot = Some(CachedToken {
            token: fresh.token,
            expires_at: Instant::now() + fresh.expires_in,
        });
        Ok(token)
    }

    /// Drop the cached token, e.g. after the server rejected it.
    pub async fn invalidate(&self) {
        *self.slot.lock().await = None;
    }
}

/// OAuth2 client-credentials token fetcher.
#[derive(Debug, Clone)]
pub struct ClientCredentialsFetcher {
    client: reqwest::Client,
    token_url: String,
    client_id: String,
    client_secret: String,
    scope: Option<String>,
}

impl ClientCredentialsFetcher {
    /// Create a fetcher for the given token endpoint.
    pub fn new(
        client: reqwest::Client,
        token_url: impl Into<String>,
        client_id: impl Into<String>,
        client_secret: impl Into<String>,
    ) -> Self {
        Self {
            client,
            token_url: token_url.into(),
            client_id: client_id.into(),
            client_secret: client_secret.into(),
            scope: None,
        }
    }

    /// Request a specific scope.
    #[must_use]
    pub fn with_scope(mut self, scope: impl Into<String>) -> Self {
        self.scope = Some(scope.into());
        self
    }
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default = "default_expires_in")]
    expires_in: u64,
}

fn default_expires_in() -> u64 {
    300
}

#[async_trait]
impl TokenFetcher for ClientCredentialsFetcher {
    async fn fetch_token(&self) -> Result<AccessToken, ApiError> {
        let mut form = vec![
            ("grant_type", "client_credentials"),
            ("client_id", self.client_id.as_str()),
            ("client_secret", self.client_secret.as_str()),
        ];
        if let Some(scope) = &self.scope {
            form.push(("scope", scope.as_str()));
        }

        tracing::debug!(token_url = %self.token_url, "POST client credentials");

        let raw = match self.client.post(&self.token_url).form(&form).send().await {
            Ok(response) => {
                let status = response.status().as_u16();
                response
                    .bytes()
                    .await
                    .map(|body| RawResponse::new(status, body.to_vec()))
                    .map_err(|e| TransportError(e.to_string()))
            }
            Err(e) => Err(TransportError(e.to_string())),
        };

        let response = wrap_response::<TokenResponse>(raw).map_err(|mut e| {
            if e.kind == ErrorKind::ValidationError {
                e.kind = ErrorKind::Unauthorized;
            }
            e
        })?;

        Ok(AccessToken {
            token: response.value.access_token,
            expires_in: Duration::from_secs(response.value.expires_in),
        })
    }
}
