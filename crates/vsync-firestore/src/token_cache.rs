//! Bearer tokens for the Firestore REST API.
//!
//! Service account tokens are cached and refreshed a minute before they
//! expire. Only one task refreshes at a time; if the refresh fails while the
//! old token is still valid, the old token keeps being used.

use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use gcp_auth::TokenProvider;
use tokio::sync::RwLock;
use tracing::{debug, warn};

use crate::error::{FirestoreError, FirestoreResult};

/// OAuth scope covering the Firestore REST API.
pub const FIRESTORE_SCOPE: &str = "https://www.googleapis.com/auth/datastore";

/// Bearer token accepted by the Firestore emulator.
const EMULATOR_TOKEN: &str = "owner";

const REFRESH_MARGIN: Duration = Duration::from_secs(60);

struct CachedToken {
    value: String,
    expires_at: Instant,
}

impl CachedToken {
    fn is_fresh(&self, now: Instant) -> bool {
        now + REFRESH_MARGIN < self.expires_at
    }

    fn is_unexpired(&self, now: Instant) -> bool {
        now < self.expires_at
    }
}

enum TokenSource {
    ServiceAccount(Arc<dyn TokenProvider>),
    Emulator,
}

/// Hands out bearer tokens for Firestore requests.
pub struct TokenCache {
    source: TokenSource,
    current: RwLock<Option<CachedToken>>,
}

impl TokenCache {
    pub fn service_account(provider: Arc<dyn TokenProvider>) -> Self {
        Self {
            source: TokenSource::ServiceAccount(provider),
            current: RwLock::new(None),
        }
    }

    /// Cache for the local emulator, which accepts a fixed token.
    pub fn emulator() -> Self {
        Self {
            source: TokenSource::Emulator,
            current: RwLock::new(None),
        }
    }

    /// Drop the cached token, e.g. after the API reported it expired.
    pub async fn invalidate(&self) {
        *self.current.write().await = None;
    }

    pub async fn get_token(&self) -> FirestoreResult<String> {
        let provider = match &self.source {
            TokenSource::Emulator => return Ok(EMULATOR_TOKEN.to_string()),
            TokenSource::ServiceAccount(provider) => provider,
        };

        if let Some(token) = self.current.read().await.as_ref() {
            if token.is_fresh(Instant::now()) {
                return Ok(token.value.clone());
            }
        }

        let mut current = self.current.write().await;
        // Another task may have refreshed while this one waited for the lock
        if let Some(token) = current.as_ref().filter(|t| t.is_fresh(Instant::now())) {
            return Ok(token.value.clone());
        }

        match provider.token(&[FIRESTORE_SCOPE]).await {
            Ok(token) => {
                // Already expired maps to zero, forcing a refresh next time
                let ttl = (token.expires_at() - Utc::now())
                    .to_std()
                    .unwrap_or(Duration::ZERO);
                let value = token.as_str().to_string();
                *current = Some(CachedToken {
                    value: value.clone(),
                    expires_at: Instant::now() + ttl,
                });
                debug!(ttl_secs = ttl.as_secs(), "Refreshed Firestore token");
                Ok(value)
            }
            Err(e) => match current.as_ref().filter(|t| t.is_unexpired(Instant::now())) {
                Some(token) => {
                    warn!("Firestore token refresh failed, reusing current token: {}", e);
                    Ok(token.value.clone())
                }
                None => Err(FirestoreError::AuthError(format!(
                    "Failed to obtain Firestore token: {}",
                    e
                ))),
            },
        }
    }
}
