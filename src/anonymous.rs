//! Device-level anonymous identity.
//!
//! Before anybody signs in, the server hands each install an opaque token
//! used to correlate unauthenticated activity. The token is minted once,
//! stored, and reused on every later launch without touching the network.
//!
//! ## Concurrency
//! Creation is single-flight: concurrent callers queue behind one lock, the
//! first one performs the `POST /anonymous_tokens`, the rest observe its
//! result. A resolved token is memoised for the rest of the process. A
//! failed creation leaves nothing memoised, so a later call may try again.

use crate::api::ApiClient;
use crate::auth::wire::AnonymousTokenResponse;
use crate::store::SessionStore;
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use std::sync::OnceLock;
use tokio::sync::Mutex;

const ANONYMOUS_TOKENS_PATH: &str = "/anonymous_tokens";

/// Opaque device token. Never empty.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AnonymousToken(String);

impl AnonymousToken {
    /// Wrap a raw token; `None` for an empty string.
    pub fn new(raw: impl Into<String>) -> Option<Self> {
        let raw = raw.into();
        if raw.trim().is_empty() {
            None
        } else {
            Some(Self(raw))
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_inner(self) -> String {
        self.0
    }
}

impl std::fmt::Display for AnonymousToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Ensures the install has an anonymous token.
pub struct AnonymousBootstrapper {
    api: ApiClient,
    store: SessionStore,
    resolved: OnceLock<AnonymousToken>,
    in_flight: Mutex<()>,
}

impl AnonymousBootstrapper {
    pub fn new(api: ApiClient, store: SessionStore) -> Self {
        Self {
            api,
            store,
            resolved: OnceLock::new(),
            in_flight: Mutex::new(()),
        }
    }

    /// Token resolved so far in this process, without waiting.
    pub fn current(&self) -> Option<AnonymousToken> {
        self.resolved.get().cloned()
    }

    /// Return the stored token, minting and persisting one if absent.
    ///
    /// Best-effort: any failure to obtain a token yields `None` instead of an
    /// error. A storage read failure also yields `None` without contacting the
    /// server, so a token that is stored but unreadable is never replaced.
    pub async fn ensure_anonymous_token(&self) -> Option<AnonymousToken> {
        if let Some(token) = self.current() {
            return Some(token);
        }

        let _flight = self.in_flight.lock().await;

        // Another caller may have finished while we waited.
        if let Some(token) = self.current() {
            return Some(token);
        }

        match self.store.anonymous_token().await {
            Ok(Some(token)) => {
                tracing::debug!("Anonymous token loaded from store");
                return Some(self.remember(token));
            }
            Ok(None) => {}
            Err(e) => {
                tracing::warn!("Could not read anonymous token, continuing without one: {e}");
                return None;
            }
        }

        let token = self.create().await?;

        if let Err(e) = self.store.save_anonymous_token(&token).await {
            // Still usable for this run; the next launch mints another.
            tracing::warn!("Failed to persist anonymous token: {e}");
        }

        tracing::info!("Anonymous token created");
        Some(self.remember(token))
    }

    fn remember(&self, token: AnonymousToken) -> AnonymousToken {
        // Only set under `in_flight`, so the first value is the only value.
        self.resolved.get_or_init(|| token).clone()
    }

    /// `POST /anonymous_tokens`; `None` on anything but a `201` carrying a token.
    async fn create(&self) -> Option<AnonymousToken> {
        let response = match self.api.post_empty(ANONYMOUS_TOKENS_PATH).send().await {
            Ok(r) => r,
            Err(e) => {
                tracing::warn!("Anonymous token request failed: {e}");
                return None;
            }
        };

        let status = response.status();
        if status != StatusCode::CREATED {
            tracing::warn!(status = status.as_u16(), "Anonymous token request rejected");
            return None;
        }

        match response.json::<AnonymousTokenResponse>().await {
            Ok(body) => {
                let token = body.token.and_then(AnonymousToken::new);
                if token.is_none() {
                    tracing::warn!("Anonymous token response carried no token");
                }
                token
            }
            Err(e) => {
                tracing::warn!("Anonymous token response unreadable: {e}");
                None
            }
        }
    }
}

// ── Tests ────────────────────────────────────────────────────────
