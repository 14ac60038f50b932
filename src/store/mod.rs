//! Persistent session storage.
//!
//! Exactly two string-keyed slots survive app restarts:
//! - `anonymousToken`: the raw device token issued by the server
//! - `authSession`: a versioned JSON record wrapping the authenticated session
//!
//! ## Design
//! - [`KeyValueStore`] is the device-storage seam (SQLite on device, memory for
//!   ephemeral runs). Every call may suspend on I/O and reports failures.
//! - [`SessionStore`] layers typed accessors over it. Undecodable or
//!   future-version session records read back as absent so a bad record can
//!   never lock the user out; write failures are always returned.
//! - The anonymous bootstrapper is the only writer of `anonymousToken` and the
//!   session manager the only writer of `authSession`.

pub mod memory;
pub mod sqlite;

pub use memory::MemoryStore;
pub use sqlite::SqliteStore;

use crate::anonymous::AnonymousToken;
use crate::session::AuthenticatedSession;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Current layout version of the persisted `authSession` record.
pub const SESSION_RECORD_VERSION: u32 = 1;

/// The storage slots this core owns.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum StoreKey {
    AnonymousToken,
    AuthSession,
}

impl StoreKey {
    /// Stable on-device key name.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::AnonymousToken => "anonymousToken",
            Self::AuthSession => "authSession",
        }
    }
}

impl std::fmt::Display for StoreKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Local persistence failure.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("storage backend error: {0}")]
    Backend(#[from] rusqlite::Error),
    #[error("session record encoding failed: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("storage I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("storage task failed: {0}")]
    Task(String),
    #[error("storage unavailable: {0}")]
    Unavailable(String),
}

/// Raw device key/value storage.
///
/// Implementations must be idempotent: setting a slot to the value it already
/// holds changes nothing, and removing an absent slot succeeds.
#[async_trait]
pub trait KeyValueStore: Send + Sync {
    /// Read a slot. `Ok(None)` when the slot is empty.
    async fn get(&self, key: StoreKey) -> Result<Option<String>, StorageError>;

    /// Write a slot, replacing any previous value.
    async fn set(&self, key: StoreKey, value: &str) -> Result<(), StorageError>;

    /// Clear a slot.
    async fn remove(&self, key: StoreKey) -> Result<(), StorageError>;

    /// Backend name for logs.
    fn name(&self) -> &str;
}

/// On-device envelope for the authenticated session.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct SessionRecord {
    version: u32,
    saved_at: DateTime<Utc>,
    session: AuthenticatedSession,
}

/// Typed access to the two session slots.
#[derive(Clone)]
pub struct SessionStore {
    inner: Arc<dyn KeyValueStore>,
}

impl SessionStore {
    pub fn new(inner: Arc<dyn KeyValueStore>) -> Self {
        Self { inner }
    }

    // ── Anonymous token slot ─────────────────────────────────────

    /// Load the device's anonymous token. An empty stored string counts as absent.
    pub async fn anonymous_token(&self) -> Result<Option<AnonymousToken>, StorageError> {
        let raw = self.inner.get(StoreKey::AnonymousToken).await?;
        Ok(raw.and_then(AnonymousToken::new))
    }

    /// Persist the device's anonymous token.
    pub async fn save_anonymous_token(&self, token: &AnonymousToken) -> Result<(), StorageError> {
        self.inner
            .set(StoreKey::AnonymousToken, token.as_str())
            .await
    }

    // ── Session slot ─────────────────────────────────────────────

    /// Load the persisted session.
    ///
    /// Backend failures are returned; a record that cannot be decoded or was
    /// written by a newer layout reads as `Ok(None)`.
    pub async fn session(&self) -> Result<Option<AuthenticatedSession>, StorageError> {
        let Some(raw) = self.inner.get(StoreKey::AuthSession).await? else {
            return Ok(None);
        };
        Ok(decode_session_record(&raw))
    }

    /// Persist the session, stamped with the current record version.
    pub async fn save_session(&self, session: &AuthenticatedSession) -> Result<(), StorageError> {
        let record = SessionRecord {
            version: SESSION_RECORD_VERSION,
            saved_at: Utc::now(),
            session: session.clone(),
        };
        let encoded = serde_json::to_string(&record)?;
        self.inner.set(StoreKey::AuthSession, &encoded).await
    }

    /// Clear the session slot.
    pub async fn clear_session(&self) -> Result<(), StorageError> {
        self.inner.remove(StoreKey::AuthSession).await
    }
}

fn decode_session_record(raw: &str) -> Option<AuthenticatedSession> {
    let value: serde_json::Value = match serde_json::from_str(raw) {
        Ok(v) => v,
        Err(e) => {
            tracing::warn!("Discarding unreadable session record: {e}");
            return None;
        }
    };

    let version = value.get("version").and_then(serde_json::Value::as_u64);
    if version != Some(u64::from(SESSION_RECORD_VERSION)) {
        tracing::warn!(
            found = ?version,
            expected = SESSION_RECORD_VERSION,
            "Discarding session record with unsupported version"
        );
        return None;
    }

    match serde_json::from_value::<SessionRecord>(value) {
        Ok(record) => Some(record.session),
        Err(e) => {
            tracing::warn!("Discarding malformed session record: {e}");
            None
        }
    }
}

// ── Tests ────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::User;

    fn sample_session() -> AuthenticatedSession {
        let user = User::new("alice", "alice@example.com");
        AuthenticatedSession::new(user, "tok-123").unwrap()
    }

    fn memory_store() -> (Arc<MemoryStore>, SessionStore) {
        let raw = Arc::new(MemoryStore::new());
        let store = SessionStore::new(raw.clone());
        (raw, store)
    }

    #[test]
    fn store_key_names_are_stable() {
        assert_eq!(StoreKey::AnonymousToken.as_str(), "anonymousToken");
        assert_eq!(StoreKey::AuthSession.as_str(), "authSession");
        assert_eq!(StoreKey::AuthSession.to_string(), "authSession");
    }

    #[tokio::test]
    async fn session_round_trips_through_record() {
        let (_raw, store) = memory_store();
        let session = sample_session();

        store.save_session(&session).await.unwrap();
        let loaded = store.session().await.unwrap();
        assert_eq!(loaded, Some(session));
    }

    #[tokio::test]
    async fn saved_record_carries_version_and_timestamp() {
        let (raw, store) = memory_store();
        store.save_session(&sample_session()).await.unwrap();

        let stored = raw.get(StoreKey::AuthSession).await.unwrap().unwrap();
        let value: serde_json::Value = serde_json::from_str(&stored).unwrap();
        assert_eq!(value["version"], 1);
        assert!(value["saved_at"].is_string());
        assert_eq!(value["session"]["credential"], "tok-123");
        assert_eq!(value["session"]["user"]["username"], "alice");
    }

    #[tokio::test]
    async fn future_version_reads_as_absent() {
        let (raw, store) = memory_store();
        raw.set(
            StoreKey::AuthSession,
            r#"{"version":2,"saved_at":"2026-01-01T00:00:00Z","session":{"credential":"x","user":{"username":"a","email":"b"}}}"#,
        )
        .await
        .unwrap();

        assert!(store.session().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn garbage_record_reads_as_absent() {
        let (raw, store) = memory_store();
        raw.set(StoreKey::AuthSession, "{not json").await.unwrap();
        assert!(store.session().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn record_with_empty_credential_reads_as_absent() {
        let (raw, store) = memory_store();
        raw.set(
            StoreKey::AuthSession,
            r#"{"version":1,"saved_at":"2026-01-01T00:00:00Z","session":{"credential":"","user":{"username":"a","email":"b"}}}"#,
        )
        .await
        .unwrap();

        assert!(store.session().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn clear_session_twice_is_ok() {
        let (_raw, store) = memory_store();
        store.save_session(&sample_session()).await.unwrap();

        store.clear_session().await.unwrap();
        store.clear_session().await.unwrap();
        assert!(store.session().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn empty_anonymous_token_reads_as_absent() {
        let (raw, store) = memory_store();
        raw.set(StoreKey::AnonymousToken, "").await.unwrap();
        assert!(store.anonymous_token().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn slots_are_independent() {
        let (_raw, store) = memory_store();
        let token = AnonymousToken::new("anon-1").unwrap();
        store.save_anonymous_token(&token).await.unwrap();
        store.save_session(&sample_session()).await.unwrap();

        store.clear_session().await.unwrap();
        assert_eq!(store.anonymous_token().await.unwrap(), Some(token));
    }

    #[tokio::test]
    async fn read_failure_is_reported() {
        let (raw, store) = memory_store();
        raw.fail_reads(true);
        assert!(matches!(
            store.session().await,
            Err(StorageError::Unavailable(_))
        ));
    }
}
