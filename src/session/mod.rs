//! Authenticated session state and its single owner, the [`SessionManager`].
//!
//! State machine:
//!
//! ```text
//! Unauthenticated ── login / sign_up success ──▶ Authenticated
//!        ▲                                             │
//!        └────────────────── logout ◀──────────────────┘
//! ```
//!
//! A failed login or sign-up leaves the state untouched. The published
//! [`SessionState`] is the only value the rendering layer inspects.

pub mod form;

pub use form::{AuthForm, FormMode, SubmitError};

use crate::auth::{AuthClient, Outcome};
use crate::store::{SessionStore, StorageError};
use serde::{Deserialize, Serialize};
use tokio::sync::{watch, Mutex};

// ── Data model ───────────────────────────────────────────────────

/// Identity attributes returned by the server on sign-in/sign-up.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct User {
    pub username: String,
    pub email: String,
    /// Any further profile attributes, kept verbatim.
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl User {
    pub fn new(username: impl Into<String>, email: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            email: email.into(),
            extra: serde_json::Map::new(),
        }
    }

    /// Look up an additional profile attribute.
    pub fn attribute(&self, name: &str) -> Option<&serde_json::Value> {
        self.extra.get(name)
    }

    fn is_complete(&self) -> bool {
        !self.username.trim().is_empty() && !self.email.trim().is_empty()
    }
}

/// Why a session could not be constructed.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum InvalidSession {
    #[error("session credential is empty")]
    EmptyCredential,
    #[error("session identity is missing username or email")]
    IncompleteIdentity,
}

/// Proof that a user is signed in: identity plus bearer credential.
///
/// Always carries a non-empty credential and a complete identity; both
/// construction and deserialization enforce it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawSession")]
pub struct AuthenticatedSession {
    credential: String,
    user: User,
}

#[derive(Deserialize)]
struct RawSession {
    credential: String,
    user: User,
}

impl TryFrom<RawSession> for AuthenticatedSession {
    type Error = InvalidSession;

    fn try_from(raw: RawSession) -> Result<Self, Self::Error> {
        Self::new(raw.user, raw.credential)
    }
}

impl AuthenticatedSession {
    pub fn new(user: User, credential: impl Into<String>) -> Result<Self, InvalidSession> {
        let credential = credential.into();
        if credential.trim().is_empty() {
            return Err(InvalidSession::EmptyCredential);
        }
        if !user.is_complete() {
            return Err(InvalidSession::IncompleteIdentity);
        }
        Ok(Self { credential, user })
    }

    pub fn user(&self) -> &User {
        &self.user
    }

    /// Opaque bearer credential.
    pub fn credential(&self) -> &str {
        &self.credential
    }
}

/// What the rendering layer sees.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum SessionState {
    #[default]
    Unauthenticated,
    Authenticated(AuthenticatedSession),
}

impl SessionState {
    pub fn is_authenticated(&self) -> bool {
        matches!(self, Self::Authenticated(_))
    }

    pub fn session(&self) -> Option<&AuthenticatedSession> {
        match self {
            Self::Authenticated(session) => Some(session),
            Self::Unauthenticated => None,
        }
    }

    pub fn user(&self) -> Option<&User> {
        self.session().map(AuthenticatedSession::user)
    }
}

/// Result of a login or sign-up submission.
#[derive(Debug)]
pub struct SubmitResult {
    /// Mapped server response.
    pub outcome: Outcome,
    /// Set when the server accepted the credentials but the session could
    /// not be written to device storage. The in-memory state is
    /// authenticated regardless; it will not survive a restart.
    pub persist_error: Option<StorageError>,
}

impl SubmitResult {
    pub fn into_outcome(self) -> Outcome {
        self.outcome
    }
}

// ── Session manager ──────────────────────────────────────────────

/// Authoritative in-memory session state, mirrored into the store.
///
/// Constructed once at startup and shared by handle. Transitions are
/// serialized: overlapping `login`/`sign_up`/`logout` calls apply one after
/// another in arrival order.
pub struct SessionManager {
    auth: AuthClient,
    store: SessionStore,
    state: watch::Sender<SessionState>,
    transitions: Mutex<()>,
}

impl SessionManager {
    pub fn new(auth: AuthClient, store: SessionStore) -> Self {
        let (state, _) = watch::channel(SessionState::Unauthenticated);
        Self {
            auth,
            store,
            state,
            transitions: Mutex::new(()),
        }
    }

    /// Snapshot of the current state.
    pub fn state(&self) -> SessionState {
        self.state.borrow().clone()
    }

    /// Receive every published transition.
    pub fn subscribe(&self) -> watch::Receiver<SessionState> {
        self.state.subscribe()
    }

    /// `Authorization` header for the current session (empty when signed out).
    pub fn authorization_header(&self) -> String {
        crate::api::authorization_header(self.state.borrow().session())
    }

    /// Load the persisted session and publish it. Called once at startup.
    ///
    /// A storage read failure is treated as "no session".
    pub async fn restore(&self) -> SessionState {
        let _guard = self.transitions.lock().await;

        let restored = match self.store.session().await {
            Ok(Some(session)) => {
                tracing::info!(username = %session.user().username, "Session restored");
                SessionState::Authenticated(session)
            }
            Ok(None) => {
                tracing::debug!("No persisted session");
                SessionState::Unauthenticated
            }
            Err(e) => {
                tracing::warn!("Session restore failed, continuing signed out: {e}");
                SessionState::Unauthenticated
            }
        };

        self.state.send_replace(restored.clone());
        restored
    }

    /// Sign in with email and password.
    pub async fn login(&self, email: &str, password: &str) -> SubmitResult {
        let _guard = self.transitions.lock().await;
        let outcome = self.auth.sign_in(email, password).await;
        self.commit(outcome).await
    }

    /// Create an account; a successful sign-up also signs the user in.
    pub async fn sign_up(&self, username: &str, email: &str, password: &str) -> SubmitResult {
        let _guard = self.transitions.lock().await;
        let outcome = self.auth.sign_up(username, email, password).await;
        self.commit(outcome).await
    }

    /// Sign out. Always succeeds for the caller.
    ///
    /// The in-memory state is cleared even if the stored session cannot be
    /// removed; until the next successful write the device copy may still
    /// hold the old session.
    pub async fn logout(&self) {
        let _guard = self.transitions.lock().await;

        if let Err(e) = self.store.clear_session().await {
            tracing::warn!("Failed to remove stored session on logout: {e}");
        }
        self.state.send_replace(SessionState::Unauthenticated);
        tracing::info!("Signed out");
    }

    async fn commit(&self, outcome: Outcome) -> SubmitResult {
        let Outcome::Success(session) = &outcome else {
            return SubmitResult {
                outcome,
                persist_error: None,
            };
        };

        let persist_error = match self.store.save_session(session).await {
            Ok(()) => None,
            Err(e) => {
                tracing::warn!("Signed in but session was not persisted: {e}");
                Some(e)
            }
        };

        tracing::info!(username = %session.user().username, "Signed in");
        self.state
            .send_replace(SessionState::Authenticated(session.clone()));

        SubmitResult {
            outcome,
            persist_error,
        }
    }
}

// ── Tests ────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::ApiClient;
    use crate::config::ApiConfig;
    use crate::store::{KeyValueStore, MemoryStore, StoreKey};
    use std::sync::Arc;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn session_body(username: &str, email: &str, token: &str) -> serde_json::Value {
        serde_json::json!({
            "data": {
                "id": "7",
                "type": "users",
                "attributes": {
                    "username": username,
                    "email": email,
                    "authentication_token": token,
                    "avatar_url": "/uploads/7.png"
                }
            }
        })
    }

    fn manager_for(server: &MockServer, raw: Arc<MemoryStore>) -> SessionManager {
        let api = ApiClient::new(&ApiConfig {
            root: server.uri(),
            timeout_secs: 5,
        })
        .unwrap();
        SessionManager::new(AuthClient::new(api), SessionStore::new(raw))
    }

    #[test]
    fn session_requires_credential_and_identity() {
        let user = User::new("alice", "alice@example.com");
        assert_eq!(
            AuthenticatedSession::new(user.clone(), " "),
            Err(InvalidSession::EmptyCredential)
        );
        assert_eq!(
            AuthenticatedSession::new(User::new("", "a@b.c"), "tok"),
            Err(InvalidSession::IncompleteIdentity)
        );
        assert!(AuthenticatedSession::new(user, "tok").is_ok());
    }

    #[test]
    fn user_extra_attributes_flatten() {
        let json = r#"{"username":"a","email":"a@b.c","avatar_url":"/x.png","id":3}"#;
        let user: User = serde_json::from_str(json).unwrap();
        assert_eq!(
            user.attribute("avatar_url"),
            Some(&serde_json::json!("/x.png"))
        );
        assert_eq!(user.attribute("id"), Some(&serde_json::json!(3)));
        assert!(user.attribute("username").is_none());

        let back = serde_json::to_value(&user).unwrap();
        assert_eq!(back["avatar_url"], "/x.png");
    }

    #[tokio::test]
    async fn invalid_credentials_leave_state_unauthenticated() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/users/sign_in"))
            .respond_with(ResponseTemplate::new(401))
            .mount(&server)
            .await;

        let raw = Arc::new(MemoryStore::new());
        let manager = manager_for(&server, raw.clone());

        let result = manager.login("a@b.c", "wrong").await;
        assert_eq!(result.outcome, Outcome::InvalidCredentials);
        assert_eq!(manager.state(), SessionState::Unauthenticated);
        assert!(raw.peek(StoreKey::AuthSession).is_none());
    }

    #[tokio::test]
    async fn login_then_logout_walks_the_state_machine() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/users/sign_in"))
            .respond_with(
                ResponseTemplate::new(201).set_body_json(session_body("alice", "a@b.c", "tok-1")),
            )
            .mount(&server)
            .await;

        let raw = Arc::new(MemoryStore::new());
        let manager = manager_for(&server, raw.clone());
        let mut updates = manager.subscribe();

        let result = manager.login("a@b.c", "pw").await;
        assert!(result.outcome.is_success());
        assert!(result.persist_error.is_none());

        let state = manager.state();
        assert_eq!(state.user().unwrap().username, "alice");
        assert_eq!(state.session().unwrap().credential(), "tok-1");
        assert!(updates.has_changed().unwrap());
        assert!(updates.borrow_and_update().is_authenticated());
        assert_eq!(
            manager.authorization_header(),
            "Token token=tok-1, email=a@b.c"
        );

        manager.logout().await;
        assert_eq!(manager.state(), SessionState::Unauthenticated);
        assert!(raw.get(StoreKey::AuthSession).await.unwrap().is_none());
        assert_eq!(manager.authorization_header(), "");
    }

    #[tokio::test]
    async fn restore_after_restart_yields_persisted_session() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/users/sign_in"))
            .respond_with(
                ResponseTemplate::new(201).set_body_json(session_body("alice", "a@b.c", "tok-1")),
            )
            .mount(&server)
            .await;

        let raw = Arc::new(MemoryStore::new());
        let persisted = {
            let manager = manager_for(&server, raw.clone());
            manager.login("a@b.c", "pw").await;
            manager.state()
        };

        // Fresh manager over the same storage simulates an app restart.
        let manager = manager_for(&server, raw);
        assert_eq!(manager.state(), SessionState::Unauthenticated);
        let restored = manager.restore().await;
        assert_eq!(restored, persisted);
        assert_eq!(manager.state(), persisted);
    }

    #[tokio::test]
    async fn restore_fails_open_on_read_error() {
        let server = MockServer::start().await;
        let raw = Arc::new(MemoryStore::new());
        raw.fail_reads(true);

        let manager = manager_for(&server, raw);
        assert_eq!(manager.restore().await, SessionState::Unauthenticated);
    }

    #[tokio::test]
    async fn write_failure_on_login_is_surfaced_but_state_authenticates() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/users"))
            .respond_with(
                ResponseTemplate::new(201).set_body_json(session_body("bob", "b@c.d", "tok-2")),
            )
            .mount(&server)
            .await;

        let raw = Arc::new(MemoryStore::new());
        raw.fail_writes(true);
        let manager = manager_for(&server, raw.clone());

        let result = manager.sign_up("bob", "b@c.d", "pw").await;
        assert!(result.outcome.is_success());
        assert!(matches!(
            result.persist_error,
            Some(StorageError::Unavailable(_))
        ));
        assert!(manager.state().is_authenticated());
        assert!(raw.peek(StoreKey::AuthSession).is_none());
    }

    #[tokio::test]
    async fn logout_clears_state_even_when_removal_fails() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/users/sign_in"))
            .respond_with(
                ResponseTemplate::new(201).set_body_json(session_body("alice", "a@b.c", "tok-1")),
            )
            .mount(&server)
            .await;

        let raw = Arc::new(MemoryStore::new());
        let manager = manager_for(&server, raw.clone());
        manager.login("a@b.c", "pw").await;

        raw.fail_writes(true);
        manager.logout().await;

        assert_eq!(manager.state(), SessionState::Unauthenticated);
        // Durable copy diverges until the next successful write.
        assert!(raw.peek(StoreKey::AuthSession).is_some());
    }

    #[tokio::test]
    async fn failed_sign_up_keeps_existing_session() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/users/sign_in"))
            .respond_with(
                ResponseTemplate::new(201).set_body_json(session_body("alice", "a@b.c", "tok-1")),
            )
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/users"))
            .respond_with(ResponseTemplate::new(422).set_body_json(serde_json::json!({
                "errors": [{"source": {"pointer": "/data/attributes/username"}, "detail": "taken"}]
            })))
            .mount(&server)
            .await;

        let raw = Arc::new(MemoryStore::new());
        let manager = manager_for(&server, raw);
        manager.login("a@b.c", "pw").await;
        let before = manager.state();

        let result = manager.sign_up("alice", "x@y.z", "pw").await;
        assert!(matches!(result.outcome, Outcome::ValidationFailed(_)));
        assert_eq!(manager.state(), before);
    }
}
