//! Sign-up / sign-in exchanges.
//!
//! Provides:
//! - [`AuthClient`]: performs the two network exchanges
//! - [`Outcome`]: every response mapped to a typed result, never an `Err`
//! - [`ValidationErrorSet`]: per-field server validation messages
//!
//! ## Mapping
//! | Exchange | Status | Outcome |
//! |---|---|---|
//! | both | 201 | `Success` (session from `data.attributes`) |
//! | sign-up | 422 | `ValidationFailed` |
//! | sign-in | 401 | `InvalidCredentials` |
//! | both | no response | `TransportError(Network)` |
//! | both | anything else | `TransportError(UnexpectedStatus)` |
//!
//! The client has no side effects: persisting a successful session is the
//! session manager's job.

pub mod errors;
pub mod wire;

pub use errors::{Field, ValidationErrorSet};

use crate::api::ApiClient;
use crate::session::AuthenticatedSession;
use reqwest::StatusCode;
use wire::{ErrorEnvelope, SessionEnvelope, SignInRequest, SignInUser, SignUpRequest, SignUpUser};

const SIGN_UP_PATH: &str = "/users";
const SIGN_IN_PATH: &str = "/users/sign_in";

/// Why no usable server response was obtained.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransportFailure {
    /// The request never produced a response (DNS, TLS, timeout, reset).
    #[error("network error: {0}")]
    Network(String),
    /// The server answered with a status this exchange does not define.
    #[error("unexpected status {0}")]
    UnexpectedStatus(u16),
    /// The status was expected but the body could not be used.
    #[error("malformed response body: {0}")]
    MalformedBody(String),
}

/// Result of a sign-in or sign-up exchange.
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    Success(AuthenticatedSession),
    ValidationFailed(ValidationErrorSet),
    InvalidCredentials,
    TransportError(TransportFailure),
}

impl Outcome {
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success(_))
    }

    pub fn session(&self) -> Option<&AuthenticatedSession> {
        match self {
            Self::Success(session) => Some(session),
            _ => None,
        }
    }

    /// Field errors to display, empty unless validation failed.
    pub fn field_errors(&self) -> ValidationErrorSet {
        match self {
            Self::ValidationFailed(errors) => errors.clone(),
            _ => ValidationErrorSet::new(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Exchange {
    SignUp,
    SignIn,
}

impl Exchange {
    fn name(self) -> &'static str {
        match self {
            Self::SignUp => "sign_up",
            Self::SignIn => "sign_in",
        }
    }
}

/// Maps the user endpoints into [`Outcome`]s.
#[derive(Debug, Clone)]
pub struct AuthClient {
    api: ApiClient,
}

impl AuthClient {
    pub fn new(api: ApiClient) -> Self {
        Self { api }
    }

    /// `POST /users`.
    pub async fn sign_up(&self, username: &str, email: &str, password: &str) -> Outcome {
        let body = SignUpRequest {
            user: SignUpUser {
                username,
                email,
                password,
            },
        };
        self.exchange(Exchange::SignUp, SIGN_UP_PATH, &body).await
    }

    /// `POST /users/sign_in`.
    pub async fn sign_in(&self, email: &str, password: &str) -> Outcome {
        let body = SignInRequest {
            user: SignInUser { email, password },
        };
        self.exchange(Exchange::SignIn, SIGN_IN_PATH, &body).await
    }

    async fn exchange<T: serde::Serialize>(
        &self,
        exchange: Exchange,
        path: &str,
        body: &T,
    ) -> Outcome {
        let response = match self.api.post_json(path, body).send().await {
            Ok(r) => r,
            Err(e) => {
                tracing::warn!(exchange = exchange.name(), "Auth request failed: {e}");
                return Outcome::TransportError(TransportFailure::Network(e.to_string()));
            }
        };

        let status = response.status();
        tracing::debug!(exchange = exchange.name(), status = status.as_u16(), "Auth response");

        match (exchange, status) {
            (_, StatusCode::CREATED) => {
                let bytes = match response.bytes().await {
                    Ok(b) => b,
                    Err(e) => {
                        return Outcome::TransportError(TransportFailure::Network(e.to_string()))
                    }
                };
                map_session_body(&bytes)
            }
            (Exchange::SignUp, StatusCode::UNPROCESSABLE_ENTITY) => {
                let bytes = match response.bytes().await {
                    Ok(b) => b,
                    Err(e) => {
                        return Outcome::TransportError(TransportFailure::Network(e.to_string()))
                    }
                };
                map_validation_body(&bytes)
            }
            (Exchange::SignIn, StatusCode::UNAUTHORIZED) => Outcome::InvalidCredentials,
            (_, other) => {
                tracing::warn!(
                    exchange = exchange.name(),
                    status = other.as_u16(),
                    "Unexpected auth response status"
                );
                Outcome::TransportError(TransportFailure::UnexpectedStatus(other.as_u16()))
            }
        }
    }
}

fn map_session_body(bytes: &[u8]) -> Outcome {
    let envelope: SessionEnvelope = match serde_json::from_slice(bytes) {
        Ok(e) => e,
        Err(e) => return Outcome::TransportError(TransportFailure::MalformedBody(e.to_string())),
    };

    match envelope.into_session() {
        Some(session) => Outcome::Success(session),
        None => Outcome::TransportError(TransportFailure::MalformedBody(
            "session attributes missing username, email or authentication_token".into(),
        )),
    }
}

fn map_validation_body(bytes: &[u8]) -> Outcome {
    match serde_json::from_slice::<ErrorEnvelope>(bytes) {
        Ok(envelope) => Outcome::ValidationFailed(ValidationErrorSet::from_api_errors(
            &envelope.errors,
        )),
        Err(e) => Outcome::TransportError(TransportFailure::MalformedBody(e.to_string())),
    }
}

// ── Tests ────────────────────────────────────────────────────────
