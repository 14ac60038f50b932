//! JSON bodies exchanged with the user and anonymous-token endpoints.

use crate::session::{AuthenticatedSession, User};
use serde::{Deserialize, Serialize};

/// Attribute carrying the bearer credential in a session response.
pub const CREDENTIAL_ATTRIBUTE: &str = "authentication_token";

#[derive(Debug, Serialize)]
pub struct SignUpRequest<'a> {
    pub user: SignUpUser<'a>,
}

#[derive(Debug, Serialize)]
pub struct SignUpUser<'a> {
    pub username: &'a str,
    pub email: &'a str,
    pub password: &'a str,
}

#[derive(Debug, Serialize)]
pub struct SignInRequest<'a> {
    pub user: SignInUser<'a>,
}

#[derive(Debug, Serialize)]
pub struct SignInUser<'a> {
    pub email: &'a str,
    pub password: &'a str,
}

/// `201` body of sign-in/sign-up: `{data: {attributes: {...}}}`.
#[derive(Debug, Deserialize)]
pub struct SessionEnvelope {
    pub data: SessionData,
}

#[derive(Debug, Deserialize)]
pub struct SessionData {
    #[serde(default)]
    pub attributes: serde_json::Map<String, serde_json::Value>,
}

impl SessionEnvelope {
    /// Split the attributes into credential, identity and extra profile data.
    ///
    /// `None` when the credential, username or email is missing or empty.
    pub fn into_session(self) -> Option<AuthenticatedSession> {
        let mut attributes = self.data.attributes;
        let credential = take_string(&mut attributes, CREDENTIAL_ATTRIBUTE)?;
        let username = take_string(&mut attributes, "username")?;
        let email = take_string(&mut attributes, "email")?;

        let user = User {
            username,
            email,
            extra: attributes,
        };
        AuthenticatedSession::new(user, credential).ok()
    }
}

fn take_string(
    attributes: &mut serde_json::Map<String, serde_json::Value>,
    key: &str,
) -> Option<String> {
    match attributes.remove(key)? {
        serde_json::Value::String(s) if !s.trim().is_empty() => Some(s),
        _ => None,
    }
}

/// `422` body of sign-up: `{errors: [{source: {pointer}, detail}]}`.
#[derive(Debug, Default, Deserialize)]
pub struct ErrorEnvelope {
    #[serde(default)]
    pub errors: Vec<ApiError>,
}

/// One entry of the error list. Every member may be absent or `null`.
#[derive(Debug, Clone, Deserialize)]
pub struct ApiError {
    #[serde(default)]
    pub source: Option<ErrorSource>,
    #[serde(default)]
    pub detail: Option<String>,
}

impl ApiError {
    /// The error's field pointer, or `""` when the server sent none.
    pub fn pointer(&self) -> &str {
        self.source
            .as_ref()
            .and_then(|s| s.pointer.as_deref())
            .unwrap_or("")
    }

    pub fn detail(&self) -> Option<&str> {
        self.detail.as_deref()
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ErrorSource {
    #[serde(default)]
    pub pointer: Option<String>,
}

/// `201` body of `POST /anonymous_tokens`.
#[derive(Debug, Deserialize)]
pub struct AnonymousTokenResponse {
    #[serde(default)]
    pub token: Option<String>,
}
