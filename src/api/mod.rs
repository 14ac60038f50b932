//! HTTP plumbing shared by the anonymous-token and authentication exchanges.
//!
//! Provides:
//! - Base URL handling (the production root historically carries a trailing slash)
//! - A shared `reqwest` client with a request timeout
//! - The `Authorization` header format expected by authenticated endpoints
//! - Asset URL construction for server-relative image paths

use crate::config::ApiConfig;
use crate::session::AuthenticatedSession;
use serde::Serialize;
use std::time::Duration;

/// Shared HTTP client bound to one API root.
#[derive(Debug, Clone)]
pub struct ApiClient {
    root: String,
    http: reqwest::Client,
}

impl ApiClient {
    /// Create a client for the configured API root.
    pub fn new(config: &ApiConfig) -> anyhow::Result<Self> {
        let root = config.root.trim().trim_end_matches('/').to_string();
        if root.is_empty() {
            anyhow::bail!("api.root cannot be empty");
        }

        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs.max(1)))
            .build()?;

        Ok(Self { root, http })
    }

    /// API root without trailing slash.
    pub fn root(&self) -> &str {
        &self.root
    }

    /// Absolute URL for an API path.
    pub fn url(&self, path: &str) -> String {
        format!("{}/{}", self.root, path.trim_start_matches('/'))
    }

    /// Absolute URL for a server-relative asset path.
    pub fn image_url(&self, path: &str) -> String {
        self.url(path)
    }

    /// POST a JSON body to an API path.
    pub fn post_json<T: Serialize + ?Sized>(&self, path: &str, body: &T) -> reqwest::RequestBuilder {
        self.http
            .post(self.url(path))
            .header(reqwest::header::CONTENT_TYPE, "application/json")
            .json(body)
    }

    /// POST with an empty body to an API path.
    pub fn post_empty(&self, path: &str) -> reqwest::RequestBuilder {
        self.http.post(self.url(path))
    }
}

/// `Authorization` header value for requests made on behalf of a session.
///
/// Empty when nobody is signed in.
pub fn authorization_header(session: Option<&AuthenticatedSession>) -> String {
    match session {
        Some(session) => format!(
            "Token token={}, email={}",
            session.credential(),
            session.user().email
        ),
        None => String::new(),
    }
}

// ── Tests ────────────────────────────────────────────────────────
