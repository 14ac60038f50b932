//! One-time startup sequencing.
//!
//! Runs the independent startup steps concurrently and waits for every one
//! of them to settle before flipping readiness:
//! - presentation resources (fonts, splash assets) via [`ResourceLoader`]
//! - initial route state (deep links) via [`RouteResolver`]
//! - anonymous device token
//! - persisted session restore
//!
//! No step can block readiness. Resource and route failures are logged and
//! the app starts without them; the token and session steps never fail.

use crate::anonymous::{AnonymousBootstrapper, AnonymousToken};
use crate::session::{SessionManager, SessionState};
use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::{watch, OnceCell};

/// Opaque navigation state handed back to the router unchanged.
#[derive(Debug, Clone, PartialEq)]
pub struct InitialRoute(serde_json::Value);

impl InitialRoute {
    pub fn new(state: serde_json::Value) -> Self {
        Self(state)
    }

    pub fn as_value(&self) -> &serde_json::Value {
        &self.0
    }

    pub fn into_value(self) -> serde_json::Value {
        self.0
    }
}

/// Loads presentation resources before first render.
#[async_trait]
pub trait ResourceLoader: Send + Sync {
    async fn load(&self) -> anyhow::Result<()>;
}

/// Resolves the navigation state to start from.
#[async_trait]
pub trait RouteResolver: Send + Sync {
    async fn initial_route(&self) -> anyhow::Result<Option<InitialRoute>>;
}

/// Nothing to preload.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoResources;

#[async_trait]
impl ResourceLoader for NoResources {
    async fn load(&self) -> anyhow::Result<()> {
        Ok(())
    }
}

/// Always start from the default route.
#[derive(Debug, Default, Clone, Copy)]
pub struct DefaultRoute;

#[async_trait]
impl RouteResolver for DefaultRoute {
    async fn initial_route(&self) -> anyhow::Result<Option<InitialRoute>> {
        Ok(None)
    }
}

/// Everything the first render needs.
#[derive(Debug, Clone, PartialEq)]
pub struct ReadyState {
    pub anonymous_token: Option<AnonymousToken>,
    pub session: SessionState,
    pub initial_route: Option<InitialRoute>,
    pub resources_loaded: bool,
}

/// Read side of the readiness flag.
#[derive(Debug, Clone)]
pub struct Readiness(watch::Receiver<bool>);

impl Readiness {
    /// A handle that reports ready immediately.
    pub fn ready() -> Self {
        let (_tx, rx) = watch::channel(true);
        Self(rx)
    }

    pub fn is_ready(&self) -> bool {
        *self.0.borrow()
    }

    /// Wait until startup has finished. Returns `false` if the sequencer was
    /// dropped before it completed.
    pub async fn wait(&mut self) -> bool {
        self.0.wait_for(|ready| *ready).await.is_ok()
    }
}

/// Startup orchestrator. [`AppBootstrap::run`] executes its steps once per
/// instance; later calls return the first result.
pub struct AppBootstrap {
    anonymous: Arc<AnonymousBootstrapper>,
    sessions: Arc<SessionManager>,
    resources: Arc<dyn ResourceLoader>,
    routes: Arc<dyn RouteResolver>,
    ready: watch::Sender<bool>,
    result: OnceCell<ReadyState>,
}

impl AppBootstrap {
    pub fn new(anonymous: Arc<AnonymousBootstrapper>, sessions: Arc<SessionManager>) -> Self {
        let (ready, _) = watch::channel(false);
        Self {
            anonymous,
            sessions,
            resources: Arc::new(NoResources),
            routes: Arc::new(DefaultRoute),
            ready,
            result: OnceCell::new(),
        }
    }

    pub fn with_resources(mut self, resources: Arc<dyn ResourceLoader>) -> Self {
        self.resources = resources;
        self
    }

    pub fn with_routes(mut self, routes: Arc<dyn RouteResolver>) -> Self {
        self.routes = routes;
        self
    }

    pub fn readiness(&self) -> Readiness {
        Readiness(self.ready.subscribe())
    }

    pub fn is_ready(&self) -> bool {
        *self.ready.borrow()
    }

    /// Run startup and flip readiness.
    pub async fn run(&self) -> ReadyState {
        self.result.get_or_init(|| self.execute()).await.clone()
    }

    async fn execute(&self) -> ReadyState {
        tracing::debug!("Bootstrap started");

        let (resources, route, anonymous_token, session) = tokio::join!(
            self.resources.load(),
            self.routes.initial_route(),
            self.anonymous.ensure_anonymous_token(),
            self.sessions.restore(),
        );

        let resources_loaded = match resources {
            Ok(()) => true,
            Err(e) => {
                tracing::warn!("Resource loading failed, continuing: {e:#}");
                false
            }
        };

        let initial_route = route.unwrap_or_else(|e| {
            tracing::warn!("Initial route resolution failed, using default: {e:#}");
            None
        });

        if anonymous_token.is_none() {
            tracing::warn!("Starting without an anonymous token");
        }

        self.ready.send_replace(true);
        tracing::info!(
            authenticated = session.is_authenticated(),
            anonymous = anonymous_token.is_some(),
            "Bootstrap complete"
        );

        ReadyState {
            anonymous_token,
            session,
            initial_route,
            resources_loaded,
        }
    }
}

// ── Tests ────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::ApiClient;
    use crate::auth::AuthClient;
    use crate::config::ApiConfig;
    use crate::store::{MemoryStore, SessionStore};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    struct FailingResources;

    #[async_trait]
    impl ResourceLoader for FailingResources {
        async fn load(&self) -> anyhow::Result<()> {
            anyhow::bail!("font missing")
        }
    }

    #[derive(Default)]
    struct CountingRoutes {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl RouteResolver for CountingRoutes {
        async fn initial_route(&self) -> anyhow::Result<Option<InitialRoute>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(Some(InitialRoute::new(serde_json::json!({"routes": [{"name": "Root"}]}))))
        }
    }

    fn bootstrap_for(server: &MockServer) -> AppBootstrap {
        let api = ApiClient::new(&ApiConfig {
            root: server.uri(),
            timeout_secs: 5,
        })
        .unwrap();
        let store = SessionStore::new(Arc::new(MemoryStore::new()));
        let anonymous = Arc::new(AnonymousBootstrapper::new(api.clone(), store.clone()));
        let sessions = Arc::new(SessionManager::new(AuthClient::new(api), store));
        AppBootstrap::new(anonymous, sessions)
    }

    #[tokio::test]
    async fn failures_do_not_block_readiness() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/anonymous_tokens"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let boot = bootstrap_for(&server).with_resources(Arc::new(FailingResources));
        let mut readiness = boot.readiness();
        assert!(!readiness.is_ready());

        let state = boot.run().await;
        assert!(readiness.wait().await);
        assert!(boot.is_ready());
        assert!(!state.resources_loaded);
        assert!(state.anonymous_token.is_none());
        assert_eq!(state.session, SessionState::Unauthenticated);
    }

    #[tokio::test]
    async fn run_executes_once_and_passes_route_through() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/anonymous_tokens"))
            .respond_with(
                ResponseTemplate::new(201).set_body_json(serde_json::json!({"token": "anon"})),
            )
            .expect(1)
            .mount(&server)
            .await;

        let routes = Arc::new(CountingRoutes::default());
        let boot = bootstrap_for(&server).with_routes(routes.clone());

        let first = boot.run().await;
        let second = boot.run().await;

        assert_eq!(first, second);
        assert_eq!(routes.calls.load(Ordering::SeqCst), 1);
        assert!(first.resources_loaded);
        assert_eq!(
            first.initial_route.unwrap().as_value()["routes"][0]["name"],
            "Root"
        );
        assert_eq!(first.anonymous_token.unwrap().as_str(), "anon");
    }

    #[tokio::test]
    async fn waiting_before_run_resolves_after_completion() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/anonymous_tokens"))
            .respond_with(
                ResponseTemplate::new(201).set_body_json(serde_json::json!({"token": "anon"})),
            )
            .mount(&server)
            .await;

        let boot = bootstrap_for(&server);
        let mut readiness = boot.readiness();

        let (ready, state) = tokio::join!(readiness.wait(), boot.run());
        assert!(ready);
        assert!(state.anonymous_token.is_some());
    }

    #[test]
    fn ready_handle_reports_ready() {
        assert!(Readiness::ready().is_ready());
    }
}
