//! Application-wide handle.
//!
//! One [`AppContext`] is built at startup and cloned into every consumer
//! (screens, the CLI, the Android bridge). It owns the shared session
//! manager, the anonymous bootstrapper and the notification sink, and picks
//! which view tree to render.

use crate::anonymous::{AnonymousBootstrapper, AnonymousToken};
use crate::api::ApiClient;
use crate::auth::AuthClient;
use crate::bootstrap::{AppBootstrap, Readiness};
use crate::config::Config;
use crate::notify::{NoticeKind, Notifier};
use crate::session::{AuthForm, SessionManager, SessionState, User};
use crate::store::{KeyValueStore, SessionStore};
use std::sync::Arc;
use tokio::sync::watch;

pub const SIGN_OUT_NOTICE: &str = "You have been successfully signed out.";

/// Which top-level view tree to show.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RootView {
    /// Startup has not finished.
    Loading,
    /// Signed out: sign-in / sign-up screen.
    Authentication,
    /// Signed in: main tabs.
    Main,
}

#[derive(Clone)]
pub struct AppContext {
    api: ApiClient,
    sessions: Arc<SessionManager>,
    anonymous: Arc<AnonymousBootstrapper>,
    notifier: Arc<dyn Notifier>,
    readiness: Readiness,
    skip_loading_screen: bool,
}

impl AppContext {
    /// Build the context and its startup sequencer from configuration.
    pub fn assemble(
        config: &Config,
        notifier: Arc<dyn Notifier>,
    ) -> anyhow::Result<(Self, AppBootstrap)> {
        let api = ApiClient::new(&config.api)?;
        let store = config.open_store()?;
        tracing::debug!(backend = store.name(), root = api.root(), "Assembling app context");
        Ok(Self::with_parts(
            api,
            store,
            notifier,
            config.skip_loading_screen,
        ))
    }

    /// Build from already-constructed collaborators.
    pub fn with_parts(
        api: ApiClient,
        store: Arc<dyn KeyValueStore>,
        notifier: Arc<dyn Notifier>,
        skip_loading_screen: bool,
    ) -> (Self, AppBootstrap) {
        let store = SessionStore::new(store);
        let anonymous = Arc::new(AnonymousBootstrapper::new(api.clone(), store.clone()));
        let sessions = Arc::new(SessionManager::new(AuthClient::new(api.clone()), store));
        let bootstrap = AppBootstrap::new(anonymous.clone(), sessions.clone());

        let context = Self {
            api,
            sessions,
            anonymous,
            notifier,
            readiness: bootstrap.readiness(),
            skip_loading_screen,
        };
        (context, bootstrap)
    }

    pub fn api(&self) -> &ApiClient {
        &self.api
    }

    pub fn sessions(&self) -> &Arc<SessionManager> {
        &self.sessions
    }

    pub fn session_state(&self) -> SessionState {
        self.sessions.state()
    }

    pub fn subscribe(&self) -> watch::Receiver<SessionState> {
        self.sessions.subscribe()
    }

    pub fn user(&self) -> Option<User> {
        self.sessions.state().user().cloned()
    }

    pub fn anonymous_token(&self) -> Option<AnonymousToken> {
        self.anonymous.current()
    }

    pub fn authorization_header(&self) -> String {
        self.sessions.authorization_header()
    }

    /// A fresh authentication screen controller.
    pub fn auth_form(&self) -> AuthForm {
        AuthForm::new(self.sessions.clone(), self.notifier.clone())
    }

    /// Sign out and tell the user.
    pub async fn sign_out(&self) {
        self.sessions.logout().await;
        self.notifier.notify(SIGN_OUT_NOTICE, NoticeKind::Success);
    }

    pub fn is_ready(&self) -> bool {
        self.skip_loading_screen || self.readiness.is_ready()
    }

    pub fn root_view(&self) -> RootView {
        if !self.is_ready() {
            return RootView::Loading;
        }
        if self.sessions.state().is_authenticated() {
            RootView::Main
        } else {
            RootView::Authentication
        }
    }
}
