#![forbid(unsafe_code)]

//! MoA Session Android Bridge
//!
//! UniFFI bindings over the session core for Kotlin/Android. The app creates
//! one [`SessionController`] per process, calls `bootstrap()` behind the
//! splash screen, then drives the authentication screen through it.
//!
//! Calls block on a process-global runtime; invoke them off the main thread.

use moa_session::config::{ApiConfig, Config, StorageBackend, PRODUCTION_API_ROOT};
use moa_session::notify::RecordingNotifier;
use moa_session::session::SubmitError;
use moa_session::{
    AppBootstrap, AppContext, AuthForm, Field, Outcome, RootView, SessionState, User,
};
use std::path::PathBuf;
use std::sync::{Arc, OnceLock};
use tokio::runtime::Runtime;

uniffi::setup_scaffolding!();

/// Global runtime for async operations
static RUNTIME: OnceLock<Runtime> = OnceLock::new();

fn runtime() -> Result<&'static Runtime, SessionBridgeError> {
    if let Some(rt) = RUNTIME.get() {
        return Ok(rt);
    }
    let rt = tokio::runtime::Builder::new_multi_thread()
        .worker_threads(2)
        .enable_all()
        .build()
        .map_err(|e| SessionBridgeError::Runtime {
            message: e.to_string(),
        })?;
    Ok(RUNTIME.get_or_init(|| rt))
}

/// Signed-in user as seen from Kotlin.
#[derive(Debug, Clone, PartialEq, uniffi::Record)]
pub struct BridgeUser {
    pub username: String,
    pub email: String,
    /// Remaining server attributes as a JSON object string.
    pub extra_json: String,
}

impl From<&User> for BridgeUser {
    fn from(user: &User) -> Self {
        Self {
            username: user.username.clone(),
            email: user.email.clone(),
            extra_json: serde_json::to_string(&user.extra).unwrap_or_else(|_| "{}".into()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, uniffi::Enum)]
pub enum BridgeSessionState {
    SignedOut,
    SignedIn { user: BridgeUser },
}

impl From<&SessionState> for BridgeSessionState {
    fn from(state: &SessionState) -> Self {
        match state.user() {
            Some(user) => Self::SignedIn { user: user.into() },
            None => Self::SignedOut,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, uniffi::Enum)]
pub enum BridgeField {
    Username,
    Email,
    Password,
}

impl From<BridgeField> for Field {
    fn from(field: BridgeField) -> Self {
        match field {
            BridgeField::Username => Field::Username,
            BridgeField::Email => Field::Email,
            BridgeField::Password => Field::Password,
        }
    }
}

impl From<Field> for BridgeField {
    fn from(field: Field) -> Self {
        match field {
            Field::Username => BridgeField::Username,
            Field::Email => BridgeField::Email,
            Field::Password => BridgeField::Password,
        }
    }
}

#[derive(Debug, Clone, PartialEq, uniffi::Record)]
pub struct BridgeFieldError {
    pub field: BridgeField,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, uniffi::Enum)]
pub enum BridgeOutcome {
    Success { user: BridgeUser },
    ValidationFailed { errors: Vec<BridgeFieldError> },
    InvalidCredentials,
    TransportError { message: String },
}

impl From<&Outcome> for BridgeOutcome {
    fn from(outcome: &Outcome) -> Self {
        match outcome {
            Outcome::Success(session) => Self::Success {
                user: session.user().into(),
            },
            Outcome::ValidationFailed(errors) => Self::ValidationFailed {
                errors: errors
                    .iter()
                    .map(|(field, message)| BridgeFieldError {
                        field: field.into(),
                        message: message.to_string(),
                    })
                    .collect(),
            },
            Outcome::InvalidCredentials => Self::InvalidCredentials,
            Outcome::TransportError(failure) => Self::TransportError {
                message: failure.to_string(),
            },
        }
    }
}

/// Flash message for the host to display.
#[derive(Debug, Clone, PartialEq, uniffi::Record)]
pub struct BridgeNotice {
    pub message: String,
    /// "success" | "error" | "info"
    pub kind: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, uniffi::Enum)]
pub enum BridgeRootView {
    Loading,
    Authentication,
    Main,
}

impl From<RootView> for BridgeRootView {
    fn from(view: RootView) -> Self {
        match view {
            RootView::Loading => Self::Loading,
            RootView::Authentication => Self::Authentication,
            RootView::Main => Self::Main,
        }
    }
}

/// Session controller exposed to Android
#[derive(uniffi::Object)]
pub struct SessionController {
    ctx: AppContext,
    bootstrap: AppBootstrap,
    form: AuthForm,
    notices: Arc<RecordingNotifier>,
}

#[uniffi::export]
impl SessionController {
    /// Open device storage under `data_dir` and talk to `api_root`
    /// (production when `None`).
    #[uniffi::constructor]
    pub fn new(data_dir: String, api_root: Option<String>) -> Result<Arc<Self>, SessionBridgeError> {
        moa_session::logging::init(Some("moa_session=info"));

        let config = Config {
            api: ApiConfig {
                root: api_root.unwrap_or_else(|| PRODUCTION_API_ROOT.to_string()),
                ..ApiConfig::default()
            },
            data_dir: PathBuf::from(data_dir),
            ..Config::default()
        };
        Self::from_config(&config)
    }

    /// In-memory storage; nothing survives the process.
    #[uniffi::constructor]
    pub fn ephemeral(api_root: String) -> Result<Arc<Self>, SessionBridgeError> {
        let mut config = Config {
            api: ApiConfig {
                root: api_root,
                ..ApiConfig::default()
            },
            ..Config::default()
        };
        config.storage.backend = StorageBackend::Memory;
        Self::from_config(&config)
    }

    /// Run startup once; later calls return the same state.
    pub fn bootstrap(&self) -> Result<BridgeSessionState, SessionBridgeError> {
        let ready = runtime()?.block_on(self.bootstrap.run());
        Ok((&ready.session).into())
    }

    pub fn is_ready(&self) -> bool {
        self.ctx.is_ready()
    }

    pub fn root_view(&self) -> BridgeRootView {
        self.ctx.root_view().into()
    }

    pub fn state(&self) -> BridgeSessionState {
        (&self.ctx.session_state()).into()
    }

    pub fn anonymous_token(&self) -> Option<String> {
        self.ctx.anonymous_token().map(|t| t.into_inner())
    }

    pub fn authorization_header(&self) -> String {
        self.ctx.authorization_header()
    }

    pub fn image_url(&self, path: String) -> String {
        self.ctx.api().image_url(&path)
    }

    /// Sign in. Rejected with `SubmissionPending` while another sign-in or
    /// sign-up is in flight.
    pub fn sign_in(&self, email: String, password: String) -> Result<BridgeOutcome, SessionBridgeError> {
        let result = runtime()?.block_on(self.form.submit_sign_in(email, password));
        into_bridge_outcome(result)
    }

    pub fn sign_up(
        &self,
        username: String,
        email: String,
        password: String,
    ) -> Result<BridgeOutcome, SessionBridgeError> {
        let result = runtime()?.block_on(self.form.submit_sign_up(username, email, password));
        into_bridge_outcome(result)
    }

    pub fn sign_out(&self) -> Result<(), SessionBridgeError> {
        runtime()?.block_on(self.ctx.sign_out());
        Ok(())
    }

    /// Error line under a form field, empty when there is none.
    pub fn field_error(&self, field: BridgeField) -> String {
        self.form.field_error(field.into())
    }

    pub fn is_submitting(&self) -> bool {
        self.form.is_pending()
    }

    /// Drain queued flash messages.
    pub fn take_notices(&self) -> Vec<BridgeNotice> {
        self.notices
            .take()
            .into_iter()
            .map(|n| BridgeNotice {
                message: n.message,
                kind: n.kind.as_str().to_string(),
            })
            .collect()
    }
}

impl SessionController {
    fn from_config(config: &Config) -> Result<Arc<Self>, SessionBridgeError> {
        let notices = Arc::new(RecordingNotifier::new());
        let (ctx, bootstrap) =
            AppContext::assemble(config, notices.clone()).map_err(|e| SessionBridgeError::Config {
                message: format!("{e:#}"),
            })?;
        let form = ctx.auth_form();

        Ok(Arc::new(Self {
            ctx,
            bootstrap,
            form,
            notices,
        }))
    }
}

fn into_bridge_outcome(
    result: Result<Outcome, SubmitError>,
) -> Result<BridgeOutcome, SessionBridgeError> {
    match result {
        Ok(outcome) => Ok((&outcome).into()),
        Err(SubmitError::Pending) => Err(SessionBridgeError::SubmissionPending),
    }
}

/// Errors that can occur in the bridge
#[derive(Debug, Clone, uniffi::Error)]
pub enum SessionBridgeError {
    Config { message: String },
    Runtime { message: String },
    SubmissionPending,
}

impl std::fmt::Display for SessionBridgeError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Config { message } => write!(f, "Config error: {}", message),
            Self::Runtime { message } => write!(f, "Runtime error: {}", message),
            Self::SubmissionPending => write!(f, "A submission is already in progress"),
        }
    }
}

impl std::error::Error for SessionBridgeError {}
