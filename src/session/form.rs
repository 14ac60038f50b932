//! Sign-in / sign-up form controller.
//!
//! Holds the non-visual state of the authentication screen: mode, inputs,
//! per-field errors and the pending flag. A screen binds its inputs to the
//! setters, calls [`AuthForm::submit`], then reads [`AuthForm::field_error`]
//! for each error line.
//!
//! Field errors are cleared at the start of every submission, so a corrected
//! resubmission never shows stale messages.

use super::{SessionManager, SubmitResult};
use crate::auth::{Field, Outcome, ValidationErrorSet};
use crate::notify::{NoticeKind, Notifier};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

pub const SIGN_UP_SUCCESS: &str = "Sign up and signed in success!";
pub const SIGN_IN_SUCCESS: &str = "Signed in success!";
pub const SIGN_IN_FAILURE: &str = "Signed in failure. Please check your email and password.";
pub const GENERIC_FAILURE: &str = "Sorry something went wrong.";
pub const NOT_PERSISTED: &str = "Signed in, but the session could not be saved on this device.";

/// Which exchange a submit performs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FormMode {
    #[default]
    SignIn,
    SignUp,
}

/// Why a submit was not attempted.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SubmitError {
    #[error("a submission is already in progress")]
    Pending,
}

#[derive(Debug, Default)]
struct FormState {
    mode: FormMode,
    username: String,
    email: String,
    password: String,
    errors: ValidationErrorSet,
}

/// Authentication screen state.
pub struct AuthForm {
    sessions: Arc<SessionManager>,
    notifier: Arc<dyn Notifier>,
    state: Mutex<FormState>,
    pending: AtomicBool,
}

/// Clears the pending flag however the submission ends.
struct PendingGuard<'a>(&'a AtomicBool);

impl Drop for PendingGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

impl AuthForm {
    pub fn new(sessions: Arc<SessionManager>, notifier: Arc<dyn Notifier>) -> Self {
        Self {
            sessions,
            notifier,
            state: Mutex::new(FormState::default()),
            pending: AtomicBool::new(false),
        }
    }

    pub fn mode(&self) -> FormMode {
        self.state.lock().mode
    }

    /// Switch between sign-in and sign-up. Switching to sign-in clears field errors.
    pub fn set_mode(&self, mode: FormMode) {
        let mut state = self.state.lock();
        if mode == FormMode::SignIn {
            state.errors.clear();
        }
        state.mode = mode;
    }

    pub fn set_username(&self, value: impl Into<String>) {
        self.state.lock().username = value.into();
    }

    pub fn set_email(&self, value: impl Into<String>) {
        self.state.lock().email = value.into();
    }

    pub fn set_password(&self, value: impl Into<String>) {
        self.state.lock().password = value.into();
    }

    pub fn email(&self) -> String {
        self.state.lock().email.clone()
    }

    /// Whether a submission is in flight; the screen shows "Submitting".
    pub fn is_pending(&self) -> bool {
        self.pending.load(Ordering::SeqCst)
    }

    /// Error line for a field, `""` when there is none.
    pub fn field_error(&self, field: Field) -> String {
        self.state
            .lock()
            .errors
            .get(field)
            .unwrap_or_default()
            .to_string()
    }

    pub fn errors(&self) -> ValidationErrorSet {
        self.state.lock().errors.clone()
    }

    /// Submit the current inputs.
    ///
    /// Rejected with [`SubmitError::Pending`] while a previous submission is
    /// still running.
    pub async fn submit(&self) -> Result<Outcome, SubmitError> {
        let _pending = self.claim()?;
        Ok(self.execute().await)
    }

    /// Switch to sign-in, fill the inputs and submit them as one step.
    ///
    /// While another submission is pending the call is rejected and the
    /// inputs are left as they were.
    pub async fn submit_sign_in(
        &self,
        email: impl Into<String>,
        password: impl Into<String>,
    ) -> Result<Outcome, SubmitError> {
        let _pending = self.claim()?;
        {
            let mut state = self.state.lock();
            state.mode = FormMode::SignIn;
            state.email = email.into();
            state.password = password.into();
        }
        Ok(self.execute().await)
    }

    /// Sign-up counterpart of [`AuthForm::submit_sign_in`].
    pub async fn submit_sign_up(
        &self,
        username: impl Into<String>,
        email: impl Into<String>,
        password: impl Into<String>,
    ) -> Result<Outcome, SubmitError> {
        let _pending = self.claim()?;
        {
            let mut state = self.state.lock();
            state.mode = FormMode::SignUp;
            state.username = username.into();
            state.email = email.into();
            state.password = password.into();
        }
        Ok(self.execute().await)
    }

    fn claim(&self) -> Result<PendingGuard<'_>, SubmitError> {
        if self.pending.swap(true, Ordering::SeqCst) {
            return Err(SubmitError::Pending);
        }
        Ok(PendingGuard(&self.pending))
    }

    async fn execute(&self) -> Outcome {
        let (mode, username, email, password) = {
            let mut state = self.state.lock();
            state.errors.clear();
            (
                state.mode,
                state.username.clone(),
                state.email.clone(),
                state.password.clone(),
            )
        };

        let result = match mode {
            FormMode::SignIn => self.sessions.login(&email, &password).await,
            FormMode::SignUp => self.sessions.sign_up(&username, &email, &password).await,
        };

        self.apply(mode, &result);
        result.into_outcome()
    }

    fn apply(&self, mode: FormMode, result: &SubmitResult) {
        match &result.outcome {
            Outcome::Success(_) => {
                let message = match mode {
                    FormMode::SignUp => SIGN_UP_SUCCESS,
                    FormMode::SignIn => SIGN_IN_SUCCESS,
                };
                self.notifier.notify(message, NoticeKind::Success);
                if result.persist_error.is_some() {
                    self.notifier.notify(NOT_PERSISTED, NoticeKind::Error);
                }
            }
            Outcome::ValidationFailed(errors) => {
                self.state.lock().errors = errors.clone();
            }
            Outcome::InvalidCredentials => {
                self.notifier.notify(SIGN_IN_FAILURE, NoticeKind::Error);
            }
            Outcome::TransportError(failure) => {
                tracing::warn!("Authentication submission failed: {failure}");
                self.notifier.notify(GENERIC_FAILURE, NoticeKind::Error);
            }
        }
    }
}

// ── Tests ────────────────────────────────────────────────────────
