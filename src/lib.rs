#![forbid(unsafe_code)]

//! Session and identity core for the MoA mobile client.
//!
//! - [`anonymous`]: per-install anonymous token, minted once
//! - [`auth`]: sign-up / sign-in exchanges mapped to typed outcomes
//! - [`session`]: authoritative signed-in state, mirrored to device storage
//! - [`bootstrap`]: one-time startup sequencing and readiness
//! - [`store`]: durable key/value slots (SQLite on device, memory in tests)
//!
//! [`context::AppContext`] wires these together for a host application.

pub mod anonymous;
pub mod api;
pub mod auth;
pub mod bootstrap;
pub mod config;
pub mod context;
pub mod logging;
pub mod notify;
pub mod session;
pub mod store;

pub use anonymous::{AnonymousBootstrapper, AnonymousToken};
pub use api::ApiClient;
pub use auth::{AuthClient, Field, Outcome, TransportFailure, ValidationErrorSet};
pub use bootstrap::{AppBootstrap, ReadyState, Readiness};
pub use config::Config;
pub use context::{AppContext, RootView};
pub use notify::{Notice, NoticeKind, Notifier};
pub use session::{
    AuthForm, AuthenticatedSession, FormMode, SessionManager, SessionState, SubmitResult, User,
};
pub use store::{KeyValueStore, SessionStore, StorageError, StoreKey};
