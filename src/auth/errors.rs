//! Field-addressable validation errors.
//!
//! The server reports sign-up validation failures as a list of error
//! objects, each pointing at a request attribute (`/data/attributes/email`).
//! [`Field::from_pointer`] is the total mapping from pointer to form field;
//! pointers outside the known set are ignored.

use super::wire::ApiError;
use std::collections::BTreeMap;

/// Form fields the server can attach an error to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Field {
    Username,
    Email,
    Password,
}

impl Field {
    pub const ALL: [Field; 3] = [Field::Username, Field::Email, Field::Password];

    /// Map a JSON pointer from an error's `source` to a field.
    pub fn from_pointer(pointer: &str) -> Option<Self> {
        match pointer {
            "/data/attributes/username" => Some(Self::Username),
            "/data/attributes/email" => Some(Self::Email),
            "/data/attributes/password" => Some(Self::Password),
            _ => None,
        }
    }

    pub fn pointer(self) -> &'static str {
        match self {
            Self::Username => "/data/attributes/username",
            Self::Email => "/data/attributes/email",
            Self::Password => "/data/attributes/password",
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Username => "username",
            Self::Email => "email",
            Self::Password => "password",
        }
    }
}

impl std::fmt::Display for Field {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// At most one message per field.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ValidationErrorSet {
    messages: BTreeMap<Field, String>,
}

impl ValidationErrorSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build from server error objects. Later errors for the same field
    /// replace earlier ones; errors without a known pointer or a detail are
    /// skipped.
    pub fn from_api_errors<'a>(errors: impl IntoIterator<Item = &'a ApiError>) -> Self {
        let mut set = Self::new();
        for error in errors {
            match (Field::from_pointer(error.pointer()), error.detail()) {
                (Some(field), Some(detail)) => set.insert(field, detail),
                (Some(field), None) => tracing::debug!(
                    field = field.as_str(),
                    "Ignoring validation error without detail"
                ),
                (None, _) => tracing::debug!(
                    pointer = error.pointer(),
                    "Ignoring validation error for unknown field"
                ),
            }
        }
        set
    }

    pub fn insert(&mut self, field: Field, message: impl Into<String>) {
        self.messages.insert(field, message.into());
    }

    pub fn get(&self, field: Field) -> Option<&str> {
        self.messages.get(&field).map(String::as_str)
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn clear(&mut self) {
        self.messages.clear();
    }

    /// Populated fields in declaration order.
    pub fn iter(&self) -> impl Iterator<Item = (Field, &str)> {
        self.messages.iter().map(|(f, m)| (*f, m.as_str()))
    }
}
