//! Error taxonomy shared by every [`crate::NoteStore`] implementation.

use thiserror::Error;

/// Failure of a store operation.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    /// A note or user that the operation needs does not exist.
    #[error("{kind} not found: {id}")]
    NotFound { kind: &'static str, id: String },

    /// The login is already registered.
    #[error("login is already taken: {0}")]
    Conflict(String),

    /// Credentials did not match. Never says whether the login or the
    /// password was wrong.
    #[error("invalid login or password")]
    Unauthorized,

    /// Network or backend failure on a read, write or subscription.
    #[error("store unavailable: {0}")]
    Transient(String),
}

impl StoreError {
    pub fn note_not_found(id: impl ToString) -> Self {
        Self::NotFound {
            kind: "note",
            id: id.to_string(),
        }
    }

    pub fn user_not_found(id: impl ToString) -> Self {
        Self::NotFound {
            kind: "user",
            id: id.to_string(),
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }

    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Transient(_))
    }
}
