use store::StoreError;
use thiserror::Error;

use crate::auth::SessionError;
use crate::notifications::LogLevel;

/// Failure of a client intent.
#[derive(Debug, Error)]
pub enum ClientError {
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("not signed in")]
    NotSignedIn,

    #[error("no note is selected")]
    NoSelection,

    #[error("not in edit mode")]
    NotEditing,

    #[error("nothing to revert")]
    NothingToRevert,

    #[error("finish editing the current note first")]
    EditInProgress,

    #[error("{0}")]
    InvalidInput(String),

    #[error(transparent)]
    Session(#[from] SessionError),
}

impl ClientError {
    /// Message shown to the user. Credentials failures never say whether the
    /// login or the password was wrong.
    pub fn user_message(&self) -> String {
        match self {
            Self::Store(StoreError::NotFound { kind, .. }) => format!("{kind} was not found"),
            Self::Store(StoreError::Conflict(_)) => "login is already taken".to_string(),
            Self::Store(StoreError::Unauthorized) => "invalid login or password".to_string(),
            Self::Store(StoreError::Transient(reason)) => format!("connection problem: {reason}"),
            other => other.to_string(),
        }
    }

    /// Level of the notification raised for this error.
    pub fn level(&self) -> LogLevel {
        match self {
            Self::Store(StoreError::NotFound { .. })
            | Self::InvalidInput(_)
            | Self::EditInProgress => LogLevel::Warning,
            _ => LogLevel::Error,
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::Store(e) if e.is_not_found())
    }
}
