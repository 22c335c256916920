//! # Domain models for users, notes and the per-user note index
//!
//! These are the records exchanged with a [`crate::NoteStore`]. They are
//! `Serialize + Deserialize` so any backend can persist them as-is, and
//! `PartialEq` so the client can diff successive pushes field by field.
//!
//! ## Types
//!
//! | Struct | Represents |
//! |--------|-----------|
//! | [`User`] | An account. `login` is unique per store; `password_hash` is an Argon2id PHC string. Users are never updated after creation. |
//! | [`Note`] | A Markdown note owned by exactly one user. `updated_at >= created_at` always holds and every title/content write bumps `updated_at`. |
//! | [`UserNoteEntry`] | One entry of a user's note index: the id of a note the user owns plus its creation time. Index and note collection are kept as duals by the store. |
//! | [`NewNote`] | Title and content of a note about to be created. |
//! | [`NotePatch`] | A partial update: `None` fields are left untouched. |
//!
//! Identifiers are thin newtypes over the string ids the store hands out
//! ([`UserId`], [`NoteId`]) so the two can never be mixed up.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Identifier of a [`User`].
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(pub String);

/// Identifier of a [`Note`].
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NoteId(pub String);

impl UserId {
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl NoteId {
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl fmt::Display for NoteId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for NoteId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

/// A registered account.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct User {
    pub id: UserId,
    pub login: String,
    /// Argon2id hash in PHC format, never the plaintext password.
    pub password_hash: String,
    pub created_at: DateTime<Utc>,
}

/// A Markdown note.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Note {
    pub id: NoteId,
    pub title: String,
    pub content: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub user_id: UserId,
}

impl Note {
    /// True when title, content or `updated_at` differ. Ownership and
    /// creation time never change, so they are not compared.
    pub fn differs_from(&self, other: &Note) -> bool {
        self.title != other.title
            || self.content != other.content
            || self.updated_at != other.updated_at
    }
}

/// An entry of a user's note index.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct UserNoteEntry {
    pub note_id: NoteId,
    pub created_at: DateTime<Utc>,
}

/// Fields of a note about to be created.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct NewNote {
    pub title: String,
    pub content: String,
}

impl NewNote {
    pub fn new(title: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            content: content.into(),
        }
    }
}

/// Partial update of a note. `None` leaves the field unchanged.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct NotePatch {
    pub title: Option<String>,
    pub content: Option<String>,
}

impl NotePatch {
    pub fn title(title: impl Into<String>) -> Self {
        Self {
            title: Some(title.into()),
            content: None,
        }
    }

    pub fn content(content: impl Into<String>) -> Self {
        Self {
            title: None,
            content: Some(content.into()),
        }
    }

    /// Builder method to also set the title.
    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    pub fn is_empty(&self) -> bool {
        self.title.is_none() && self.content.is_none()
    }
}

/// Sort notes most recently updated first. Ties are broken by id so the
/// order is stable across pushes.
pub fn sort_by_recency(notes: &mut [Note]) {
    notes.sort_by(|a, b| {
        b.updated_at
            .cmp(&a.updated_at)
            .then_with(|| a.id.cmp(&b.id))
    });
}
