//! Client-side state layer for live-synchronised Markdown notes.
//!
//! Keeps an in-memory note list and the note being edited consistent with a
//! [`store::NoteStore`] push stream while the user types, switches notes,
//! deletes and autosaves. [`NotesWorkspace`] is the entry point.

pub mod auth;
pub mod autosave;
pub mod config;
pub mod edit_mode;
pub mod filter;
pub mod notifications;
pub mod selected_note;
pub mod state;
pub mod synchronizer;
pub mod workspace;

mod error;

pub use auth::{AuthSession, FileSessionStorage, MemorySessionStorage, SessionStorage};
pub use config::{ClientConfig, ReconnectPolicy};
pub use error::ClientError;
pub use notifications::{LogLevel, Notification};
pub use workspace::{NoteStats, NoteView, NotesWorkspace};

use std::sync::{Mutex, MutexGuard};

/// Lock a mutex, recovering the guard if a panicking thread poisoned it.
pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}
