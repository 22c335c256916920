//! # NoteStore - the abstract remote store
//!
//! The client never talks to a concrete database. Everything it needs from the
//! backend goes through the [`NoteStore`] trait, so the same synchronisation
//! logic works against the in-process [`crate::MemoryStore`] or any
//! push-capable remote backend.
//!
//! ## Operations
//!
//! | Method | Description |
//! |--------|-------------|
//! | [`create_user`](NoteStore::create_user) | Registers a login. Fails with [`StoreError::Conflict`] if it exists; callers pre-check with [`get_user_by_login`](NoteStore::get_user_by_login) because the store does not promise an atomic check. |
//! | [`get_user`](NoteStore::get_user) / [`get_user_by_login`](NoteStore::get_user_by_login) | Point lookups. |
//! | [`authenticate`](NoteStore::authenticate) | Returns the user when the password matches, `None` otherwise. |
//! | [`create_note`](NoteStore::create_note) | Writes the note and its index entry as one unit and returns the stored record. |
//! | [`get_note`](NoteStore::get_note) / [`get_user_notes`](NoteStore::get_user_notes) | Point-in-time reads. |
//! | [`update_note`](NoteStore::update_note) | Applies a [`NotePatch`], bumps `updated_at`, returns the stored record. [`StoreError::NotFound`] if absent. |
//! | [`delete_note`](NoteStore::delete_note) | Removes the note and its index entry as one unit. |
//!
//! ## Subscriptions
//!
//! `subscribe_*` methods register a [`PushHandler`] and return a
//! [`Subscription`]. The handler receives the current value right away and
//! then every change. A dropped channel is delivered once as
//! `Err(StoreError::Transient)`; the subscription is dead afterwards.
//!
//! [`Subscription::cancel`] is synchronous: once it returns, the handler is
//! never invoked again, including for pushes the backend had already
//! produced. Dropping a [`Subscription`] cancels it too.
//!
//! Handlers run on the store's delivery path and must not call back into the
//! store or cancel their own subscription; forward the value to a channel.

use std::future::Future;

use crate::models::{NewNote, Note, NoteId, NotePatch, User, UserId, UserNoteEntry};
use crate::StoreError;

/// Callback invoked for each push of a subscription.
pub type PushHandler<T> = Box<dyn FnMut(Result<T, StoreError>) + Send + 'static>;

/// Async interface to the remote note/user store.
pub trait NoteStore: Send + Sync + 'static {
    fn create_user(
        &self,
        login: &str,
        password: &str,
    ) -> impl Future<Output = Result<UserId, StoreError>> + Send;

    fn get_user(
        &self,
        user_id: &UserId,
    ) -> impl Future<Output = Result<Option<User>, StoreError>> + Send;

    fn get_user_by_login(
        &self,
        login: &str,
    ) -> impl Future<Output = Result<Option<User>, StoreError>> + Send;

    fn authenticate(
        &self,
        login: &str,
        password: &str,
    ) -> impl Future<Output = Result<Option<User>, StoreError>> + Send;

    fn create_note(
        &self,
        note: NewNote,
        user_id: &UserId,
    ) -> impl Future<Output = Result<Note, StoreError>> + Send;

    fn get_note(
        &self,
        note_id: &NoteId,
    ) -> impl Future<Output = Result<Option<Note>, StoreError>> + Send;

    fn get_user_notes(
        &self,
        user_id: &UserId,
    ) -> impl Future<Output = Result<Vec<Note>, StoreError>> + Send;

    fn update_note(
        &self,
        note_id: &NoteId,
        patch: NotePatch,
    ) -> impl Future<Output = Result<Note, StoreError>> + Send;

    fn delete_note(
        &self,
        note_id: &NoteId,
        user_id: &UserId,
    ) -> impl Future<Output = Result<(), StoreError>> + Send;

    /// Subscribe to a user's note index.
    fn subscribe_user_index(
        &self,
        user_id: &UserId,
        handler: PushHandler<Vec<UserNoteEntry>>,
    ) -> Result<Subscription, StoreError>;

    /// Subscribe to a user's notes, resolved and sorted most recent first.
    fn subscribe_user_notes(
        &self,
        user_id: &UserId,
        handler: PushHandler<Vec<Note>>,
    ) -> Result<Subscription, StoreError>;

    /// Subscribe to a single note; `None` once it is deleted.
    fn subscribe_note(
        &self,
        note_id: &NoteId,
        handler: PushHandler<Option<Note>>,
    ) -> Result<Subscription, StoreError>;
}

/// Handle to a live subscription. Cancels on drop.
#[must_use = "dropping a Subscription cancels it"]
pub struct Subscription {
    cancel: Option<Box<dyn FnOnce() + Send>>,
}

impl Subscription {
    /// Wrap the backend-specific cancellation routine. It must stop handler
    /// invocations before returning.
    pub fn new(cancel: impl FnOnce() + Send + 'static) -> Self {
        Self {
            cancel: Some(Box::new(cancel)),
        }
    }

    /// Stop delivery. No handler call happens after this returns.
    pub fn cancel(mut self) {
        self.run_cancel();
    }

    fn run_cancel(&mut self) {
        if let Some(cancel) = self.cancel.take() {
            cancel();
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.run_cancel();
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("active", &self.cancel.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[test]
    fn test_cancel_runs_once() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        let sub = Subscription::new(move || {
            counter.fetch_add(1, Ordering::SeqCst);
        });
        sub.cancel();
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_drop_cancels() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        {
            let _sub = Subscription::new(move || {
                counter.fetch_add(1, Ordering::SeqCst);
            });
        }
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
