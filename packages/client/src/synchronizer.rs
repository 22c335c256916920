//! # NoteListSynchronizer
//!
//! Keeps the local note list in step with the signed-in user's note index.
//!
//! [`start`](NoteListSynchronizer::start) subscribes to the index and spawns
//! a push loop. Each push is resolved by fetching every referenced note
//! concurrently; ids that no longer resolve or belong to someone else are
//! dropped, the rest is sorted and folded into [`WorkspaceState`]. A push
//! whose resolution fails is reported and skipped as a whole. Pushes that
//! queue up while one is being resolved are coalesced into the newest.
//!
//! [`stop`](NoteListSynchronizer::stop) cancels the subscription
//! synchronously and bumps the session generation, so resolutions that
//! finish afterwards are discarded.
//!
//! [`WorkspaceState`]: crate::state::WorkspaceState

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use store::models::sort_by_recency;
use store::{NewNote, Note, NoteId, NoteStore, StoreError, UserId, UserNoteEntry};
use tokio::sync::mpsc;

use crate::config::ReconnectPolicy;
use crate::notifications::LogLevel;
use crate::state::{Core, TokenCondition};
use crate::{lock, ClientError};

type IndexPush = Result<Vec<UserNoteEntry>, StoreError>;

/// Fetch the notes an index snapshot refers to, most recent first.
pub(crate) async fn resolve_entries<S: NoteStore>(
    store: &S,
    user_id: &UserId,
    entries: &[UserNoteEntry],
) -> Result<Vec<Note>, StoreError> {
    let mut seen = HashSet::new();
    let ids: Vec<&NoteId> = entries
        .iter()
        .map(|e| &e.note_id)
        .filter(|id| seen.insert(*id))
        .collect();

    let resolved = join_all(ids.iter().map(|id| store.get_note(id))).await;

    let mut notes = Vec::with_capacity(resolved.len());
    for (id, note) in ids.iter().zip(resolved) {
        match note? {
            Some(note) if &note.user_id == user_id => notes.push(note),
            Some(_) => tracing::warn!(note_id = %id, "index entry points at another user's note"),
            None => tracing::debug!(note_id = %id, "index entry without a note"),
        }
    }
    sort_by_recency(&mut notes);
    Ok(notes)
}

pub struct NoteListSynchronizer<S> {
    core: Arc<Core<S>>,
}

impl<S> Clone for NoteListSynchronizer<S> {
    fn clone(&self) -> Self {
        Self {
            core: self.core.clone(),
        }
    }
}

impl<S: NoteStore> NoteListSynchronizer<S> {
    pub(crate) fn new(core: Arc<Core<S>>) -> Self {
        Self { core }
    }

    /// Begin synchronising the notes of `user_id`. Any previous session is
    /// stopped first. Must be called from within a Tokio runtime.
    pub fn start(&self, user_id: UserId) -> Result<(), ClientError> {
        self.stop();
        let generation = self.core.mutate(|s| {
            s.user = Some(user_id.clone());
            s.generation
        });
        tracing::info!(%user_id, generation, "starting note synchronisation");

        let rx = self
            .subscribe(&user_id, generation)
            .map_err(|e| self.core.fail("failed to subscribe to notes", e))?;
        if let Some(rx) = rx {
            tokio::spawn(self.clone().run(user_id, generation, rx));
        }
        Ok(())
    }

    /// Cancel the subscription and clear the list, selection and edit session.
    pub fn stop(&self) {
        let subscription = {
            let mut slot = lock(&self.core.subscription);
            self.core.mutate(|s| s.reset());
            slot.take()
        };
        if let Some(subscription) = subscription {
            tracing::info!("stopped note synchronisation");
            subscription.cancel();
        }
    }

    pub fn is_running(&self) -> bool {
        lock(&self.core.subscription).is_some()
    }

    pub fn notes(&self) -> Vec<Note> {
        self.core.read(|s| s.notes.clone())
    }

    pub fn selected(&self) -> Option<Note> {
        self.core.read(|s| s.selected.get().cloned())
    }

    /// Subscribe to the index and install the subscription, unless the
    /// session ended meanwhile.
    fn subscribe(
        &self,
        user_id: &UserId,
        generation: u64,
    ) -> Result<Option<mpsc::UnboundedReceiver<IndexPush>>, StoreError> {
        let (tx, rx) = mpsc::unbounded_channel();
        let subscription = self.core.store.subscribe_user_index(
            user_id,
            Box::new(move |push| {
                let _ = tx.send(push);
            }),
        )?;

        let mut slot = lock(&self.core.subscription);
        if !self.core.is_current(generation) {
            drop(slot);
            subscription.cancel();
            return Ok(None);
        }
        let previous = slot.replace(subscription);
        drop(slot);
        if let Some(previous) = previous {
            previous.cancel();
        }
        Ok(Some(rx))
    }

    async fn run(
        self,
        user_id: UserId,
        generation: u64,
        mut rx: mpsc::UnboundedReceiver<IndexPush>,
    ) {
        while let Some(mut push) = rx.recv().await {
            while push.is_ok() {
                match rx.try_recv() {
                    Ok(next) => push = next,
                    Err(_) => break,
                }
            }
            if !self.core.is_current(generation) {
                return;
            }
            match push {
                Ok(entries) => self.resolve_and_apply(&user_id, generation, &entries).await,
                Err(err) => match self.reconnect(&user_id, generation, err).await {
                    Some(next) => rx = next,
                    None => return,
                },
            }
        }
        tracing::debug!(generation, "push loop finished");
    }

    async fn resolve_and_apply(&self, user_id: &UserId, generation: u64, entries: &[UserNoteEntry]) {
        match resolve_entries(self.core.store.as_ref(), user_id, entries).await {
            Ok(notes) => {
                self.core.mutate_if(|s| {
                    if s.generation != generation {
                        return ((), false);
                    }
                    let outcome = s.apply_push(notes);
                    ((), outcome.is_visible())
                });
                self.confirm_creates(generation).await;
            }
            Err(err) => {
                if self.core.is_current(generation) {
                    self.core.fail("failed to load notes", err);
                }
            }
        }
    }

    async fn reconnect(
        &self,
        user_id: &UserId,
        generation: u64,
        err: StoreError,
    ) -> Option<mpsc::UnboundedReceiver<IndexPush>> {
        self.core.fail("live updates interrupted", err);
        let ReconnectPolicy::Retry {
            max_attempts,
            delay_ms,
        } = self.core.config.subscription.reconnect
        else {
            return None;
        };

        for attempt in 1..=max_attempts {
            tokio::time::sleep(Duration::from_millis(delay_ms)).await;
            if !self.core.is_current(generation) {
                return None;
            }
            match self.subscribe(user_id, generation) {
                Ok(Some(rx)) => {
                    tracing::info!(attempt, "resubscribed to note index");
                    self.core.report(LogLevel::Info, "live updates restored");
                    return Some(rx);
                }
                Ok(None) => return None,
                Err(err) => tracing::warn!(attempt, %err, "resubscribe failed"),
            }
        }
        self.core.report(
            LogLevel::Error,
            "live updates stopped, refresh to reload notes",
        );
        None
    }

    /// Close create tokens whose note is already gone from the store. A push
    /// containing such a note may have been coalesced away or never sent.
    async fn confirm_creates(&self, generation: u64) {
        let unconfirmed = self.core.read(|s| {
            if s.generation == generation {
                s.unconfirmed_creates()
            } else {
                Vec::new()
            }
        });
        for id in unconfirmed {
            match self.core.store.get_note(&id).await {
                Ok(None) => {
                    tracing::debug!(note_id = %id, "created note is gone");
                    self.core.mutate_current(generation, |s| s.forget_created(&id));
                }
                Ok(Some(_)) => {}
                Err(err) => tracing::debug!(note_id = %id, %err, "could not confirm created note"),
            }
        }
    }

    /// Make `id` the selected note.
    pub fn select(&self, id: &NoteId) -> Result<(), ClientError> {
        let result = self.core.mutate_if(|s| {
            if s.edit.session().is_some_and(|e| &e.note_id != id) {
                return (Err(ClientError::EditInProgress), false);
            }
            match s.note(id).cloned() {
                Some(note) => {
                    let changed = s.selected.set(Some(note));
                    (Ok(()), changed)
                }
                None => (Err(StoreError::note_not_found(id).into()), false),
            }
        });
        result.map_err(|e| self.core.fail("cannot open note", e))
    }

    /// Create a note with the configured defaults and select it.
    pub async fn create_note(&self) -> Result<Note, ClientError> {
        let started = self.core.mutate_if(|s| {
            if s.edit.is_active() {
                return (Err(ClientError::EditInProgress), false);
            }
            let Some(user_id) = s.user.clone() else {
                return (Err(ClientError::NotSignedIn), false);
            };
            let token = s.open_token(TokenCondition::Pending);
            (Ok((user_id, s.generation, token)), false)
        });
        let (user_id, generation, token) =
            started.map_err(|e| self.core.fail("cannot create note", e))?;

        let defaults = &self.core.config.notes;
        let draft = NewNote::new(
            defaults.default_title.clone(),
            defaults.default_content.clone(),
        );
        match self.core.store.create_note(draft, &user_id).await {
            Ok(note) => {
                self.core.mutate_current(generation, |s| {
                    s.record_created(note.clone());
                    s.resolve_token(token, TokenCondition::Presence(note.id.clone()));
                });
                self.confirm_creates(generation).await;
                tracing::debug!(note_id = %note.id, "created note");
                self.core.report(LogLevel::Success, "note created");
                Ok(note)
            }
            Err(err) => {
                self.core.mutate_current(generation, |s| {
                    s.close_token(token);
                });
                Err(self.core.fail("failed to create note", err))
            }
        }
    }

    /// Delete a note and its index entry. When it was selected, the most
    /// recently updated remaining note is selected instead.
    pub async fn delete_note(&self, id: &NoteId) -> Result<(), ClientError> {
        let _gate = self.core.write_gate.lock().await;
        let started = self.core.mutate_if(|s| {
            let Some(user_id) = s.user.clone() else {
                return (Err(ClientError::NotSignedIn), false);
            };
            if s.note(id).is_none() {
                return (Err(StoreError::note_not_found(id).into()), false);
            }
            let token = s.open_token(TokenCondition::Absence(id.clone()));
            s.begin_delete(id);
            (Ok((user_id, s.generation, token)), true)
        });
        let (user_id, generation, token) =
            started.map_err(|e| self.core.fail("cannot delete note", e))?;

        match self.core.store.delete_note(id, &user_id).await {
            Ok(()) => {
                tracing::debug!(note_id = %id, "deleted note");
                self.core.report(LogLevel::Success, "note deleted");
                Ok(())
            }
            // Already gone; the next push closes the token.
            Err(err) if err.is_not_found() => Err(self.core.fail("cannot delete note", err)),
            Err(err) => {
                self.core.mutate_current(generation, |s| {
                    s.abort_delete(id);
                    s.close_token(token);
                });
                Err(self.core.fail("failed to delete note", err))
            }
        }
    }

    /// Reload the list with a point-in-time read instead of waiting for a
    /// push.
    pub async fn refresh(&self) -> Result<(), ClientError> {
        let (user_id, generation) = self
            .core
            .read(|s| s.user.clone().map(|u| (u, s.generation)))
            .ok_or(ClientError::NotSignedIn)?;
        let notes = self
            .core
            .store
            .get_user_notes(&user_id)
            .await
            .map_err(|e| self.core.fail("failed to refresh notes", e))?;
        self.core.mutate_if(|s| {
            if s.generation != generation {
                return ((), false);
            }
            let outcome = s.apply_push(notes);
            ((), outcome.is_visible())
        });
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ClientConfig;
    use store::{MemoryStore, NewNote, NotePatch};

    async fn setup() -> (Arc<MemoryStore>, UserId, NoteListSynchronizer<MemoryStore>) {
        let store = Arc::new(MemoryStore::new());
        let user_id = store.create_user("alice", "password").await.unwrap();
        let core = Arc::new(Core::new(store.clone(), ClientConfig::default()));
        (store, user_id, NoteListSynchronizer::new(core))
    }

    async fn settle() {
        for _ in 0..20 {
            tokio::task::yield_now().await;
        }
    }

    #[tokio::test]
    async fn test_resolve_entries_filters_and_sorts() {
        let (store, alice, _) = setup().await;
        let bob = store.create_user("bob", "password").await.unwrap();
        let older = store.create_note(NewNote::new("older", ""), &alice).await.unwrap();
        let newer = store.create_note(NewNote::new("newer", ""), &alice).await.unwrap();
        let foreign = store.create_note(NewNote::new("bob's", ""), &bob).await.unwrap();

        let entry = |note: &Note| UserNoteEntry {
            note_id: note.id.clone(),
            created_at: note.created_at,
        };
        let missing = UserNoteEntry {
            note_id: NoteId::from("missing"),
            created_at: older.created_at,
        };
        let entries = vec![entry(&older), entry(&newer), entry(&older), entry(&foreign), missing];

        let notes = resolve_entries(store.as_ref(), &alice, &entries).await.unwrap();
        let ids: Vec<&NoteId> = notes.iter().map(|n| &n.id).collect();
        assert_eq!(ids, vec![&newer.id, &older.id]);
    }

    #[tokio::test]
    async fn test_resolve_entries_fails_as_a_whole() {
        let (store, alice, _) = setup().await;
        let note = store.create_note(NewNote::new("t", ""), &alice).await.unwrap();
        let entries = vec![UserNoteEntry {
            note_id: note.id.clone(),
            created_at: note.created_at,
        }];
        store.set_offline(true);
        assert!(resolve_entries(store.as_ref(), &alice, &entries).await.is_err());
    }

    #[tokio::test]
    async fn test_start_loads_existing_notes() {
        let (store, alice, sync) = setup().await;
        let first = store.create_note(NewNote::new("first", ""), &alice).await.unwrap();
        let second = store.create_note(NewNote::new("second", ""), &alice).await.unwrap();

        sync.start(alice.clone()).unwrap();
        settle().await;

        let notes = sync.notes();
        assert_eq!(notes.len(), 2);
        assert_eq!(notes[0].id, second.id);
        assert_eq!(sync.selected().unwrap().id, second.id);

        store.update_note(&first.id, NotePatch::title("bumped")).await.unwrap();
        settle().await;
        assert_eq!(sync.notes()[0].id, first.id);
        assert_eq!(sync.selected().unwrap().id, second.id);
    }

    #[tokio::test]
    async fn test_stop_cancels_and_clears() {
        let (store, alice, sync) = setup().await;
        store.create_note(NewNote::new("n", ""), &alice).await.unwrap();
        sync.start(alice.clone()).unwrap();
        settle().await;
        assert_eq!(sync.notes().len(), 1);

        sync.stop();
        assert!(!sync.is_running());
        assert_eq!(store.subscription_count(), 0);
        store.create_note(NewNote::new("late", ""), &alice).await.unwrap();
        settle().await;

        assert!(sync.notes().is_empty());
        assert!(sync.selected().is_none());
    }

    #[tokio::test]
    async fn test_select_unknown_note() {
        let (_store, alice, sync) = setup().await;
        sync.start(alice).unwrap();
        settle().await;

        let err = sync.select(&NoteId::from("nope")).unwrap_err();
        assert!(err.is_not_found());
        let message = sync.core.read(|s| s.notifications.last().unwrap().message.clone());
        assert_eq!(message, "cannot open note: note was not found");
    }

    #[tokio::test]
    async fn test_create_deleted_elsewhere_before_its_push() {
        let (store, alice, sync) = setup().await;
        sync.start(alice.clone()).unwrap();
        settle().await;

        let created = sync.create_note().await.unwrap();
        store.delete_note(&created.id, &alice).await.unwrap();
        settle().await;

        assert_eq!(sync.core.read(|s| s.open_tokens()), 0);
        assert!(sync.notes().is_empty());
        assert!(sync.selected().is_none());

        let later = store.create_note(NewNote::new("later", ""), &alice).await.unwrap();
        settle().await;
        assert_eq!(sync.selected().unwrap().id, later.id);
    }

    #[tokio::test]
    async fn test_create_requires_sign_in() {
        let (_store, _alice, sync) = setup().await;
        assert!(matches!(
            sync.create_note().await,
            Err(ClientError::NotSignedIn)
        ));
        assert_eq!(sync.core.read(|s| s.open_tokens()), 0);
    }
}
