//! # In-memory NoteStore
//!
//! [`MemoryStore`] keeps users, notes and the per-user note index in process
//! memory and pushes every change to its subscribers. It is the backend used
//! by tests and by the desktop shell when no remote store is configured.
//!
//! ## Guarantees
//!
//! - Index and note collection are duals: `create_note` and `delete_note`
//!   update both inside one critical section.
//! - Timestamps are strictly increasing across the whole store, so a write
//!   always advances `updated_at` even within one clock tick.
//! - Pushes are delivered in mutation order. Every mutation holds the publish
//!   lock until its pushes are handed to the subscribers.
//! - Index subscribers are notified when the index changes and when any note
//!   in it is updated.
//!
//! ## Test hooks
//!
//! [`set_offline`](MemoryStore::set_offline) makes every operation fail with
//! [`StoreError::Transient`], [`drop_subscriptions`](MemoryStore::drop_subscriptions)
//! simulates a dropped push channel, and [`update_count`](MemoryStore::update_count)
//! counts successful note updates.

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use chrono::{DateTime, Duration, Utc};

use crate::models::{sort_by_recency, NewNote, Note, NoteId, NotePatch, User, UserId, UserNoteEntry};
use crate::note_store::{NoteStore, PushHandler, Subscription};
use crate::password::{hash_password, verify_absent, verify_password};
use crate::StoreError;

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// In-memory NoteStore for testing and desktop fallback.
#[derive(Clone, Default)]
pub struct MemoryStore {
    tables: Arc<Mutex<Tables>>,
    subscribers: Arc<Mutex<Subscribers>>,
    publish: Arc<Mutex<()>>,
    offline: Arc<AtomicBool>,
    updates: Arc<AtomicUsize>,
}

#[derive(Default)]
struct Tables {
    users: HashMap<UserId, User>,
    notes: HashMap<NoteId, Note>,
    user_notes: HashMap<UserId, BTreeMap<u64, UserNoteEntry>>,
    next_index_key: u64,
    last_stamp: Option<DateTime<Utc>>,
}

impl Tables {
    fn next_stamp(&mut self) -> DateTime<Utc> {
        let now = Utc::now();
        let stamp = match self.last_stamp {
            Some(last) if now <= last => last + Duration::microseconds(1),
            _ => now,
        };
        self.last_stamp = Some(stamp);
        stamp
    }

    fn user_by_login(&self, login: &str) -> Option<&User> {
        self.users.values().find(|u| u.login == login)
    }

    fn index(&self, user_id: &UserId) -> Vec<UserNoteEntry> {
        self.user_notes
            .get(user_id)
            .map(|entries| entries.values().cloned().collect())
            .unwrap_or_default()
    }

    fn notes_of(&self, user_id: &UserId) -> Vec<Note> {
        let mut notes: Vec<Note> = self
            .index(user_id)
            .iter()
            .filter_map(|entry| self.notes.get(&entry.note_id))
            .filter(|note| &note.user_id == user_id)
            .cloned()
            .collect();
        sort_by_recency(&mut notes);
        notes
    }
}

struct Slot<T> {
    handler: Mutex<Option<PushHandler<T>>>,
}

impl<T> Slot<T> {
    fn new(handler: PushHandler<T>) -> Self {
        Self {
            handler: Mutex::new(Some(handler)),
        }
    }

    fn deliver(&self, value: Result<T, StoreError>) {
        if let Some(handler) = lock(&self.handler).as_mut() {
            handler(value);
        }
    }

    fn close(&self) {
        lock(&self.handler).take();
    }
}

struct Registration<K, T> {
    id: u64,
    key: K,
    slot: Arc<Slot<T>>,
}

#[derive(Default)]
struct Subscribers {
    next_id: u64,
    index: Vec<Registration<UserId, Vec<UserNoteEntry>>>,
    lists: Vec<Registration<UserId, Vec<Note>>>,
    notes: Vec<Registration<NoteId, Option<Note>>>,
}

/// Which subscriptions a mutation touched.
#[derive(Default)]
struct Changes {
    users: Vec<UserId>,
    notes: Vec<NoteId>,
}

fn slots_for<K: PartialEq, T>(registrations: &[Registration<K, T>], key: &K) -> Vec<Arc<Slot<T>>> {
    registrations
        .iter()
        .filter(|r| &r.key == key)
        .map(|r| r.slot.clone())
        .collect()
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// A store holding previously persisted users and notes. The per-user
    /// index is rebuilt from the notes in creation order; notes whose owner
    /// is unknown are dropped.
    pub fn restore(users: Vec<User>, mut notes: Vec<Note>) -> Self {
        let store = Self::new();
        {
            let mut tables = lock(&store.tables);
            tables.last_stamp = users
                .iter()
                .map(|u| u.created_at)
                .chain(notes.iter().map(|n| n.updated_at))
                .max();
            for user in users {
                tables.users.insert(user.id.clone(), user);
            }
            notes.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)));
            for note in notes {
                if !tables.users.contains_key(&note.user_id) {
                    tracing::warn!(note_id = %note.id, user_id = %note.user_id, "dropping note of unknown user");
                    continue;
                }
                let key = tables.next_index_key;
                tables.next_index_key += 1;
                tables.user_notes.entry(note.user_id.clone()).or_default().insert(
                    key,
                    UserNoteEntry {
                        note_id: note.id.clone(),
                        created_at: note.created_at,
                    },
                );
                tables.notes.insert(note.id.clone(), note);
            }
        }
        store
    }

    /// Make every subsequent operation fail with [`StoreError::Transient`].
    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    /// Number of successful `update_note` calls so far.
    pub fn update_count(&self) -> usize {
        self.updates.load(Ordering::SeqCst)
    }

    /// Number of live subscriptions of every kind.
    pub fn subscription_count(&self) -> usize {
        let subs = lock(&self.subscribers);
        subs.index.len() + subs.lists.len() + subs.notes.len()
    }

    /// Simulate a dropped push channel: every subscriber receives one
    /// `Err(Transient)` and is then removed.
    pub fn drop_subscriptions(&self) {
        let _order = lock(&self.publish);
        let (index, lists, notes) = {
            let mut subs = lock(&self.subscribers);
            (
                std::mem::take(&mut subs.index),
                std::mem::take(&mut subs.lists),
                std::mem::take(&mut subs.notes),
            )
        };
        let error = || StoreError::Transient("subscription channel closed".to_string());
        for r in index {
            r.slot.deliver(Err(error()));
        }
        for r in lists {
            r.slot.deliver(Err(error()));
        }
        for r in notes {
            r.slot.deliver(Err(error()));
        }
        tracing::debug!("dropped all subscriptions");
    }

    fn ensure_online(&self) -> Result<(), StoreError> {
        if self.offline.load(Ordering::SeqCst) {
            Err(StoreError::Transient("store is offline".to_string()))
        } else {
            Ok(())
        }
    }

    /// Hand the current snapshots to every subscriber a mutation touched.
    /// Callers hold the publish lock.
    fn deliver(&self, changes: &Changes) {
        let (index, lists, notes) = {
            let subs = lock(&self.subscribers);
            let tables = lock(&self.tables);
            let mut index = Vec::new();
            let mut lists = Vec::new();
            for user_id in &changes.users {
                let entries = tables.index(user_id);
                for slot in slots_for(&subs.index, user_id) {
                    index.push((slot, entries.clone()));
                }
                let user_notes = tables.notes_of(user_id);
                for slot in slots_for(&subs.lists, user_id) {
                    lists.push((slot, user_notes.clone()));
                }
            }
            let mut notes = Vec::new();
            for note_id in &changes.notes {
                let note = tables.notes.get(note_id).cloned();
                for slot in slots_for(&subs.notes, note_id) {
                    notes.push((slot, note.clone()));
                }
            }
            (index, lists, notes)
        };

        for (slot, value) in index {
            slot.deliver(Ok(value));
        }
        for (slot, value) in lists {
            slot.deliver(Ok(value));
        }
        for (slot, value) in notes {
            slot.deliver(Ok(value));
        }
    }

    fn insert_user(&self, login: &str, password_hash: String) -> Result<UserId, StoreError> {
        let mut tables = lock(&self.tables);
        if tables.user_by_login(login).is_some() {
            return Err(StoreError::Conflict(login.to_string()));
        }
        let user = User {
            id: UserId::generate(),
            login: login.to_string(),
            password_hash,
            created_at: tables.next_stamp(),
        };
        let id = user.id.clone();
        tables.users.insert(id.clone(), user);
        Ok(id)
    }

    fn insert_note(&self, new_note: NewNote, user_id: &UserId) -> Result<Note, StoreError> {
        let _order = lock(&self.publish);
        let note = {
            let mut tables = lock(&self.tables);
            if !tables.users.contains_key(user_id) {
                return Err(StoreError::user_not_found(user_id));
            }
            let stamp = tables.next_stamp();
            let note = Note {
                id: NoteId::generate(),
                title: new_note.title,
                content: new_note.content,
                created_at: stamp,
                updated_at: stamp,
                user_id: user_id.clone(),
            };
            let key = tables.next_index_key;
            tables.next_index_key += 1;
            tables.notes.insert(note.id.clone(), note.clone());
            tables.user_notes.entry(user_id.clone()).or_default().insert(
                key,
                UserNoteEntry {
                    note_id: note.id.clone(),
                    created_at: stamp,
                },
            );
            note
        };
        self.deliver(&Changes {
            users: vec![user_id.clone()],
            notes: vec![note.id.clone()],
        });
        Ok(note)
    }

    fn patch_note(&self, note_id: &NoteId, patch: NotePatch) -> Result<Note, StoreError> {
        let _order = lock(&self.publish);
        let note = {
            let mut tables = lock(&self.tables);
            if !tables.notes.contains_key(note_id) {
                return Err(StoreError::note_not_found(note_id));
            }
            if patch.is_empty() {
                return tables
                    .notes
                    .get(note_id)
                    .cloned()
                    .ok_or_else(|| StoreError::note_not_found(note_id));
            }
            let stamp = tables.next_stamp();
            let note = tables
                .notes
                .get_mut(note_id)
                .ok_or_else(|| StoreError::note_not_found(note_id))?;
            if let Some(title) = patch.title {
                note.title = title;
            }
            if let Some(content) = patch.content {
                note.content = content;
            }
            note.updated_at = stamp;
            note.clone()
        };
        self.updates.fetch_add(1, Ordering::SeqCst);
        self.deliver(&Changes {
            users: vec![note.user_id.clone()],
            notes: vec![note.id.clone()],
        });
        Ok(note)
    }

    fn remove_note(&self, note_id: &NoteId, user_id: &UserId) -> Result<(), StoreError> {
        let _order = lock(&self.publish);
        {
            let mut tables = lock(&self.tables);
            let removed_note = tables.notes.remove(note_id).is_some();
            let mut removed_entry = false;
            if let Some(entries) = tables.user_notes.get_mut(user_id) {
                let before = entries.len();
                entries.retain(|_, entry| &entry.note_id != note_id);
                removed_entry = entries.len() != before;
            }
            if !removed_note && !removed_entry {
                return Err(StoreError::note_not_found(note_id));
            }
        }
        self.deliver(&Changes {
            users: vec![user_id.clone()],
            notes: vec![note_id.clone()],
        });
        Ok(())
    }

    fn register<K, T>(
        &self,
        key: K,
        handler: PushHandler<T>,
        pick: fn(&mut Subscribers) -> &mut Vec<Registration<K, T>>,
        initial: impl FnOnce(&Tables) -> T,
    ) -> Result<Subscription, StoreError>
    where
        K: PartialEq + Send + 'static,
        T: Send + 'static,
    {
        self.ensure_online()?;
        let _order = lock(&self.publish);
        let slot = Arc::new(Slot::new(handler));
        let id = {
            let mut subs = lock(&self.subscribers);
            let id = subs.next_id;
            subs.next_id += 1;
            pick(&mut subs).push(Registration {
                id,
                key,
                slot: slot.clone(),
            });
            id
        };

        let value = {
            let tables = lock(&self.tables);
            initial(&*tables)
        };
        slot.deliver(Ok(value));

        let subscribers = self.subscribers.clone();
        Ok(Subscription::new(move || {
            pick(&mut lock(&subscribers)).retain(|r| r.id != id);
            slot.close();
        }))
    }
}

impl NoteStore for MemoryStore {
    async fn create_user(&self, login: &str, password: &str) -> Result<UserId, StoreError> {
        self.ensure_online()?;
        let password_hash = hash_password(password)?;
        self.insert_user(login, password_hash)
    }

    async fn get_user(&self, user_id: &UserId) -> Result<Option<User>, StoreError> {
        self.ensure_online()?;
        Ok(lock(&self.tables).users.get(user_id).cloned())
    }

    async fn get_user_by_login(&self, login: &str) -> Result<Option<User>, StoreError> {
        self.ensure_online()?;
        Ok(lock(&self.tables).user_by_login(login).cloned())
    }

    async fn authenticate(&self, login: &str, password: &str) -> Result<Option<User>, StoreError> {
        self.ensure_online()?;
        let user = lock(&self.tables).user_by_login(login).cloned();
        match user {
            Some(user) if verify_password(password, &user.password_hash)? => Ok(Some(user)),
            Some(_) => Ok(None),
            None => {
                verify_absent(password);
                Ok(None)
            }
        }
    }

    async fn create_note(&self, note: NewNote, user_id: &UserId) -> Result<Note, StoreError> {
        self.ensure_online()?;
        self.insert_note(note, user_id)
    }

    async fn get_note(&self, note_id: &NoteId) -> Result<Option<Note>, StoreError> {
        self.ensure_online()?;
        Ok(lock(&self.tables).notes.get(note_id).cloned())
    }

    async fn get_user_notes(&self, user_id: &UserId) -> Result<Vec<Note>, StoreError> {
        self.ensure_online()?;
        Ok(lock(&self.tables).notes_of(user_id))
    }

    async fn update_note(&self, note_id: &NoteId, patch: NotePatch) -> Result<Note, StoreError> {
        self.ensure_online()?;
        self.patch_note(note_id, patch)
    }

    async fn delete_note(&self, note_id: &NoteId, user_id: &UserId) -> Result<(), StoreError> {
        self.ensure_online()?;
        self.remove_note(note_id, user_id)
    }

    fn subscribe_user_index(
        &self,
        user_id: &UserId,
        handler: PushHandler<Vec<UserNoteEntry>>,
    ) -> Result<Subscription, StoreError> {
        let key = user_id.clone();
        self.register(user_id.clone(), handler, |s| &mut s.index, move |t| t.index(&key))
    }

    fn subscribe_user_notes(
        &self,
        user_id: &UserId,
        handler: PushHandler<Vec<Note>>,
    ) -> Result<Subscription, StoreError> {
        let key = user_id.clone();
        self.register(user_id.clone(), handler, |s| &mut s.lists, move |t| t.notes_of(&key))
    }

    fn subscribe_note(
        &self,
        note_id: &NoteId,
        handler: PushHandler<Option<Note>>,
    ) -> Result<Subscription, StoreError> {
        let key = note_id.clone();
        self.register(note_id.clone(), handler, |s| &mut s.notes, move |t| t.notes.get(&key).cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn collector<T: Send + 'static>() -> (Arc<Mutex<Vec<Result<T, StoreError>>>>, PushHandler<T>) {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        (seen, Box::new(move |value| sink.lock().unwrap().push(value)))
    }

    async fn user(store: &MemoryStore, login: &str) -> UserId {
        store.create_user(login, "password").await.unwrap()
    }

    #[tokio::test]
    async fn test_create_user_and_authenticate() {
        let store = MemoryStore::new();
        let id = user(&store, "alice").await;

        let found = store.get_user_by_login("alice").await.unwrap().unwrap();
        assert_eq!(found.id, id);
        assert_ne!(found.password_hash, "password");
        assert_eq!(store.get_user(&id).await.unwrap().unwrap().login, "alice");

        assert!(store.authenticate("alice", "password").await.unwrap().is_some());
        assert!(store.authenticate("alice", "nope").await.unwrap().is_none());
        assert!(store.authenticate("bob", "password").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_duplicate_login_conflicts() {
        let store = MemoryStore::new();
        user(&store, "alice").await;
        let err = store.create_user("alice", "other").await.unwrap_err();
        assert_eq!(err, StoreError::Conflict("alice".to_string()));
    }

    #[tokio::test]
    async fn test_create_note_writes_note_and_index() {
        let store = MemoryStore::new();
        let uid = user(&store, "alice").await;

        let note = store
            .create_note(NewNote::new("Title", "Body"), &uid)
            .await
            .unwrap();
        assert_eq!(note.created_at, note.updated_at);
        assert_eq!(note.user_id, uid);

        let notes = store.get_user_notes(&uid).await.unwrap();
        assert_eq!(notes.len(), 1);
        assert_eq!(notes[0].id, note.id);
        assert_eq!(notes[0].title, "Title");
        assert_eq!(notes[0].content, "Body");
    }

    #[tokio::test]
    async fn test_create_note_for_unknown_user_fails() {
        let store = MemoryStore::new();
        let err = store
            .create_note(NewNote::new("t", "c"), &UserId("ghost".to_string()))
            .await
            .unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn test_update_bumps_updated_at() {
        let store = MemoryStore::new();
        let uid = user(&store, "alice").await;
        let note = store.create_note(NewNote::new("t", "c"), &uid).await.unwrap();

        let updated = store
            .update_note(&note.id, NotePatch::content("new"))
            .await
            .unwrap();
        assert_eq!(updated.content, "new");
        assert_eq!(updated.title, "t");
        assert!(updated.updated_at > note.updated_at);
        assert_eq!(updated.created_at, note.created_at);
        assert_eq!(store.update_count(), 1);
    }

    #[tokio::test]
    async fn test_update_missing_note_is_not_found() {
        let store = MemoryStore::new();
        let err = store
            .update_note(&NoteId::from("missing"), NotePatch::title("x"))
            .await
            .unwrap_err();
        assert!(err.is_not_found());
        assert_eq!(store.update_count(), 0);
    }

    #[tokio::test]
    async fn test_delete_removes_note_and_index_entry() {
        let store = MemoryStore::new();
        let uid = user(&store, "alice").await;
        let first = store.create_note(NewNote::new("first", ""), &uid).await.unwrap();
        let second = store.create_note(NewNote::new("second", ""), &uid).await.unwrap();

        store.delete_note(&first.id, &uid).await.unwrap();

        assert!(store.get_note(&first.id).await.unwrap().is_none());
        let notes = store.get_user_notes(&uid).await.unwrap();
        assert_eq!(notes.len(), 1);
        assert_eq!(notes[0].id, second.id);

        let err = store.delete_note(&first.id, &uid).await.unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn test_index_subscription_pushes_initial_and_changes() {
        let store = MemoryStore::new();
        let uid = user(&store, "alice").await;
        let (seen, handler) = collector();
        let sub = store.subscribe_user_index(&uid, handler).unwrap();

        let note = store.create_note(NewNote::new("t", "c"), &uid).await.unwrap();
        store.update_note(&note.id, NotePatch::content("x")).await.unwrap();
        store.delete_note(&note.id, &uid).await.unwrap();

        let pushes: Vec<usize> = seen
            .lock()
            .unwrap()
            .iter()
            .map(|p| p.as_ref().unwrap().len())
            .collect();
        // initial, create, update, delete
        assert_eq!(pushes, vec![0, 1, 1, 0]);
        sub.cancel();
    }

    #[tokio::test]
    async fn test_cancel_stops_delivery() {
        let store = MemoryStore::new();
        let uid = user(&store, "alice").await;
        let (seen, handler) = collector();
        let sub = store.subscribe_user_notes(&uid, handler).unwrap();
        assert_eq!(store.subscription_count(), 1);

        sub.cancel();
        assert_eq!(store.subscription_count(), 0);
        store.create_note(NewNote::new("t", "c"), &uid).await.unwrap();

        assert_eq!(seen.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_user_notes_subscription_is_sorted() {
        let store = MemoryStore::new();
        let uid = user(&store, "alice").await;
        let older = store.create_note(NewNote::new("older", ""), &uid).await.unwrap();
        let newer = store.create_note(NewNote::new("newer", ""), &uid).await.unwrap();
        let (seen, handler) = collector();
        let _sub = store.subscribe_user_notes(&uid, handler).unwrap();

        store.update_note(&older.id, NotePatch::title("touched")).await.unwrap();

        let pushes = seen.lock().unwrap();
        let initial = pushes[0].as_ref().unwrap();
        assert_eq!(initial[0].id, newer.id);
        let last = pushes.last().unwrap().as_ref().unwrap();
        assert_eq!(last[0].id, older.id);
        assert_eq!(last[0].title, "touched");
    }

    #[tokio::test]
    async fn test_note_subscription_sees_deletion() {
        let store = MemoryStore::new();
        let uid = user(&store, "alice").await;
        let note = store.create_note(NewNote::new("t", "c"), &uid).await.unwrap();
        let (seen, handler) = collector();
        let _sub = store.subscribe_note(&note.id, handler).unwrap();

        store.delete_note(&note.id, &uid).await.unwrap();

        let pushes = seen.lock().unwrap();
        assert_eq!(pushes.len(), 2);
        assert!(pushes[0].as_ref().unwrap().is_some());
        assert!(pushes[1].as_ref().unwrap().is_none());
    }

    #[tokio::test]
    async fn test_drop_subscriptions_delivers_error() {
        let store = MemoryStore::new();
        let uid = user(&store, "alice").await;
        let (seen, handler) = collector();
        let _sub = store.subscribe_user_index(&uid, handler).unwrap();

        store.drop_subscriptions();
        store.create_note(NewNote::new("t", "c"), &uid).await.unwrap();

        let pushes = seen.lock().unwrap();
        assert_eq!(pushes.len(), 2);
        assert!(pushes[1].as_ref().unwrap_err().is_transient());
        assert_eq!(store.subscription_count(), 0);
    }

    #[tokio::test]
    async fn test_offline_store_fails_transiently() {
        let store = MemoryStore::new();
        let uid = user(&store, "alice").await;
        store.set_offline(true);

        assert!(store.get_user_notes(&uid).await.unwrap_err().is_transient());
        let (_, handler) = collector::<Vec<Note>>();
        assert!(store.subscribe_user_notes(&uid, handler).is_err());

        store.set_offline(false);
        assert!(store.get_user_notes(&uid).await.is_ok());
    }

    #[tokio::test]
    async fn test_restore_rebuilds_index() {
        let source = MemoryStore::new();
        let uid = user(&source, "alice").await;
        let first = source.create_note(NewNote::new("first", ""), &uid).await.unwrap();
        let second = source.create_note(NewNote::new("second", ""), &uid).await.unwrap();
        let alice = source.get_user(&uid).await.unwrap().unwrap();
        let mut orphan = first.clone();
        orphan.id = NoteId::from("orphan");
        orphan.user_id = UserId("ghost".to_string());

        let store = MemoryStore::restore(
            vec![alice],
            vec![second.clone(), orphan, first.clone()],
        );
        let (seen, handler) = collector();
        let _sub = store.subscribe_user_index(&uid, handler).unwrap();
        let index: Vec<NoteId> = seen.lock().unwrap()[0]
            .as_ref()
            .unwrap()
            .iter()
            .map(|e| e.note_id.clone())
            .collect();
        assert_eq!(index, vec![first.id.clone(), second.id.clone()]);
        assert!(store.get_note(&NoteId::from("orphan")).await.unwrap().is_none());

        let updated = store.update_note(&first.id, NotePatch::content("x")).await.unwrap();
        assert!(updated.updated_at > second.updated_at);
        assert!(store.authenticate("alice", "password").await.unwrap().is_some());
    }
}
