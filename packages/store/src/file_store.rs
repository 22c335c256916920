//! # File-backed NoteStore
//!
//! [`FileStore`] puts a [`MemoryStore`] in front of a directory of JSON
//! records, so the desktop app keeps accounts and notes across restarts.
//! Reads and subscriptions are served from memory. Every successful write is
//! then mirrored to disk.
//!
//! ## Layout
//!
//! ```text
//! <base_dir>/
//! ├── users/
//! │   └── <user_id>.json
//! └── notes/
//!     └── <note_id>.json
//! ```
//!
//! The per-user index is not written; [`FileStore::open`] rebuilds it from
//! the notes. Records are replaced through a temporary file and a rename.
//!
//! A record that fails to parse is skipped with a warning. A write that does
//! not reach disk fails with [`StoreError::Transient`] even though memory
//! already holds the change; the next write of the same note rewrites it.
//!
//! ## Platform data directories
//!
//! [`FileStore::default_location`] resolves to `<data_dir>/notes/store`:
//!
//! | Platform | Path |
//! |----------|------|
//! | macOS | `~/Library/Application Support/notes/store` |
//! | Linux | `~/.local/share/notes/store` |
//! | Windows | `C:\Users\<user>\AppData\Roaming\notes\store` |

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::models::{NewNote, Note, NoteId, NotePatch, User, UserId, UserNoteEntry};
use crate::note_store::{NoteStore, PushHandler, Subscription};
use crate::{MemoryStore, StoreError};

const USERS: &str = "users";
const NOTES: &str = "notes";

fn io_error(path: &Path, err: io::Error) -> StoreError {
    StoreError::Transient(format!("{}: {err}", path.display()))
}

fn read_records<T: DeserializeOwned>(dir: &Path) -> Result<Vec<T>, StoreError> {
    let mut records = Vec::new();
    for entry in fs::read_dir(dir).map_err(|e| io_error(dir, e))? {
        let path = entry.map_err(|e| io_error(dir, e))?.path();
        if path.extension().and_then(|ext| ext.to_str()) != Some("json") {
            continue;
        }
        let parsed = fs::read(&path)
            .map_err(|e| e.to_string())
            .and_then(|bytes| serde_json::from_slice(&bytes).map_err(|e| e.to_string()));
        match parsed {
            Ok(record) => records.push(record),
            Err(err) => tracing::warn!(path = %path.display(), %err, "skipping unreadable record"),
        }
    }
    Ok(records)
}

/// Filesystem-backed NoteStore for the desktop app.
#[derive(Clone)]
pub struct FileStore {
    inner: MemoryStore,
    base: Option<PathBuf>,
}

impl FileStore {
    /// Load every record under `base`, creating the directories if needed.
    pub fn open(base: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let base = base.into();
        for dir in [USERS, NOTES] {
            let path = base.join(dir);
            fs::create_dir_all(&path).map_err(|e| io_error(&path, e))?;
        }
        let users: Vec<User> = read_records(&base.join(USERS))?;
        let notes: Vec<Note> = read_records(&base.join(NOTES))?;
        tracing::info!(
            path = %base.display(),
            users = users.len(),
            notes = notes.len(),
            "opened note store"
        );
        Ok(Self {
            inner: MemoryStore::restore(users, notes),
            base: Some(base),
        })
    }

    /// A store that writes nothing, for when no data directory is usable.
    pub fn detached() -> Self {
        Self {
            inner: MemoryStore::new(),
            base: None,
        }
    }

    pub fn default_location() -> Option<PathBuf> {
        dirs::data_dir().map(|dir| dir.join("notes").join("store"))
    }

    pub fn is_persistent(&self) -> bool {
        self.base.is_some()
    }

    fn record_path(&self, dir: &str, id: &str) -> Option<PathBuf> {
        self.base
            .as_ref()
            .map(|base| base.join(dir).join(format!("{id}.json")))
    }

    fn write_record<T: Serialize>(&self, dir: &str, id: &str, record: &T) -> Result<(), StoreError> {
        let Some(path) = self.record_path(dir, id) else {
            return Ok(());
        };
        let json = serde_json::to_vec_pretty(record)
            .map_err(|e| StoreError::Transient(format!("{}: {e}", path.display())))?;
        let staging = path.with_extension("json.tmp");
        fs::write(&staging, json)
            .and_then(|()| fs::rename(&staging, &path))
            .map_err(|e| io_error(&path, e))
    }

    fn remove_record(&self, dir: &str, id: &str) -> Result<(), StoreError> {
        let Some(path) = self.record_path(dir, id) else {
            return Ok(());
        };
        match fs::remove_file(&path) {
            Err(err) if err.kind() != io::ErrorKind::NotFound => Err(io_error(&path, err)),
            _ => Ok(()),
        }
    }
}

impl NoteStore for FileStore {
    async fn create_user(&self, login: &str, password: &str) -> Result<UserId, StoreError> {
        let user_id = self.inner.create_user(login, password).await?;
        if let Some(user) = self.inner.get_user(&user_id).await? {
            self.write_record(USERS, user_id.as_str(), &user)?;
        }
        Ok(user_id)
    }

    async fn get_user(&self, user_id: &UserId) -> Result<Option<User>, StoreError> {
        self.inner.get_user(user_id).await
    }

    async fn get_user_by_login(&self, login: &str) -> Result<Option<User>, StoreError> {
        self.inner.get_user_by_login(login).await
    }

    async fn authenticate(&self, login: &str, password: &str) -> Result<Option<User>, StoreError> {
        self.inner.authenticate(login, password).await
    }

    async fn create_note(&self, note: NewNote, user_id: &UserId) -> Result<Note, StoreError> {
        let note = self.inner.create_note(note, user_id).await?;
        self.write_record(NOTES, note.id.as_str(), &note)?;
        Ok(note)
    }

    async fn get_note(&self, note_id: &NoteId) -> Result<Option<Note>, StoreError> {
        self.inner.get_note(note_id).await
    }

    async fn get_user_notes(&self, user_id: &UserId) -> Result<Vec<Note>, StoreError> {
        self.inner.get_user_notes(user_id).await
    }

    async fn update_note(&self, note_id: &NoteId, patch: NotePatch) -> Result<Note, StoreError> {
        let note = self.inner.update_note(note_id, patch).await?;
        self.write_record(NOTES, note.id.as_str(), &note)?;
        Ok(note)
    }

    async fn delete_note(&self, note_id: &NoteId, user_id: &UserId) -> Result<(), StoreError> {
        self.inner.delete_note(note_id, user_id).await?;
        self.remove_record(NOTES, note_id.as_str())
    }

    fn subscribe_user_index(
        &self,
        user_id: &UserId,
        handler: PushHandler<Vec<UserNoteEntry>>,
    ) -> Result<Subscription, StoreError> {
        self.inner.subscribe_user_index(user_id, handler)
    }

    fn subscribe_user_notes(
        &self,
        user_id: &UserId,
        handler: PushHandler<Vec<Note>>,
    ) -> Result<Subscription, StoreError> {
        self.inner.subscribe_user_notes(user_id, handler)
    }

    fn subscribe_note(
        &self,
        note_id: &NoteId,
        handler: PushHandler<Option<Note>>,
    ) -> Result<Subscription, StoreError> {
        self.inner.subscribe_note(note_id, handler)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_notes_survive_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::open(dir.path()).unwrap();
        let uid = store.create_user("alice", "password").await.unwrap();
        let kept = store.create_note(NewNote::new("kept", "a"), &uid).await.unwrap();
        let gone = store.create_note(NewNote::new("gone", "b"), &uid).await.unwrap();
        let edited = store.update_note(&kept.id, NotePatch::content("edited")).await.unwrap();
        store.delete_note(&gone.id, &uid).await.unwrap();
        drop(store);

        let store = FileStore::open(dir.path()).unwrap();
        let alice = store.authenticate("alice", "password").await.unwrap().unwrap();
        assert_eq!(alice.id, uid);
        let notes = store.get_user_notes(&uid).await.unwrap();
        assert_eq!(notes, vec![edited.clone()]);
        assert!(!dir.path().join(NOTES).join(format!("{}.json", gone.id)).exists());

        let later = store.update_note(&kept.id, NotePatch::title("later")).await.unwrap();
        assert!(later.updated_at > edited.updated_at);
    }

    #[tokio::test]
    async fn test_unreadable_record_is_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::open(dir.path()).unwrap();
        let uid = store.create_user("alice", "password").await.unwrap();
        store.create_note(NewNote::new("ok", ""), &uid).await.unwrap();
        fs::write(dir.path().join(NOTES).join("broken.json"), b"{not json").unwrap();
        fs::write(dir.path().join(NOTES).join("stray.json.tmp"), b"{}").unwrap();

        let store = FileStore::open(dir.path()).unwrap();
        assert_eq!(store.get_user_notes(&uid).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_detached_store_writes_nothing() {
        let store = FileStore::detached();
        assert!(!store.is_persistent());
        let uid = store.create_user("alice", "password").await.unwrap();
        let note = store.create_note(NewNote::new("t", ""), &uid).await.unwrap();
        store.delete_note(&note.id, &uid).await.unwrap();
        assert!(store.get_user_notes(&uid).await.unwrap().is_empty());
    }
}
