//! # AutosaveController
//!
//! Drives the edit session of the selected note.
//!
//! ```text
//! Idle ──enter_edit──▶ Editing ──save / revert──▶ Idle
//!                        │  ▲
//!              keystroke │  │ quiet period elapsed: write draft content
//!                        ▼  │
//!                   debounce task
//! ```
//!
//! Each session owns one debounce task. Keystrokes restart its quiet period;
//! when the period elapses the draft content is written together with the
//! committed title. Titles are committed separately on blur or Enter.
//!
//! Every write goes through the shared write gate, so a save or revert always
//! observes the effect of a debounced write that started before it, and no
//! older write can land after a revert. A failed write is reported and the
//! draft is kept; the next debounce cycle or save retries with the latest
//! draft.

use std::sync::Arc;
use std::time::Duration;

use store::{NoteId, NotePatch, NoteStore};
use tokio::sync::mpsc;

use crate::edit_mode::{EditSession, EditSnapshot};
use crate::notifications::LogLevel;
use crate::state::Core;
use crate::ClientError;

pub struct AutosaveController<S> {
    core: Arc<Core<S>>,
}

impl<S> Clone for AutosaveController<S> {
    fn clone(&self) -> Self {
        Self {
            core: self.core.clone(),
        }
    }
}

async fn debounce<S: NoteStore>(
    controller: AutosaveController<S>,
    session_id: u64,
    mut keystrokes: mpsc::UnboundedReceiver<()>,
    quiet: Duration,
) {
    let mut pending = false;
    loop {
        if pending {
            tokio::select! {
                key = keystrokes.recv() => {
                    if key.is_none() {
                        break;
                    }
                }
                _ = tokio::time::sleep(quiet) => {
                    pending = false;
                    // Failures are reported; the draft waits for the next cycle.
                    let _ = controller.flush_content(session_id).await;
                }
            }
        } else {
            match keystrokes.recv().await {
                Some(()) => pending = true,
                None => break,
            }
        }
    }
    tracing::debug!(session_id, "debounce task finished");
}

impl<S: NoteStore> AutosaveController<S> {
    pub(crate) fn new(core: Arc<Core<S>>) -> Self {
        Self { core }
    }

    /// Enter edit mode for the selected note. A session that is already open
    /// is kept as is. Must be called from within a Tokio runtime.
    pub fn enter_edit(&self) -> Result<(), ClientError> {
        let started = self.core.mutate_if(|s| {
            let Some(note) = s.selected.get().cloned() else {
                return (Err(ClientError::NoSelection), false);
            };
            if s.edit.is_active() {
                return (Ok(None), false);
            }
            let id = s.next_session_id();
            let (tx, rx) = mpsc::unbounded_channel();
            s.edit.enter(EditSession::new(id, &note, tx));
            (Ok(Some((id, note.id, rx))), true)
        })?;

        if let Some((session_id, note_id, rx)) = started {
            tracing::debug!(session_id, %note_id, "entered edit mode");
            tokio::spawn(debounce(
                self.clone(),
                session_id,
                rx,
                self.core.config.debounce(),
            ));
        }
        Ok(())
    }

    /// Replace the content draft and restart the quiet period.
    pub fn edit_content(&self, content: impl Into<String>) -> Result<(), ClientError> {
        let content = content.into();
        self.core.mutate_if(|s| match s.edit.session_mut() {
            Some(session) => {
                session.draft_content = content;
                session.touch();
                (Ok(()), true)
            }
            None => (Err(ClientError::NotEditing), false),
        })
    }

    /// Replace the title draft without writing it.
    pub fn set_title_draft(&self, title: impl Into<String>) -> Result<(), ClientError> {
        let title = title.into();
        self.core.mutate_if(|s| match s.edit.session_mut() {
            Some(session) => {
                session.draft_title = title;
                (Ok(()), true)
            }
            None => (Err(ClientError::NotEditing), false),
        })
    }

    pub fn is_editing(&self) -> bool {
        self.core.read(|s| s.edit.is_active())
    }

    /// A revert is possible while a snapshot exists.
    pub fn can_revert(&self) -> bool {
        self.is_editing()
    }

    pub fn snapshot(&self) -> Option<EditSnapshot> {
        self.core.read(|s| s.edit.session().map(|e| e.snapshot.clone()))
    }

    /// Write the content draft if it differs from what was last persisted.
    pub(crate) async fn flush_content(&self, session_id: u64) -> Result<(), ClientError> {
        let _gate = self.core.write_gate.lock().await;
        let pending = self.core.read(|s| {
            s.edit
                .session()
                .filter(|e| e.id == session_id && e.content_dirty())
                .map(|e| {
                    (
                        s.generation,
                        e.note_id.clone(),
                        e.draft_content.clone(),
                        e.persisted_title.clone(),
                    )
                })
        });
        let Some((generation, note_id, content, title)) = pending else {
            return Ok(());
        };

        let patch = NotePatch::content(content.clone()).with_title(title);
        match self.core.store.update_note(&note_id, patch).await {
            Ok(note) => {
                self.core.mutate_current(generation, |s| {
                    if let Some(session) = s.edit.session_with_id(session_id) {
                        session.persisted_content = content;
                    }
                    s.record_write(note);
                });
                tracing::debug!(%note_id, "autosaved draft");
                Ok(())
            }
            Err(err) => Err(self.core.fail("autosave failed", err)),
        }
    }

    /// Write the title draft now.
    pub async fn commit_title(&self) -> Result<(), ClientError> {
        let _gate = self.core.write_gate.lock().await;
        let pending = self.core.mutate_if(|s| {
            let generation = s.generation;
            match s.edit.session_mut() {
                Some(e) => {
                    let before = e.draft_title.clone();
                    let title = e.take_title();
                    let changed = e.draft_title != before;
                    (Some((generation, e.id, e.note_id.clone(), title)), changed)
                }
                None => (None, false),
            }
        });
        let Some((generation, session_id, note_id, title)) = pending else {
            return Err(ClientError::NotEditing);
        };
        let Some(title) = title else {
            return Ok(());
        };

        match self.core.store.update_note(&note_id, NotePatch::title(title.clone())).await {
            Ok(note) => {
                self.core.mutate_current(generation, |s| {
                    if let Some(session) = s.edit.session_with_id(session_id) {
                        session.persisted_title = title;
                    }
                    s.record_write(note);
                });
                Ok(())
            }
            Err(err) => Err(self.core.fail("failed to rename note", err)),
        }
    }

    /// Persist pending changes and leave edit mode. Content is written only
    /// when it differs from the last persisted value.
    pub async fn save(&self) -> Result<(), ClientError> {
        let _gate = self.core.write_gate.lock().await;
        let pending = self.core.mutate_if(|s| {
            let generation = s.generation;
            match s.edit.session_mut() {
                Some(e) => {
                    let patch = NotePatch {
                        title: e.take_title(),
                        content: e.content_dirty().then(|| e.draft_content.clone()),
                    };
                    (Some((generation, e.id, e.note_id.clone(), patch)), true)
                }
                None => (None, false),
            }
        });
        let Some((generation, session_id, note_id, patch)) = pending else {
            return Err(ClientError::NotEditing);
        };

        if !patch.is_empty() {
            let note = self
                .core
                .store
                .update_note(&note_id, patch)
                .await
                .map_err(|e| self.core.fail("failed to save note", e))?;
            self.core.mutate_current(generation, |s| s.record_write(note));
        }
        self.finish(generation, session_id, &note_id);
        self.core.report(LogLevel::Success, "note saved");
        Ok(())
    }

    /// Write the snapshot back and leave edit mode.
    pub async fn revert(&self) -> Result<(), ClientError> {
        let _gate = self.core.write_gate.lock().await;
        let pending = self.core.read(|s| {
            s.edit
                .session()
                .map(|e| (s.generation, e.id, e.note_id.clone(), e.snapshot.clone()))
        });
        let Some((generation, session_id, note_id, snapshot)) = pending else {
            return Err(ClientError::NothingToRevert);
        };

        let patch = NotePatch::content(snapshot.content).with_title(snapshot.title);
        let note = self
            .core
            .store
            .update_note(&note_id, patch)
            .await
            .map_err(|e| self.core.fail("failed to revert note", e))?;
        self.core.mutate_current(generation, |s| s.record_write(note));
        self.finish(generation, session_id, &note_id);
        self.core.report(LogLevel::Info, "changes reverted");
        Ok(())
    }

    fn finish(&self, generation: u64, session_id: u64, note_id: &NoteId) {
        self.core.mutate_current(generation, |s| {
            if s.edit.session_with_id(session_id).is_some() {
                s.edit.end();
                s.reconcile_selection();
            }
        });
        tracing::debug!(session_id, %note_id, "left edit mode");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ClientConfig;
    use store::{MemoryStore, NewNote, Note, UserId};

    struct Fixture {
        store: Arc<MemoryStore>,
        core: Arc<Core<MemoryStore>>,
        autosave: AutosaveController<MemoryStore>,
        note: Note,
    }

    async fn fixture() -> Fixture {
        let store = Arc::new(MemoryStore::new());
        let user_id: UserId = store.create_user("alice", "password").await.unwrap();
        let note = store
            .create_note(NewNote::new("Title", "body"), &user_id)
            .await
            .unwrap();
        let core = Arc::new(Core::new(store.clone(), ClientConfig::default()));
        core.mutate(|s| {
            s.user = Some(user_id);
            s.apply_push(vec![note.clone()]);
        });
        let autosave = AutosaveController::new(core.clone());
        Fixture {
            store,
            core,
            autosave,
            note,
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_debounce_writes_once_after_quiet_period() {
        let f = fixture().await;
        f.autosave.enter_edit().unwrap();
        f.autosave.edit_content("b").unwrap();
        tokio::time::sleep(Duration::from_millis(400)).await;
        f.autosave.edit_content("bo").unwrap();
        tokio::time::sleep(Duration::from_millis(400)).await;
        f.autosave.edit_content("bod").unwrap();
        tokio::time::sleep(Duration::from_millis(900)).await;
        assert_eq!(f.store.update_count(), 0);

        tokio::time::sleep(Duration::from_millis(200)).await;
        assert_eq!(f.store.update_count(), 1);
        let stored = f.store.get_note(&f.note.id).await.unwrap().unwrap();
        assert_eq!(stored.content, "bod");
        assert_eq!(stored.title, "Title");
        assert!(stored.updated_at > f.note.updated_at);
    }

    #[tokio::test]
    async fn test_edit_requires_session() {
        let f = fixture().await;
        assert!(matches!(
            f.autosave.edit_content("x"),
            Err(ClientError::NotEditing)
        ));
        assert!(matches!(f.autosave.save().await, Err(ClientError::NotEditing)));
        assert!(matches!(
            f.autosave.revert().await,
            Err(ClientError::NothingToRevert)
        ));
        assert!(!f.autosave.can_revert());
    }

    #[tokio::test]
    async fn test_enter_edit_twice_keeps_snapshot() {
        let f = fixture().await;
        f.autosave.enter_edit().unwrap();
        f.autosave.edit_content("changed").unwrap();
        f.autosave.enter_edit().unwrap();

        let snapshot = f.autosave.snapshot().unwrap();
        assert_eq!(snapshot.content, "body");
        let draft = f.core.read(|s| s.edit.session().unwrap().draft_content.clone());
        assert_eq!(draft, "changed");
    }

    #[tokio::test]
    async fn test_save_without_changes_writes_nothing() {
        let f = fixture().await;
        f.autosave.enter_edit().unwrap();
        f.autosave.save().await.unwrap();

        assert_eq!(f.store.update_count(), 0);
        assert!(!f.autosave.is_editing());
    }

    #[tokio::test]
    async fn test_save_after_flush_skips_content() {
        let f = fixture().await;
        f.autosave.enter_edit().unwrap();
        f.autosave.edit_content("flushed").unwrap();
        let session_id = f.core.read(|s| s.edit.session().unwrap().id);
        f.autosave.flush_content(session_id).await.unwrap();
        assert_eq!(f.store.update_count(), 1);

        f.autosave.save().await.unwrap();
        assert_eq!(f.store.update_count(), 1);
        assert_eq!(f.core.read(|s| s.selected.get().unwrap().content.clone()), "flushed");
    }

    #[tokio::test]
    async fn test_commit_title() {
        let f = fixture().await;
        f.autosave.enter_edit().unwrap();
        f.autosave.set_title_draft("Renamed").unwrap();
        f.autosave.commit_title().await.unwrap();
        f.autosave.commit_title().await.unwrap();

        assert_eq!(f.store.update_count(), 1);
        let stored = f.store.get_note(&f.note.id).await.unwrap().unwrap();
        assert_eq!(stored.title, "Renamed");
        assert_eq!(stored.content, "body");
    }

    #[tokio::test]
    async fn test_blank_title_is_not_written() {
        let f = fixture().await;
        f.autosave.enter_edit().unwrap();
        f.autosave.set_title_draft("   ").unwrap();
        f.autosave.commit_title().await.unwrap();

        assert_eq!(f.store.update_count(), 0);
        let draft = f.core.read(|s| s.edit.session().unwrap().draft_title.clone());
        assert_eq!(draft, "Title");

        f.autosave.set_title_draft("").unwrap();
        f.autosave.edit_content("new body").unwrap();
        f.autosave.save().await.unwrap();
        let stored = f.store.get_note(&f.note.id).await.unwrap().unwrap();
        assert_eq!(stored.title, "Title");
        assert_eq!(stored.content, "new body");
    }

    #[tokio::test]
    async fn test_title_is_trimmed_before_write() {
        let f = fixture().await;
        f.autosave.enter_edit().unwrap();
        f.autosave.set_title_draft("  Renamed ").unwrap();
        f.autosave.commit_title().await.unwrap();

        let stored = f.store.get_note(&f.note.id).await.unwrap().unwrap();
        assert_eq!(stored.title, "Renamed");

        f.autosave.set_title_draft("Renamed  ").unwrap();
        f.autosave.commit_title().await.unwrap();
        assert_eq!(f.store.update_count(), 1);
    }

    #[tokio::test]
    async fn test_revert_restores_snapshot() {
        let f = fixture().await;
        f.autosave.enter_edit().unwrap();
        f.autosave.set_title_draft("Other").unwrap();
        f.autosave.commit_title().await.unwrap();
        f.autosave.edit_content("scratch").unwrap();
        let session_id = f.core.read(|s| s.edit.session().unwrap().id);
        f.autosave.flush_content(session_id).await.unwrap();
        let before = f.store.get_note(&f.note.id).await.unwrap().unwrap();

        f.autosave.revert().await.unwrap();

        let stored = f.store.get_note(&f.note.id).await.unwrap().unwrap();
        assert_eq!(stored.title, "Title");
        assert_eq!(stored.content, "body");
        assert!(stored.updated_at > before.updated_at);
        assert!(!f.autosave.can_revert());
        let selected = f.core.read(|s| s.selected.get().cloned().unwrap());
        assert_eq!(selected.title, "Title");
        assert_eq!(selected.updated_at, stored.updated_at);
    }

    #[tokio::test]
    async fn test_failed_save_keeps_draft() {
        let f = fixture().await;
        f.autosave.enter_edit().unwrap();
        f.autosave.edit_content("precious").unwrap();
        f.store.set_offline(true);

        assert!(f.autosave.save().await.is_err());
        assert!(f.autosave.is_editing());
        let draft = f.core.read(|s| s.edit.session().unwrap().draft_content.clone());
        assert_eq!(draft, "precious");
        let level = f.core.read(|s| s.notifications.last().unwrap().level);
        assert_eq!(level, LogLevel::Error);

        f.store.set_offline(false);
        f.autosave.save().await.unwrap();
        let stored = f.store.get_note(&f.note.id).await.unwrap().unwrap();
        assert_eq!(stored.content, "precious");
    }
}
