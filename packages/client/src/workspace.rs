//! # NotesWorkspace
//!
//! The intent surface presentation code talks to. It owns the shared state
//! and wires the [`NoteListSynchronizer`] and the [`AutosaveController`]
//! together under one policy: switching away from a note that is being
//! edited saves it first, and a failed save blocks the switch.
//!
//! Presentation reads state through the accessors below and redraws when
//! the [`changes`](NotesWorkspace::changes) counter moves.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use store::{Note, NoteId, NoteStore, User, UserId};
use tokio::sync::watch;

use crate::autosave::AutosaveController;
use crate::config::ClientConfig;
use crate::filter::filter_notes;
use crate::notifications::Notification;
use crate::state::Core;
use crate::synchronizer::NoteListSynchronizer;
use crate::ClientError;

/// Character and word counts of a note body.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct NoteStats {
    pub chars: usize,
    pub words: usize,
}

impl NoteStats {
    pub fn of(text: &str) -> Self {
        Self {
            chars: text.chars().count(),
            words: text.split_whitespace().count(),
        }
    }
}

/// What the workspace pane shows: the selected note, with drafts in place
/// of stored values while editing.
#[derive(Clone, Debug, PartialEq)]
pub struct NoteView {
    pub id: NoteId,
    pub title: String,
    pub content: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub editing: bool,
    pub can_revert: bool,
    pub stats: NoteStats,
}

pub struct NotesWorkspace<S: NoteStore> {
    core: Arc<Core<S>>,
    sync: NoteListSynchronizer<S>,
    autosave: AutosaveController<S>,
}

impl<S: NoteStore> NotesWorkspace<S> {
    pub fn new(store: Arc<S>, config: ClientConfig) -> Self {
        let core = Arc::new(Core::new(store, config));
        Self {
            sync: NoteListSynchronizer::new(core.clone()),
            autosave: AutosaveController::new(core.clone()),
            core,
        }
    }

    pub fn synchronizer(&self) -> &NoteListSynchronizer<S> {
        &self.sync
    }

    pub fn autosave(&self) -> &AutosaveController<S> {
        &self.autosave
    }

    pub fn config(&self) -> &ClientConfig {
        &self.core.config
    }

    /// Start showing `user`'s notes.
    pub fn open(&self, user: &User) -> Result<(), ClientError> {
        self.sync.start(user.id.clone())
    }

    /// Save pending edits if possible, then stop synchronising.
    pub async fn close(&self) {
        if self.autosave.is_editing() {
            if let Err(err) = self.autosave.save().await {
                tracing::warn!(%err, "discarding unsaved draft on close");
            }
        }
        self.sync.stop();
    }

    pub fn user_id(&self) -> Option<UserId> {
        self.core.read(|s| s.user.clone())
    }

    /// Counter that moves on every visible change.
    pub fn changes(&self) -> watch::Receiver<u64> {
        self.core.changes()
    }

    pub fn notes(&self) -> Vec<Note> {
        self.sync.notes()
    }

    /// Notes matching `query`; the cached list is left as is.
    pub fn search(&self, query: &str) -> Vec<Note> {
        self.core
            .read(|s| filter_notes(&s.notes, query).into_iter().cloned().collect())
    }

    pub fn selected(&self) -> Option<Note> {
        self.sync.selected()
    }

    pub fn view(&self) -> Option<NoteView> {
        self.core.read(|s| {
            let note = s.selected.get()?;
            let session = s.edit.session().filter(|e| e.note_id == note.id);
            let (title, content) = match session {
                Some(e) => (e.draft_title.clone(), e.draft_content.clone()),
                None => (note.title.clone(), note.content.clone()),
            };
            Some(NoteView {
                id: note.id.clone(),
                stats: NoteStats::of(&content),
                title,
                content,
                created_at: note.created_at,
                updated_at: note.updated_at,
                editing: session.is_some(),
                can_revert: session.is_some(),
            })
        })
    }

    pub fn stats(&self) -> Option<NoteStats> {
        self.view().map(|v| v.stats)
    }

    /// Save the open session if it belongs to a note other than `keep`.
    async fn save_before_switch(&self, keep: Option<&NoteId>) -> Result<(), ClientError> {
        let editing_other = self.core.read(|s| {
            s.edit
                .session()
                .is_some_and(|e| Some(&e.note_id) != keep)
        });
        if editing_other {
            self.autosave.save().await?;
        }
        Ok(())
    }

    pub async fn select(&self, id: &NoteId) -> Result<(), ClientError> {
        self.save_before_switch(Some(id)).await?;
        self.sync.select(id)
    }

    pub async fn create_note(&self) -> Result<Note, ClientError> {
        self.save_before_switch(None).await?;
        self.sync.create_note().await
    }

    pub async fn delete_note(&self, id: &NoteId) -> Result<(), ClientError> {
        self.sync.delete_note(id).await
    }

    pub async fn refresh(&self) -> Result<(), ClientError> {
        self.sync.refresh().await
    }

    pub fn enter_edit(&self) -> Result<(), ClientError> {
        self.autosave.enter_edit()
    }

    pub fn edit_content(&self, content: impl Into<String>) -> Result<(), ClientError> {
        self.autosave.edit_content(content)
    }

    pub fn set_title_draft(&self, title: impl Into<String>) -> Result<(), ClientError> {
        self.autosave.set_title_draft(title)
    }

    pub async fn commit_title(&self) -> Result<(), ClientError> {
        self.autosave.commit_title().await
    }

    pub async fn save(&self) -> Result<(), ClientError> {
        self.autosave.save().await
    }

    pub async fn revert(&self) -> Result<(), ClientError> {
        self.autosave.revert().await
    }

    pub fn is_editing(&self) -> bool {
        self.autosave.is_editing()
    }

    pub fn can_revert(&self) -> bool {
        self.autosave.can_revert()
    }

    pub fn notifications(&self) -> Vec<Notification> {
        self.core.read(|s| s.notifications.entries().to_vec())
    }

    pub fn dismiss(&self, id: u64) {
        self.core.mutate_if(|s| ((), s.notifications.dismiss(id)));
    }
}

impl<S: NoteStore> Drop for NotesWorkspace<S> {
    fn drop(&mut self) {
        self.sync.stop();
    }
}
