//! # Edit mode
//!
//! A note is either viewed or edited. Editing is an [`EditSession`] scoped to
//! one note: it owns the [`EditSnapshot`] captured on entry, the drafts the
//! user is typing, and the last values known to be persisted.
//!
//! Only one session exists at a time and entering edit mode while a session
//! is open keeps the existing one, so the snapshot always reflects the note
//! as it was before the first keystroke. The session also owns the sender
//! half of its debounce channel; ending the session closes the channel and
//! with it the debounce task.

use store::{Note, NoteId};
use tokio::sync::mpsc::UnboundedSender;

/// Title and content of a note when editing began.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EditSnapshot {
    pub title: String,
    pub content: String,
}

#[derive(Debug)]
pub struct EditSession {
    pub(crate) id: u64,
    pub note_id: NoteId,
    pub snapshot: EditSnapshot,
    pub draft_title: String,
    pub draft_content: String,
    pub persisted_title: String,
    pub persisted_content: String,
    keystrokes: UnboundedSender<()>,
}

impl EditSession {
    pub(crate) fn new(id: u64, note: &Note, keystrokes: UnboundedSender<()>) -> Self {
        Self {
            id,
            note_id: note.id.clone(),
            snapshot: EditSnapshot {
                title: note.title.clone(),
                content: note.content.clone(),
            },
            draft_title: note.title.clone(),
            draft_content: note.content.clone(),
            persisted_title: note.title.clone(),
            persisted_content: note.content.clone(),
            keystrokes,
        }
    }

    pub fn content_dirty(&self) -> bool {
        self.draft_content != self.persisted_content
    }

    pub fn title_dirty(&self) -> bool {
        self.draft_title != self.persisted_title
    }

    /// Trim the title draft and return it when it still needs writing. A
    /// blank draft is dropped in favour of the persisted title.
    pub(crate) fn take_title(&mut self) -> Option<String> {
        let trimmed = self.draft_title.trim();
        if trimmed.is_empty() {
            self.draft_title = self.persisted_title.clone();
            return None;
        }
        if trimmed.len() != self.draft_title.len() {
            self.draft_title = trimmed.to_string();
        }
        self.title_dirty().then(|| self.draft_title.clone())
    }

    /// Restart the debounce quiet period.
    pub(crate) fn touch(&self) {
        // The task is gone only after the session ended.
        let _ = self.keystrokes.send(());
    }
}

#[derive(Debug, Default)]
pub enum EditModeState {
    #[default]
    Viewing,
    Editing(EditSession),
}

impl EditModeState {
    /// Start a session unless one is already open. Returns false when the
    /// existing session was kept.
    pub(crate) fn enter(&mut self, session: EditSession) -> bool {
        if self.is_active() {
            return false;
        }
        *self = Self::Editing(session);
        true
    }

    /// End the current session, returning it.
    pub(crate) fn end(&mut self) -> Option<EditSession> {
        match std::mem::take(self) {
            Self::Editing(session) => Some(session),
            Self::Viewing => None,
        }
    }

    pub fn session(&self) -> Option<&EditSession> {
        match self {
            Self::Editing(session) => Some(session),
            Self::Viewing => None,
        }
    }

    pub(crate) fn session_mut(&mut self) -> Option<&mut EditSession> {
        match self {
            Self::Editing(session) => Some(session),
            Self::Viewing => None,
        }
    }

    /// The session with this id, if it is still the open one.
    pub(crate) fn session_with_id(&mut self, id: u64) -> Option<&mut EditSession> {
        self.session_mut().filter(|s| s.id == id)
    }

    pub fn is_active(&self) -> bool {
        matches!(self, Self::Editing(_))
    }

    pub fn is_editing(&self, note_id: &NoteId) -> bool {
        self.session().is_some_and(|s| &s.note_id == note_id)
    }
}
