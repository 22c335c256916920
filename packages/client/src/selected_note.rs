use store::{Note, NoteId};

/// The single note shown in the workspace, as last seen from the store.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct SelectedNoteState {
    note: Option<Note>,
}

impl SelectedNoteState {
    pub fn get(&self) -> Option<&Note> {
        self.note.as_ref()
    }

    pub fn id(&self) -> Option<&NoteId> {
        self.note.as_ref().map(|n| &n.id)
    }

    pub fn is(&self, id: &NoteId) -> bool {
        self.id() == Some(id)
    }

    /// Replace the selection. Returns true if anything changed.
    pub fn set(&mut self, note: Option<Note>) -> bool {
        if self.note == note {
            return false;
        }
        self.note = note;
        true
    }

    pub fn clear(&mut self) -> bool {
        self.set(None)
    }
}
