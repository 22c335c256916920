//! # Workspace state and push reconciliation
//!
//! [`WorkspaceState`] is everything the client knows locally: the cached note
//! list, the selection, the edit session and the notification log. It is
//! only touched inside short critical sections of [`Core`]; nothing here is
//! async.
//!
//! ## Reconciling a push
//!
//! The list is rebuilt from the last pushed snapshot plus two overlays:
//!
//! - **optimistic writes**: notes this client wrote whose push has not come
//!   back yet. A pushed version replaces one only when its `updated_at` is at
//!   least as new, so a late push never rolls back a local write.
//! - **pending deletes**: notes removed locally. They stay hidden until a push
//!   no longer contains them.
//!
//! ## Selection tokens
//!
//! Local creates and deletes move the selection themselves and then wait for
//! the store to catch up. Each opens a token naming the push that closes it:
//! a create waits for the note to be [`Presence`](TokenCondition::Presence),
//! a delete for its [`Absence`](TokenCondition::Absence). While any token is
//! open, pushes still refresh the list but leave the selection alone. The
//! push that closes the last token runs the selection policy.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::{Arc, Mutex};

use store::models::sort_by_recency;
use store::{Note, NoteId, Subscription, UserId};
use tokio::sync::watch;

use crate::config::ClientConfig;
use crate::edit_mode::EditModeState;
use crate::notifications::{LogLevel, Notifications};
use crate::selected_note::SelectedNoteState;
use crate::{lock, ClientError};

/// Push condition that closes a selection token.
#[derive(Clone, Debug, PartialEq, Eq)]
pub(crate) enum TokenCondition {
    /// The store call has not returned yet, so the id is unknown.
    Pending,
    Presence(NoteId),
    Absence(NoteId),
}

impl TokenCondition {
    fn is_met_by(&self, pushed: &[Note]) -> bool {
        match self {
            Self::Pending => false,
            Self::Presence(id) => pushed.iter().any(|n| &n.id == id),
            Self::Absence(id) => !pushed.iter().any(|n| &n.id == id),
        }
    }
}

#[derive(Clone, Debug)]
struct Optimistic {
    note: Note,
    /// Created locally and not yet seen in a push.
    created: bool,
}

/// What a push or a local change did to the selection.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SelectionChange {
    Unchanged,
    /// A different note is now selected.
    Selected(NoteId),
    /// Same note, newer version.
    Refreshed(NoteId),
    /// The list is empty and nothing is selected.
    Cleared,
    /// The selected note changed remotely but is being edited.
    Deferred(NoteId),
    /// Selection tokens are open.
    Suppressed,
}

impl SelectionChange {
    pub fn is_visible(&self) -> bool {
        matches!(self, Self::Selected(_) | Self::Refreshed(_) | Self::Cleared)
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct PushOutcome {
    pub list_changed: bool,
    /// Ids that are new or different compared to the previous push.
    pub changed: Vec<NoteId>,
    pub selection: SelectionChange,
}

impl PushOutcome {
    pub fn is_visible(&self) -> bool {
        self.list_changed || self.selection.is_visible()
    }
}

fn changed_ids(previous: Option<&[Note]>, pushed: &[Note]) -> Vec<NoteId> {
    pushed
        .iter()
        .filter(|note| {
            previous
                .and_then(|prev| prev.iter().find(|p| p.id == note.id))
                .map_or(true, |p| p.differs_from(note))
        })
        .map(|note| note.id.clone())
        .collect()
}

#[derive(Debug, Default)]
pub struct WorkspaceState {
    pub(crate) user: Option<UserId>,
    pub(crate) generation: u64,
    pub(crate) notes: Vec<Note>,
    last_push: Option<Vec<Note>>,
    optimistic: HashMap<NoteId, Optimistic>,
    pending_deleted: HashSet<NoteId>,
    tokens: BTreeMap<u64, TokenCondition>,
    next_token: u64,
    next_session: u64,
    pub(crate) selected: SelectedNoteState,
    pub(crate) edit: EditModeState,
    pub(crate) notifications: Notifications,
}

impl WorkspaceState {
    pub fn notes(&self) -> &[Note] {
        &self.notes
    }

    pub fn selected(&self) -> &SelectedNoteState {
        &self.selected
    }

    pub fn edit(&self) -> &EditModeState {
        &self.edit
    }

    pub fn notifications(&self) -> &Notifications {
        &self.notifications
    }

    pub fn user(&self) -> Option<&UserId> {
        self.user.as_ref()
    }

    pub(crate) fn note(&self, id: &NoteId) -> Option<&Note> {
        self.notes.iter().find(|n| &n.id == id)
    }

    pub(crate) fn open_tokens(&self) -> usize {
        self.tokens.len()
    }

    pub(crate) fn next_session_id(&mut self) -> u64 {
        self.next_session += 1;
        self.next_session
    }

    /// Forget everything tied to the signed-in user and invalidate work
    /// still in flight for the old session.
    pub(crate) fn reset(&mut self) {
        self.generation += 1;
        self.user = None;
        self.notes.clear();
        self.last_push = None;
        self.optimistic.clear();
        self.pending_deleted.clear();
        self.tokens.clear();
        self.selected.clear();
        self.edit.end();
    }

    pub(crate) fn open_token(&mut self, condition: TokenCondition) -> u64 {
        self.next_token += 1;
        let token = self.next_token;
        tracing::debug!(token, ?condition, "selection token opened");
        self.tokens.insert(token, condition);
        token
    }

    /// Name the condition of a pending token. Closes it right away when the
    /// last push already satisfies it.
    pub(crate) fn resolve_token(&mut self, token: u64, condition: TokenCondition) -> SelectionChange {
        let met = self
            .last_push
            .as_deref()
            .is_some_and(|pushed| condition.is_met_by(pushed));
        if met {
            return self.close_token(token);
        }
        if let Some(slot) = self.tokens.get_mut(&token) {
            *slot = condition;
        }
        SelectionChange::Unchanged
    }

    /// Close a token. Closing the last one runs the selection policy.
    pub(crate) fn close_token(&mut self, token: u64) -> SelectionChange {
        if self.tokens.remove(&token).is_none() || !self.tokens.is_empty() {
            return SelectionChange::Unchanged;
        }
        tracing::debug!(token, "last selection token closed");
        self.reconcile_selection()
    }

    fn merge(&self, pushed: &[Note]) -> Vec<Note> {
        let mut merged: Vec<Note> = pushed
            .iter()
            .filter(|n| !self.pending_deleted.contains(&n.id))
            .map(|n| match self.optimistic.get(&n.id) {
                Some(local) if local.note.updated_at > n.updated_at => local.note.clone(),
                _ => n.clone(),
            })
            .collect();
        for local in self.optimistic.values() {
            let id = &local.note.id;
            if local.created
                && !self.pending_deleted.contains(id)
                && !merged.iter().any(|n| &n.id == id)
            {
                merged.push(local.note.clone());
            }
        }
        sort_by_recency(&mut merged);
        merged
    }

    pub(crate) fn rebuild_list(&mut self) -> bool {
        let merged = self.merge(self.last_push.as_deref().unwrap_or_default());
        if merged == self.notes {
            return false;
        }
        self.notes = merged;
        true
    }

    /// Fold a resolved snapshot of the user's notes into local state.
    pub fn apply_push(&mut self, pushed: Vec<Note>) -> PushOutcome {
        self.optimistic.retain(|id, local| {
            match pushed.iter().find(|n| &n.id == id) {
                Some(n) => n.updated_at < local.note.updated_at,
                None => local.created,
            }
        });
        self.pending_deleted
            .retain(|id| pushed.iter().any(|n| &n.id == id));
        self.tokens.retain(|_, condition| !condition.is_met_by(&pushed));

        let changed = changed_ids(self.last_push.as_deref(), &pushed);
        self.last_push = Some(pushed);
        let list_changed = self.rebuild_list();

        let selection = if self.tokens.is_empty() {
            self.reconcile_selection()
        } else {
            SelectionChange::Suppressed
        };
        tracing::debug!(
            notes = self.notes.len(),
            changed = changed.len(),
            list_changed,
            ?selection,
            "applied push"
        );
        PushOutcome {
            list_changed,
            changed,
            selection,
        }
    }

    /// Run the selection policy against the current list.
    pub(crate) fn reconcile_selection(&mut self) -> SelectionChange {
        let Some(selected_id) = self.selected.id().cloned() else {
            return match self.notes.first().cloned() {
                Some(first) => {
                    let id = first.id.clone();
                    self.selected.set(Some(first));
                    SelectionChange::Selected(id)
                }
                None => SelectionChange::Unchanged,
            };
        };

        let Some(fresh) = self.note(&selected_id).cloned() else {
            if self.edit.is_editing(&selected_id) {
                self.edit.end();
                self.notifications.push(
                    LogLevel::Warning,
                    "the note you were editing was deleted, your changes were discarded",
                );
            }
            return self.fail_over();
        };

        let Some(current) = self.selected.get() else {
            return SelectionChange::Unchanged;
        };
        if !fresh.differs_from(current) {
            SelectionChange::Unchanged
        } else if self.edit.is_editing(&selected_id) {
            SelectionChange::Deferred(selected_id)
        } else if fresh.updated_at < current.updated_at {
            SelectionChange::Unchanged
        } else {
            self.selected.set(Some(fresh));
            SelectionChange::Refreshed(selected_id)
        }
    }

    /// Select the most recently updated note, or nothing.
    pub(crate) fn fail_over(&mut self) -> SelectionChange {
        match self.notes.first().cloned() {
            Some(first) => {
                let id = first.id.clone();
                self.selected.set(Some(first));
                SelectionChange::Selected(id)
            }
            None => {
                self.selected.clear();
                SelectionChange::Cleared
            }
        }
    }

    /// Record a note this client just wrote.
    pub(crate) fn record_write(&mut self, note: Note) {
        let confirmed = self
            .last_push
            .as_deref()
            .and_then(|pushed| pushed.iter().find(|n| n.id == note.id))
            .is_some_and(|n| n.updated_at >= note.updated_at);
        if !confirmed {
            let created = self.optimistic.get(&note.id).is_some_and(|o| o.created);
            let newer = self
                .optimistic
                .get(&note.id)
                .map_or(true, |o| note.updated_at > o.note.updated_at);
            if newer {
                self.optimistic.insert(
                    note.id.clone(),
                    Optimistic {
                        note: note.clone(),
                        created,
                    },
                );
            }
        }
        let refresh = self
            .selected
            .get()
            .is_some_and(|s| s.id == note.id && s.updated_at <= note.updated_at);
        if refresh {
            self.selected.set(Some(note));
        }
        self.rebuild_list();
    }

    /// Record a note this client just created and select it.
    pub(crate) fn record_created(&mut self, note: Note) {
        let seen = self
            .last_push
            .as_deref()
            .is_some_and(|pushed| pushed.iter().any(|n| n.id == note.id));
        if !seen {
            self.optimistic.insert(
                note.id.clone(),
                Optimistic {
                    note: note.clone(),
                    created: true,
                },
            );
        }
        self.selected.set(Some(note));
        self.rebuild_list();
    }

    /// Hide a note that is being deleted and move the selection off it.
    pub(crate) fn begin_delete(&mut self, id: &NoteId) {
        self.pending_deleted.insert(id.clone());
        self.optimistic.remove(id);
        self.rebuild_list();
        if self.selected.is(id) {
            self.edit.end();
            self.fail_over();
        }
        self.drop_presence(id);
    }

    /// Ids of local creates still waiting for a push that contains them.
    pub(crate) fn unconfirmed_creates(&self) -> Vec<NoteId> {
        let pushed = self.last_push.as_deref().unwrap_or_default();
        self.tokens
            .values()
            .filter_map(|condition| match condition {
                TokenCondition::Presence(id) if !pushed.iter().any(|n| &n.id == id) => {
                    Some(id.clone())
                }
                _ => None,
            })
            .collect()
    }

    /// Forget a local create the store no longer has. No push will ever
    /// contain it, so its token is closed here.
    pub(crate) fn forget_created(&mut self, id: &NoteId) -> SelectionChange {
        if self.optimistic.get(id).is_some_and(|o| o.created) {
            self.optimistic.remove(id);
        }
        self.rebuild_list();
        self.drop_presence(id)
    }

    /// Close every token waiting for `id` to appear.
    fn drop_presence(&mut self, id: &NoteId) -> SelectionChange {
        let before = self.tokens.len();
        self.tokens
            .retain(|_, condition| !matches!(condition, TokenCondition::Presence(p) if *p == *id));
        if self.tokens.len() == before || !self.tokens.is_empty() {
            return SelectionChange::Unchanged;
        }
        tracing::debug!(note_id = %id, "create token dropped");
        self.reconcile_selection()
    }

    /// Undo [`begin_delete`](Self::begin_delete) after the store refused.
    pub(crate) fn abort_delete(&mut self, id: &NoteId) {
        self.pending_deleted.remove(id);
        self.rebuild_list();
    }
}

/// State shared by the synchronizer, the autosave controller and the
/// workspace facade.
pub(crate) struct Core<S> {
    pub store: Arc<S>,
    pub config: ClientConfig,
    state: Mutex<WorkspaceState>,
    changes: watch::Sender<u64>,
    /// Serialises note writes so they reach the store in issue order.
    pub write_gate: tokio::sync::Mutex<()>,
    pub subscription: Mutex<Option<Subscription>>,
}

impl<S> Core<S> {
    pub fn new(store: Arc<S>, config: ClientConfig) -> Self {
        let (changes, _) = watch::channel(0);
        Self {
            store,
            config,
            state: Mutex::new(WorkspaceState::default()),
            changes,
            write_gate: tokio::sync::Mutex::new(()),
            subscription: Mutex::new(None),
        }
    }

    /// Read state without signalling a change.
    pub fn read<R>(&self, f: impl FnOnce(&WorkspaceState) -> R) -> R {
        f(&lock(&self.state))
    }

    /// Mutate state and signal a change.
    pub fn mutate<R>(&self, f: impl FnOnce(&mut WorkspaceState) -> R) -> R {
        let result = f(&mut lock(&self.state));
        self.notify();
        result
    }

    /// Mutate state and signal a change only if `f` reports one.
    pub fn mutate_if<R>(&self, f: impl FnOnce(&mut WorkspaceState) -> (R, bool)) -> R {
        let (result, changed) = f(&mut lock(&self.state));
        if changed {
            self.notify();
        }
        result
    }

    /// Run `f` only if the session that issued the work is still current.
    pub fn mutate_current<R>(
        &self,
        generation: u64,
        f: impl FnOnce(&mut WorkspaceState) -> R,
    ) -> Option<R> {
        self.mutate_if(|s| {
            if s.generation != generation {
                tracing::debug!(generation, current = s.generation, "discarding stale result");
                return (None, false);
            }
            (Some(f(s)), true)
        })
    }

    pub fn is_current(&self, generation: u64) -> bool {
        self.read(|s| s.generation == generation)
    }

    pub fn notify(&self) {
        self.changes.send_modify(|revision| *revision += 1);
    }

    pub fn changes(&self) -> watch::Receiver<u64> {
        self.changes.subscribe()
    }

    pub fn report(&self, level: LogLevel, message: impl Into<String>) {
        let message = message.into();
        self.mutate(|s| {
            s.notifications.push(level, message);
        });
    }

    /// Surface a failed intent to the user and hand the error back.
    pub fn fail(&self, context: &str, err: impl Into<ClientError>) -> ClientError {
        let err = err.into();
        self.report(err.level(), format!("{context}: {}", err.user_message()));
        err
    }
}
