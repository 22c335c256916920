#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use client::{ClientConfig, NotesWorkspace};
use store::{MemoryStore, NewNote, Note, NoteStore, User};

pub async fn user(store: &MemoryStore, login: &str) -> User {
    let id = store.create_user(login, "password").await.unwrap();
    store.get_user(&id).await.unwrap().unwrap()
}

pub async fn note(store: &MemoryStore, user: &User, title: &str, content: &str) -> Note {
    store
        .create_note(NewNote::new(title, content), &user.id)
        .await
        .unwrap()
}

/// A workspace opened for `user`.
pub fn open(store: &Arc<MemoryStore>, user: &User, config: ClientConfig) -> NotesWorkspace<MemoryStore> {
    let ws = NotesWorkspace::new(store.clone(), config);
    ws.open(user).unwrap();
    ws
}

/// Wait for the workspace to reach a state, failing after five seconds.
pub async fn wait_until(
    ws: &NotesWorkspace<MemoryStore>,
    mut condition: impl FnMut(&NotesWorkspace<MemoryStore>) -> bool,
) {
    let mut changes = ws.changes();
    let reached = tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            changes.borrow_and_update();
            if condition(ws) {
                return;
            }
            if changes.changed().await.is_err() {
                return;
            }
        }
    })
    .await;
    assert!(reached.is_ok(), "workspace did not reach the expected state");
}

/// Let spawned tasks drain without advancing the clock much.
pub async fn settle() {
    for _ in 0..50 {
        tokio::task::yield_now().await;
    }
}
