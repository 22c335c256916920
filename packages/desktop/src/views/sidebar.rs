use dioxus::prelude::*;
use store::Note;

use super::display_title;
use crate::{Revision, Route, Services, SessionState};

#[component]
pub fn Sidebar() -> Element {
    let services = use_context::<Services>();
    let revision = use_context::<Revision>();
    let mut session = use_context::<Signal<SessionState>>();
    let nav = use_navigator();
    let mut query = use_signal(String::new);

    let _ = revision();
    let total = services.workspace.notes().len();
    let notes = services.workspace.search(&query());
    let found = notes.len();
    let selected = services.workspace.selected().map(|n| n.id);
    let login = session().user.map(|u| u.login).unwrap_or_default();

    let create = {
        let services = services.clone();
        move |_| {
            let services = services.clone();
            spawn(async move {
                let _ = services.workspace.create_note().await;
            });
        }
    };

    let sign_out = move |_| {
        let services = services.clone();
        spawn(async move {
            services.workspace.close().await;
            if let Err(err) = services.auth.sign_out() {
                tracing::error!(%err, "failed to clear session");
            }
            session.set(SessionState {
                user: None,
                loading: false,
            });
            nav.replace(Route::Login {});
        });
    };

    rsx! {
        aside {
            class: "sidebar",

            div {
                class: "sidebar-header",
                span { class: "muted", "{login}" }
                button { onclick: sign_out, "Sign out" }
            }

            input {
                class: "search",
                r#type: "search",
                placeholder: "Search notes",
                value: query(),
                oninput: move |evt: FormEvent| query.set(evt.value()),
            }
            if !query().trim().is_empty() {
                p { class: "muted", "Found {found} of {total}" }
            }

            button { class: "primary", onclick: create, "New note" }

            ul {
                class: "note-list",
                for note in notes {
                    NoteListItem {
                        key: "{note.id}",
                        active: selected.as_ref() == Some(&note.id),
                        note: note,
                    }
                }
            }
        }
    }
}

#[component]
fn NoteListItem(note: Note, active: bool) -> Element {
    let services = use_context::<Services>();
    let mut confirming = use_signal(|| false);
    let created = note.created_at.format("%d.%m.%Y").to_string();
    let title = display_title(&note.title).to_string();

    let select = {
        let services = services.clone();
        let id = note.id.clone();
        move |_| {
            let services = services.clone();
            let id = id.clone();
            spawn(async move {
                let _ = services.workspace.select(&id).await;
            });
        }
    };

    let delete = {
        let id = note.id.clone();
        move |evt: MouseEvent| {
            evt.stop_propagation();
            confirming.set(false);
            let services = services.clone();
            let id = id.clone();
            spawn(async move {
                let _ = services.workspace.delete_note(&id).await;
            });
        }
    };

    rsx! {
        li {
            class: if active { "note-item active" } else { "note-item" },
            onclick: select,
            div {
                class: "note-item-text",
                span { class: "note-item-title", "{title}" }
                span { class: "muted", "{created}" }
            }
            if confirming() {
                div {
                    class: "confirm",
                    span { "Delete note?" }
                    button { class: "danger", onclick: delete, "Delete" }
                    button {
                        onclick: move |evt: MouseEvent| {
                            evt.stop_propagation();
                            confirming.set(false);
                        },
                        "Cancel"
                    }
                }
            } else {
                button {
                    class: "danger",
                    title: "Delete",
                    onclick: move |evt: MouseEvent| {
                        evt.stop_propagation();
                        confirming.set(true);
                    },
                    "×"
                }
            }
        }
    }
}
