use dioxus::prelude::*;

use super::display_title;
use crate::markdown::render_markdown;
use crate::{Revision, Services};

/// The selected note: rendered Markdown while viewing, title input and
/// text area while editing.
#[component]
pub fn NotePane() -> Element {
    let services = use_context::<Services>();
    let revision = use_context::<Revision>();

    let _ = revision();
    let Some(view) = services.workspace.view() else {
        return rsx! {
            section {
                class: "note-pane centered muted",
                "Select a note or create a new one"
            }
        };
    };

    let ws = services.workspace.clone();
    let on_title = move |evt: FormEvent| {
        let _ = ws.set_title_draft(evt.value());
    };
    let ws = services.workspace.clone();
    let on_title_blur = move |_| {
        let ws = ws.clone();
        spawn(async move {
            let _ = ws.commit_title().await;
        });
    };
    let ws = services.workspace.clone();
    let on_title_key = move |evt: KeyboardEvent| {
        if evt.key() == Key::Enter {
            let ws = ws.clone();
            spawn(async move {
                let _ = ws.commit_title().await;
            });
        }
    };
    let ws = services.workspace.clone();
    let on_content = move |evt: FormEvent| {
        let _ = ws.edit_content(evt.value());
    };
    let ws = services.workspace.clone();
    let on_edit = move |_| {
        let _ = ws.enter_edit();
    };
    let ws = services.workspace.clone();
    let on_save = move |_| {
        let ws = ws.clone();
        spawn(async move {
            let _ = ws.save().await;
        });
    };
    let ws = services.workspace.clone();
    let on_revert = move |_| {
        let ws = ws.clone();
        spawn(async move {
            let _ = ws.revert().await;
        });
    };

    let updated = view.updated_at.format("%d.%m.%Y %H:%M").to_string();
    let shown_title = display_title(&view.title).to_string();
    let stats = view.stats;

    rsx! {
        section {
            class: "note-pane",

            header {
                class: "note-header",
                if view.editing {
                    input {
                        class: "note-title",
                        value: "{view.title}",
                        oninput: on_title,
                        onblur: on_title_blur,
                        onkeydown: on_title_key,
                    }
                } else {
                    h2 { class: "note-title", "{shown_title}" }
                }
                div {
                    class: "note-actions",
                    if view.editing {
                        button { class: "primary", onclick: on_save, "Save" }
                        button { disabled: !view.can_revert, onclick: on_revert, "Revert" }
                    } else {
                        button { class: "primary", onclick: on_edit, "Edit" }
                    }
                }
            }

            if view.editing {
                textarea {
                    class: "note-editor",
                    value: "{view.content}",
                    oninput: on_content,
                }
            } else {
                article {
                    class: "note-preview",
                    dangerous_inner_html: render_markdown(&view.content),
                }
            }

            footer {
                class: "note-footer muted",
                span { "{stats.chars} characters" }
                span { "{stats.words} words" }
                span { "Updated {updated}" }
            }
        }
    }
}
