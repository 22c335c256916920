use dioxus::prelude::*;

use super::note_pane::NotePane;
use super::notifications::NotificationList;
use super::sidebar::Sidebar;
use crate::{Route, SessionState};

/// Main screen: note list on the left, the selected note on the right.
#[component]
pub fn Home() -> Element {
    let session = use_context::<Signal<SessionState>>();
    let nav = use_navigator();

    if session().loading {
        return rsx! {
            div { class: "centered muted", "Loading..." }
        };
    }
    if session().user.is_none() {
        nav.replace(Route::Login {});
        return rsx! {};
    }

    rsx! {
        div {
            class: "home",
            Sidebar {}
            NotePane {}
            NotificationList {}
        }
    }
}
