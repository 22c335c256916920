use dioxus::prelude::*;

use crate::Route;

#[component]
pub fn NotFound(segments: Vec<String>) -> Element {
    let path = segments.join("/");

    rsx! {
        div {
            class: "centered",
            h1 { "Page not found" }
            p { class: "muted", "/{path}" }
            Link { to: Route::Home {}, "Back to notes" }
        }
    }
}
