use client::LogLevel;
use dioxus::prelude::*;

use crate::{Revision, Services};

fn level_class(level: LogLevel) -> &'static str {
    match level {
        LogLevel::Info => "toast info",
        LogLevel::Success => "toast success",
        LogLevel::Warning => "toast warning",
        LogLevel::Error => "toast error",
    }
}

/// Dismissable notifications, newest last.
#[component]
pub fn NotificationList() -> Element {
    let services = use_context::<Services>();
    let revision = use_context::<Revision>();

    let _ = revision();
    let entries = services.workspace.notifications();

    rsx! {
        div {
            class: "toasts",
            for entry in entries {
                div {
                    key: "{entry.id}",
                    class: level_class(entry.level),
                    span { "{entry.message}" }
                    button {
                        title: "Dismiss",
                        onclick: {
                            let ws = services.workspace.clone();
                            move |_| ws.dismiss(entry.id)
                        },
                        "×"
                    }
                }
            }
        }
    }
}
