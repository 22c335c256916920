use std::sync::Arc;

use client::{AuthSession, ClientConfig, FileSessionStorage, MemorySessionStorage, NotesWorkspace};
use dioxus::prelude::*;
use store::{FileStore, User};
use views::{Home, Login, NotFound};

mod markdown;
mod views;

const MAIN_CSS: Asset = asset!("/assets/main.css");

#[derive(Debug, Clone, Routable, PartialEq)]
#[rustfmt::skip]
enum Route {
    #[route("/")]
    Home {},
    #[route("/login")]
    Login {},
    #[route("/:..segments")]
    NotFound { segments: Vec<String> },
}

/// Long-lived services shared by every view.
#[derive(Clone)]
pub struct Services {
    pub auth: Arc<AuthSession<FileStore>>,
    pub workspace: Arc<NotesWorkspace<FileStore>>,
}

impl Services {
    fn new() -> Self {
        let store = FileStore::default_location()
            .map(FileStore::open)
            .unwrap_or_else(|| Ok(FileStore::detached()))
            .unwrap_or_else(|err| {
                tracing::error!(%err, "notes will not be saved between runs");
                FileStore::detached()
            });
        let store = Arc::new(store);
        let config = ClientConfig::load_default().unwrap_or_else(|err| {
            tracing::warn!(%err, "falling back to the default config");
            ClientConfig::default()
        });
        let auth = match FileSessionStorage::default_location() {
            Some(storage) => AuthSession::new(store.clone(), storage),
            None => AuthSession::new(store.clone(), MemorySessionStorage::default()),
        };
        Self {
            auth: Arc::new(auth),
            workspace: Arc::new(NotesWorkspace::new(store, config)),
        }
    }
}

/// Who is signed in, as far as the views are concerned.
#[derive(Clone, Debug, PartialEq)]
pub struct SessionState {
    pub user: Option<User>,
    pub loading: bool,
}

impl Default for SessionState {
    fn default() -> Self {
        Self {
            user: None,
            loading: true,
        }
    }
}

/// Counter bumped whenever the workspace state changes. Views read it to
/// redraw.
pub type Revision = Signal<u64>;

fn main() {
    dioxus::launch(App);
}

#[component]
fn App() -> Element {
    let services = use_context_provider(Services::new);
    let mut session = use_context_provider(|| Signal::new(SessionState::default()));
    let mut revision: Revision = use_context_provider(|| Signal::new(0));

    let restore = services.clone();
    use_future(move || {
        let services = restore.clone();
        async move {
            let user = match services.auth.init().await {
                Ok(user) => user,
                Err(err) => {
                    tracing::error!(%err, "failed to restore session");
                    None
                }
            };
            if let Some(user) = &user {
                if let Err(err) = services.workspace.open(user) {
                    tracing::error!(%err, "failed to open workspace");
                }
            }
            session.set(SessionState {
                user,
                loading: false,
            });
        }
    });

    let watched = services.clone();
    use_future(move || {
        let mut changes = watched.workspace.changes();
        async move {
            while changes.changed().await.is_ok() {
                let next = *revision.peek() + 1;
                revision.set(next);
            }
        }
    });

    rsx! {
        document::Link { rel: "stylesheet", href: MAIN_CSS }
        Router::<Route> {}
    }
}
