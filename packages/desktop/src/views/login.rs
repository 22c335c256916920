//! Sign-in and registration form.

use dioxus::prelude::*;

use crate::{Route, Services, SessionState};

#[derive(Clone, Copy, Debug, PartialEq)]
enum Mode {
    SignIn,
    Register,
}

#[component]
pub fn Login() -> Element {
    let services = use_context::<Services>();
    let mut session = use_context::<Signal<SessionState>>();
    let nav = use_navigator();
    let mut mode = use_signal(|| Mode::SignIn);
    let mut login = use_signal(String::new);
    let mut password = use_signal(String::new);
    let mut error = use_signal(|| Option::<String>::None);
    let mut loading = use_signal(|| false);

    // Already signed in
    if !session().loading && session().user.is_some() {
        nav.replace(Route::Home {});
    }

    let handle_submit = move |evt: FormEvent| {
        evt.prevent_default();
        let services = services.clone();
        spawn(async move {
            error.set(None);
            loading.set(true);
            let result = match mode() {
                Mode::SignIn => services.auth.sign_in(&login(), &password()).await,
                Mode::Register => services.auth.register(&login(), &password()).await,
            };
            match result {
                Ok(user) => {
                    if let Err(err) = services.workspace.open(&user) {
                        tracing::error!(%err, "failed to open workspace");
                    }
                    session.set(SessionState {
                        user: Some(user),
                        loading: false,
                    });
                    password.set(String::new());
                    loading.set(false);
                    nav.replace(Route::Home {});
                }
                Err(err) => {
                    loading.set(false);
                    error.set(Some(err.user_message()));
                }
            }
        });
    };

    let (heading, submit_label, switch_prompt, switch_label) = match mode() {
        Mode::SignIn => ("Sign in", "Sign in", "No account yet? ", "Register"),
        Mode::Register => ("Create an account", "Register", "Already registered? ", "Sign in"),
    };

    rsx! {
        div {
            class: "centered",

            h1 { "Notes" }
            p { class: "muted", "{heading}" }

            form {
                class: "login-form",
                onsubmit: handle_submit,

                if let Some(err) = error() {
                    div { class: "form-error", "{err}" }
                }

                input {
                    r#type: "text",
                    placeholder: "Login",
                    autocomplete: "username",
                    value: login(),
                    oninput: move |evt: FormEvent| login.set(evt.value()),
                }

                input {
                    r#type: "password",
                    placeholder: "Password",
                    value: password(),
                    oninput: move |evt: FormEvent| password.set(evt.value()),
                }

                button {
                    class: "primary",
                    r#type: "submit",
                    disabled: loading(),
                    if loading() { "Please wait..." } else { "{submit_label}" }
                }
            }

            p {
                class: "muted",
                "{switch_prompt}"
                a {
                    href: "#",
                    onclick: move |evt: MouseEvent| {
                        evt.prevent_default();
                        error.set(None);
                        mode.set(match mode() {
                            Mode::SignIn => Mode::Register,
                            Mode::Register => Mode::SignIn,
                        });
                    },
                    "{switch_label}"
                }
            }
        }
    }
}
