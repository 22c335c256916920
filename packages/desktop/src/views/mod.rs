mod home;
pub use home::Home;

mod login;
pub use login::Login;

mod not_found;
pub use not_found::NotFound;

mod note_pane;
mod notifications;
mod sidebar;

/// Title shown for a note, with a placeholder for a blank one.
fn display_title(title: &str) -> &str {
    if title.trim().is_empty() {
        "Untitled"
    } else {
        title
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_blank_titles_get_a_placeholder() {
        assert_eq!(display_title(""), "Untitled");
        assert_eq!(display_title("  "), "Untitled");
        assert_eq!(display_title("Plans"), "Plans");
    }
}
