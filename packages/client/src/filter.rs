use store::Note;

/// Notes whose title or content contains `query`, ignoring case. A blank
/// query matches everything. Order is preserved.
pub fn filter_notes<'a>(notes: &'a [Note], query: &str) -> Vec<&'a Note> {
    let query = query.trim().to_lowercase();
    if query.is_empty() {
        return notes.iter().collect();
    }
    notes
        .iter()
        .filter(|n| {
            n.title.to_lowercase().contains(&query) || n.content.to_lowercase().contains(&query)
        })
        .collect()
}
