use pulldown_cmark::{html, Options, Parser};

fn parser_options() -> Options {
    let mut opts = Options::empty();
    opts.insert(Options::ENABLE_STRIKETHROUGH);
    opts.insert(Options::ENABLE_TABLES);
    opts.insert(Options::ENABLE_TASKLISTS);
    opts
}

/// Render a note body to HTML for the read-only view.
pub fn render_markdown(source: &str) -> String {
    let parser = Parser::new_ext(source, parser_options());
    let mut html_out = String::with_capacity(source.len() * 3 / 2);
    html::push_html(&mut html_out, parser);
    html_out
}
