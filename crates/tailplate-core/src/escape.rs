//! HTML escaping shared by every engine adapter
//!
//! Engines route all interpolated values through [`escape_html`] unless the
//! engine's own convention marks the value as safe (`{{{raw}}}` in
//! Handlebars, `|safe` in Jinja), so escaping looks the same no matter which
//! engine renders a call site.

/// Escape `&`, `<`, `>`, `"`, `'` and `/` as HTML entities
pub fn escape_html(input: &str) -> String {
    let mut escaped = String::with_capacity(input.len());
    for c in input.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&#39;"),
            '/' => escaped.push_str("&#47;"),
            _ => escaped.push(c),
        }
    }
    escaped
}
