// src/utils/html.rs

/// Clean HTML content using the ammonia library.
///
/// Question text is authored by teachers and rendered to students, so it
/// goes through whitelist-based sanitization on the way in: safe markup
/// (like <b>, <p>) is preserved, dangerous tags and attributes (script,
/// iframe, onclick) are stripped.
pub fn clean_html(input: &str) -> String {
    ammonia::clean(input)
}
