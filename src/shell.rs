//! POSIX shell quoting for values spliced into remote command lines

use std::borrow::Cow;

/// Characters that never need quoting in a POSIX shell word
fn is_safe(c: char) -> bool {
    c.is_ascii_alphanumeric() || matches!(c, '/' | '.' | '-' | '_' | ':' | '=' | '+' | ',' | '@' | '%')
}

/// Quote `value` so the remote shell sees it as one literal word.
///
/// Plain paths and URLs come back unchanged; anything else is wrapped in
/// single quotes with embedded quotes written as `'\''`.
pub fn quote(value: &str) -> Cow<'_, str> {
    if !value.is_empty() && value.chars().all(is_safe) {
        return Cow::Borrowed(value);
    }
    Cow::Owned(format!("'{}'", value.replace('\'', r"'\''")))
}

/// Join words after quoting each of them
pub fn join<'a>(words: impl IntoIterator<Item = &'a str>) -> String {
    words
        .into_iter()
        .map(quote)
        .collect::<Vec<_>>()
        .join(" ")
}
