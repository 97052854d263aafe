//! Markup stripping for user-controlled transaction text.

use base64::Engine;

/// Remove anything that looks like an HTML/XML tag.
///
/// A tag starts at a `<` followed by a letter, `/`, `!` or `?`; any other `<`
/// is plain text. Text from there to the matching `>` is dropped; quoted
/// attribute values inside a tag may contain `>` without closing it. An
/// unterminated tag swallows the rest of the input.
pub fn strip_tags(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    let mut in_tag = false;
    let mut quote: Option<char> = None;
    let mut chars = input.chars().peekable();

    while let Some(c) = chars.next() {
        if in_tag {
            match (quote, c) {
                (Some(q), c) if c == q => quote = None,
                (Some(_), _) => {}
                (None, '"' | '\'') => quote = Some(c),
                (None, '>') => in_tag = false,
                _ => {}
            }
        } else if c == '<' && chars.peek().is_some_and(|&n| opens_tag(n)) {
            in_tag = true;
        } else {
            out.push(c);
        }
    }
    out
}

fn opens_tag(next: char) -> bool {
    next.is_ascii_alphabetic() || matches!(next, '/' | '!' | '?')
}

/// Decode a base64 payload and strip markup from it.
///
/// Payloads that are not valid base64 are stripped as-is rather than dropped.
pub fn sanitize_payload(encoded: &str) -> String {
    match base64::engine::general_purpose::STANDARD.decode(encoded) {
        Ok(bytes) => strip_tags(&String::from_utf8_lossy(&bytes)),
        Err(e) => {
            tracing::trace!(error = %e, "payload is not base64, stripping raw text");
            strip_tags(encoded)
        }
    }
}

/// Strip markup from an optional field, keeping `None` as `None`.
pub fn strip_opt(value: Option<&str>) -> Option<String> {
    value.map(strip_tags)
}

/// Upper-case the first character, leaving the rest untouched.
pub fn capitalize_first(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}
