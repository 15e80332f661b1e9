use chrono::Utc;
use unicode_general_category::{GeneralCategory, get_general_category};
use unicode_normalization::{UnicodeNormalization, char::is_combining_mark};

const MAX_NAME_BYTES: usize = 200;

/// Turns an untrusted title into a name that is safe to use inside the
/// download directory. Never returns an empty string.
pub fn sanitize_filename(raw: &str) -> String {
    let mut cleaned = String::with_capacity(raw.len());

    for character in raw.nfkd() {
        if is_combining_mark(character) {
            continue;
        }

        if is_reserved(character) {
            cleaned.push('_');
        } else if is_printable(character) || matches!(character, ' ' | '.' | '-' | '_') {
            cleaned.push(character);
        }
    }

    let truncated = truncate_on_char_boundary(&cleaned, MAX_NAME_BYTES);
    let trimmed = truncated.trim_matches(|character| matches!(character, ' ' | '.'));

    if trimmed.is_empty() {
        fallback_name()
    } else {
        trimmed.to_string()
    }
}

/// Reduces a requested path to its final component before sanitizing, so
/// `../../etc/passwd` becomes a lookup for `passwd`.
pub fn sanitize_basename(requested: &str) -> String {
    let basename = requested
        .rsplit(['/', '\\'])
        .next()
        .unwrap_or(requested);
    sanitize_filename(basename)
}

fn is_reserved(character: char) -> bool {
    matches!(
        character,
        '<' | '>' | ':' | '"' | '/' | '\\' | '|' | '?' | '*' | '\u{00}'..='\u{1F}' | '\u{7F}'
    )
}

/// Printable in the usual sense: not a control, format, separator,
/// surrogate, private-use or unassigned code point. ASCII space is the one
/// separator that is kept.
fn is_printable(character: char) -> bool {
    match get_general_category(character) {
        GeneralCategory::Control
        | GeneralCategory::Format
        | GeneralCategory::Surrogate
        | GeneralCategory::PrivateUse
        | GeneralCategory::Unassigned
        | GeneralCategory::LineSeparator
        | GeneralCategory::ParagraphSeparator => false,
        GeneralCategory::SpaceSeparator => character == ' ',
        _ => true,
    }
}

fn truncate_on_char_boundary(value: &str, max_bytes: usize) -> &str {
    if value.len() <= max_bytes {
        return value;
    }

    let mut end = max_bytes;
    while !value.is_char_boundary(end) {
        end -= 1;
    }
    &value[..end]
}

fn fallback_name() -> String {
    format!("video_{}", Utc::now().timestamp())
}
