pub const UNTITLED_SLUG: &str = "untitled-project";

const DIVIDER: char = '-';

/// Turn a display name into a lowercase ASCII token usable as a file or directory name.
///
/// Runs of anything that is not a letter or digit become a single `-`, non-ASCII
/// letters are transliterated (`É` -> `E`), leftovers outside `[A-Za-z0-9_-]` are
/// dropped and the result is trimmed of dividers. Never returns an empty string.
pub fn slugify(text: &str) -> String {
    let mut divided = String::with_capacity(text.len());
    let mut in_gap = false;
    for ch in text.chars() {
        if ch.is_alphanumeric() {
            divided.push(ch);
            in_gap = false;
        } else if !in_gap {
            divided.push(DIVIDER);
            in_gap = true;
        }
    }

    let mut ascii = String::with_capacity(divided.len());
    for ch in divided.chars() {
        if ch.is_ascii() {
            ascii.push(ch);
        } else {
            ascii.push_str(deunicode::deunicode_char(ch).unwrap_or(""));
        }
    }

    let kept: String = ascii
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || *c == '_' || *c == DIVIDER)
        .collect();

    let mut slug = String::with_capacity(kept.len());
    for ch in kept.trim_matches(DIVIDER).chars() {
        if ch == DIVIDER && slug.ends_with(DIVIDER) {
            continue;
        }
        slug.push(ch.to_ascii_lowercase());
    }

    if slug.is_empty() {
        UNTITLED_SLUG.to_string()
    } else {
        slug
    }
}
