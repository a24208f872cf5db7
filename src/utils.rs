//! Text normalization helpers shared by series matching and slug handling.

/// Maps typographic quotes and dashes to their ASCII counterparts.
fn fold_quote(c: char) -> char {
    match c {
        '\u{2018}' | '\u{2019}' | '\u{201B}' | '\u{2032}' | '`' | '´' => '\'',
        '\u{201C}' | '\u{201D}' | '\u{201F}' | '\u{2033}' | '«' | '»' => '"',
        '\u{2010}' | '\u{2011}' | '\u{2012}' | '\u{2013}' | '\u{2014}' | '\u{2015}' => '-',
        '\u{3000}' => ' ',
        other => other,
    }
}

fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Quote-normalized, punctuation-folded form of a title.
///
/// Apostrophes are dropped so "Hero's" and "Heros" meet; every other
/// punctuation character becomes a space. Case is preserved.
pub fn normalize_title(text: &str) -> String {
    let folded: String = text
        .chars()
        .map(fold_quote)
        .filter(|c| *c != '\'')
        .map(|c| {
            if c.is_alphanumeric() || c.is_whitespace() {
                c
            } else {
                ' '
            }
        })
        .collect();

    collapse_whitespace(&folded)
}

/// Title reduced to alphanumerics and single spaces.
pub fn alphanumeric_only(text: &str) -> String {
    let kept: String = text
        .chars()
        .filter(|c| c.is_alphanumeric() || c.is_whitespace())
        .collect();

    collapse_whitespace(&kept)
}

/// Comparison key: normalized and lowercased.
pub fn normalize_key(text: &str) -> String {
    normalize_title(text).to_lowercase()
}

/// Splits a comparison key into tokens.
pub fn tokens(key: &str) -> Vec<&str> {
    key.split(' ').filter(|t| !t.is_empty()).collect()
}

/// Lowercase ASCII slug: runs of anything else collapse to a single dash.
pub fn slugify(text: &str) -> String {
    let mut slug = String::with_capacity(text.len());
    let mut pending_dash = false;

    for c in normalize_title(text).chars() {
        if c.is_ascii_alphanumeric() {
            if pending_dash && !slug.is_empty() {
                slug.push('-');
            }
            pending_dash = false;
            slug.push(c.to_ascii_lowercase());
        } else {
            pending_dash = true;
        }
    }

    slug
}
