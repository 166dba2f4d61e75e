//! Name normalization
//!
//! Turns an arbitrarily formatted person name ("Dr. Alexander Bethke-Jaenicke",
//! "Mr. John Smith Jr.") into the first-name token used as the classifier
//! query key. All functions here are pure and never fail.

/// Titles and generational suffixes skipped when looking for a first name.
///
/// Entries are stored without periods; tokens are compared after removing
/// periods and commas and lower-casing.
const TITLES: &[&str] = &[
    // Academic
    "dr", "prof", "professor", "phd", "md", "dds",
    // Social
    "mr", "mrs", "ms", "miss", "sir", "lord", "lady", "duke", "duchess",
    // Religious
    "rev", "reverend", "father", "fr", "sister", "sr", "brother", "br",
    // Military
    "capt", "captain", "col", "colonel", "maj", "major", "lt", "lieutenant", "gen",
    "general", "admiral", "adm", "sgt", "sergeant", "cpl", "corporal",
    // Professional
    "ceo", "cfo", "cto", "coo", "president", "vp", "director", "manager", "supervisor",
    // Suffixes
    "jr", "esq", "i", "ii", "iii", "iv", "v", "vi", "vii", "viii", "ix", "x",
];

/// Suffixes skipped when looking for a last name
const SUFFIXES: &[&str] = &["jr", "sr", "esq", "i", "ii", "iii", "iv", "v", "vi"];

/// Comparison key: lower-cased with periods and commas removed
fn comparison_key(token: &str) -> String {
    token
        .chars()
        .filter(|c| *c != '.' && *c != ',')
        .flat_map(char::to_lowercase)
        .collect()
}

fn strip_trailing_punctuation(token: &str) -> &str {
    token.trim_end_matches(['.', ','])
}

fn is_title(token: &str) -> bool {
    TITLES.contains(&comparison_key(token).as_str())
}

/// Single letter, or a letter followed by a period ("J", "J.")
fn is_initial(token: &str) -> bool {
    let mut chars = token.chars();
    match (chars.next(), chars.next(), chars.next()) {
        (Some(_), None, None) => true,
        (Some(c), Some('.'), None) => c.is_ascii_alphabetic(),
        _ => false,
    }
}

/// Short all-uppercase token ("IBM", "NY")
fn is_acronym(token: &str) -> bool {
    token.chars().count() <= 3 && token.to_uppercase() == token
}

/// Extract the first name from a full name
///
/// Scans whitespace-separated tokens left to right and returns the first one
/// that is not a title or suffix, not an initial and not a short acronym,
/// with trailing periods and commas removed. When every token is skipped the
/// first raw token is returned unchanged; input without any token is returned
/// as-is.
pub fn extract_first_name(full_name: &str) -> String {
    let mut tokens = full_name.split_whitespace().peekable();

    let Some(first_token) = tokens.peek().copied() else {
        return full_name.to_string();
    };

    tokens
        .map(|token| (token, strip_trailing_punctuation(token)))
        .find(|(token, stripped)| {
            !stripped.is_empty() && !is_title(token) && !is_initial(token) && !is_acronym(token)
        })
        .map(|(_, stripped)| stripped.to_string())
        .unwrap_or_else(|| first_token.to_string())
}

/// Extract the last name: the last token that is not a generational suffix
///
/// Returns an empty string for single-token names.
pub fn extract_last_name(full_name: &str) -> String {
    let tokens: Vec<&str> = full_name.split_whitespace().collect();
    if tokens.len() <= 1 {
        return String::new();
    }

    tokens
        .iter()
        .rev()
        .find(|token| {
            !SUFFIXES.contains(&comparison_key(token).as_str()) && token.chars().count() > 1
        })
        .or_else(|| tokens.last())
        .map(|token| token.replace(['.', ','], ""))
        .unwrap_or_default()
}

/// Components of a parsed full name
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParsedName {
    pub title: String,
    pub first_name: String,
    pub last_name: String,
    pub suffix: String,
    /// Whitespace-collapsed input
    pub full_name: String,
}

/// Split a full name into title, first name, last name and suffix
pub fn parse_full_name(full_name: &str) -> ParsedName {
    let tokens: Vec<&str> = full_name.split_whitespace().collect();

    let title = match tokens.as_slice() {
        [first, _, ..] if is_title(first) => first.to_string(),
        _ => String::new(),
    };

    let suffix = match tokens.as_slice() {
        [_, _, .., last] if SUFFIXES.contains(&comparison_key(last).as_str()) => last.to_string(),
        _ => String::new(),
    };

    ParsedName {
        title,
        first_name: extract_first_name(full_name),
        last_name: extract_last_name(full_name),
        suffix,
        full_name: tokens.join(" "),
    }
}

/// Collapse whitespace and normalize typographic quotes and dashes
pub fn clean_name(name: &str) -> String {
    name.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .chars()
        .map(|c| match c {
            '\u{201C}' | '\u{201D}' => '"',
            '\u{2018}' | '\u{2019}' => '\'',
            '\u{2013}' | '\u{2014}' => '-',
            other => other,
        })
        .collect()
}

/// Heuristic check that a string looks like a person's name
pub fn is_plausible_name(name: &str) -> bool {
    const MARKUP: &str = "<>{}[]\\|`~!@#$%^&*()+=";

    let name = name.trim();
    let len = name.chars().count();

    if len < 2 || !name.chars().any(|c| c.is_alphabetic()) {
        return false;
    }

    let digits = name.chars().filter(char::is_ascii_digit).count();
    if digits * 2 > len {
        return false;
    }

    !name.chars().any(|c| MARKUP.contains(c))
}
