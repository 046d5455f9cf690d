//! Text normalization and whole-word phrase matching
//!
//! Text is NFKC-normalized and lowercased first, so decomposed accents and
//! full-width forms compare equal to their composed counterparts. A word is
//! then a maximal run of alphanumeric characters and the combining marks
//! attached to them. Everything else is a boundary, so `invoiceless` is one
//! word and never matches the keyword `invoice`.

use unicode_normalization::char::is_combining_mark;
use unicode_normalization::UnicodeNormalization;

/// Lowercase `text` and split it into words
pub fn words(text: &str) -> Vec<String> {
    let folded: String = text.nfkc().flat_map(fold_case).collect();
    // Lowercasing can decompose again, e.g. into a base letter plus a mark
    let folded: String = folded.nfc().collect();

    folded
        .split(|c: char| !is_word_char(c))
        .filter(|w| w.chars().any(char::is_alphanumeric))
        .map(str::to_string)
        .collect()
}

fn is_word_char(c: char) -> bool {
    c.is_alphanumeric() || is_combining_mark(c)
}

/// Lowercase one character
///
/// `İ` folds to a plain `i` (its simple case folding) instead of the
/// `i` + combining dot that `char::to_lowercase` produces.
fn fold_case(c: char) -> std::char::ToLowercase {
    if c == '\u{130}' {
        'I'.to_lowercase()
    } else {
        c.to_lowercase()
    }
}

/// Count occurrences of `phrase` as a contiguous word sequence in `haystack`
///
/// Occurrences may overlap (`["a", "a"]` occurs twice in `["a", "a", "a"]`).
/// An empty phrase never matches.
pub fn count_phrase(haystack: &[String], phrase: &[String]) -> u64 {
    if phrase.is_empty() || phrase.len() > haystack.len() {
        return 0;
    }

    haystack
        .windows(phrase.len())
        .filter(|window| *window == phrase)
        .count() as u64
}
