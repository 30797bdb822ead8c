use unicode_normalization::char::is_combining_mark;
use unicode_normalization::UnicodeNormalization;

/// Maps a name to the key used to join the same student across datasets.
///
/// Accents are stripped through NFD decomposition, the result is upper-cased,
/// everything except `A-Z` and whitespace is dropped and whitespace runs
/// collapse to one space. Idempotent and defined for every input.
pub fn canonicalize(text: &str) -> String {
    let upper = text
        .nfd()
        .filter(|c| !is_combining_mark(*c))
        .collect::<String>()
        .to_uppercase();

    let letters: String = upper
        .chars()
        .filter(|c| c.is_ascii_uppercase() || c.is_whitespace())
        .collect();

    letters.split_whitespace().collect::<Vec<_>>().join(" ")
}
