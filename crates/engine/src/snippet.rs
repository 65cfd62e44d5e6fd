//! Snippet editor — exact-match, single-occurrence replacement.
//!
//! A snippet identifies one location in a file by its literal text. If the
//! text is missing or appears more than once the edit is refused; there is
//! no fuzzy matching and no "first match wins".

use crate::materializer::Materializer;
use infrared_core::{Error, Result};

/// Number of non-overlapping occurrences of `needle` in `haystack`.
pub fn count_occurrences(haystack: &str, needle: &str) -> usize {
    if needle.is_empty() {
        return 0;
    }
    haystack.matches(needle).count()
}

/// Replace the single occurrence of `original` in `content`.
///
/// Every byte outside the matched range is left untouched.
pub fn apply_to_content(
    path: &str,
    content: &str,
    original: &str,
    replacement: &str,
) -> Result<String> {
    match count_occurrences(content, original) {
        0 => Err(Error::SnippetNotFound { path: path.into() }),
        1 => Ok(content.replacen(original, replacement, 1)),
        count => Err(Error::AmbiguousEdit {
            path: path.into(),
            count,
        }),
    }
}

/// Read `path` through the materializer and compute the edited content.
///
/// Does not write; the caller decides whether the result lands on disk.
pub async fn apply(
    materializer: &Materializer,
    path: &str,
    original: &str,
    replacement: &str,
) -> Result<String> {
    let current = materializer.read(path).await?;
    let updated = apply_to_content(path, &current, original, replacement);
    if let Err(e) = &updated {
        tracing::warn!(path, error = %e, "Snippet edit refused");
    }
    updated
}
