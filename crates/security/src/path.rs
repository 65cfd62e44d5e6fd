//! Path validation — keeps model-proposed writes inside the workspace.
//!
//! Paths arrive as untrusted text from the model. They are checked here and
//! either accepted unchanged or refused; nothing is ever rewritten into a
//! "safe" form.

use std::path::{Component, Path};

/// Error returned when path or content validation fails.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PathValidationError {
    #[error("Path is empty")]
    Empty,

    #[error("Path '{path}' is absolute")]
    Absolute { path: String },

    #[error("Path traversal detected in '{path}'")]
    ParentTraversal { path: String },

    #[error("Path '{path}' references a home directory")]
    HomeReference { path: String },

    #[error("Content is {size} bytes, limit is {limit}")]
    ContentTooLarge { size: usize, limit: usize },
}

/// Validate that a path is relative and stays below the workspace root.
///
/// Checks, on the raw string with `\` treated as a separator:
/// 1. Non-empty
/// 2. Not absolute (leading separator, drive prefix)
/// 3. No `~` in any segment
/// 4. No `..` segment
pub fn validate_relative_path(path: &str) -> Result<(), PathValidationError> {
    if path.trim().is_empty() {
        return Err(PathValidationError::Empty);
    }

    let normalized = path.replace('\\', "/");

    if normalized.starts_with('/') || has_drive_prefix(&normalized) {
        return Err(PathValidationError::Absolute { path: path.into() });
    }

    // Also ask std, in case the platform knows a form we don't
    if Path::new(path).is_absolute()
        || Path::new(path)
            .components()
            .any(|c| matches!(c, Component::Prefix(_) | Component::RootDir))
    {
        return Err(PathValidationError::Absolute { path: path.into() });
    }

    for segment in normalized.split('/') {
        if segment.contains('~') {
            return Err(PathValidationError::HomeReference { path: path.into() });
        }
        if segment == ".." {
            return Err(PathValidationError::ParentTraversal { path: path.into() });
        }
    }

    Ok(())
}

/// Refuse content strictly larger than `limit` bytes.
pub fn validate_content_size(size: usize, limit: usize) -> Result<(), PathValidationError> {
    if size > limit {
        tracing::warn!(size, limit, "Content exceeds size ceiling");
        return Err(PathValidationError::ContentTooLarge { size, limit });
    }
    Ok(())
}

/// `C:` style prefixes.
fn has_drive_prefix(path: &str) -> bool {
    let bytes = path.as_bytes();
    bytes.len() >= 2 && bytes[0].is_ascii_alphabetic() && bytes[1] == b':'
}
