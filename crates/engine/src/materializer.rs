//! File materializer — the only code path that writes model output to disk.
//!
//! Paths are validated by `infrared-security` and resolved against the
//! workspace root. Writes go to a temporary sibling first and are renamed
//! over the target, so a reader never observes a half-written file.

use infrared_config::AppConfig;
use infrared_core::{Error, Result};
use infrared_security::{PathValidationError, validate_content_size, validate_relative_path};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Reads and writes workspace files on behalf of the orchestrator.
#[derive(Debug, Clone)]
pub struct Materializer {
    root: PathBuf,
    max_file_bytes: usize,
}

/// Canonical key for a workspace-relative path: `/` separators, no `.`
/// segments, no empty segments.
pub fn normalize(path: &str) -> String {
    path.replace('\\', "/")
        .split('/')
        .filter(|s| !s.is_empty() && *s != ".")
        .collect::<Vec<_>>()
        .join("/")
}

fn security_error(path: &str, e: PathValidationError) -> Error {
    Error::PathSecurityViolation {
        path: path.into(),
        reason: e.to_string(),
    }
}

fn io_error(path: &str, e: std::io::Error) -> Error {
    if e.kind() == ErrorKind::NotFound {
        Error::NotFound { path: path.into() }
    } else {
        Error::Io {
            path: path.into(),
            reason: e.to_string(),
        }
    }
}

impl Materializer {
    pub fn new(root: impl Into<PathBuf>, max_file_bytes: usize) -> Self {
        Self {
            root: root.into(),
            max_file_bytes,
        }
    }

    pub fn from_config(config: &AppConfig) -> Self {
        Self::new(
            config.session.workspace_root.clone(),
            config.limits.max_file_bytes,
        )
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn max_file_bytes(&self) -> usize {
        self.max_file_bytes
    }

    /// Check a path and return where it lives on disk.
    pub fn resolve(&self, path: &str) -> Result<PathBuf> {
        validate_relative_path(path).map_err(|e| security_error(path, e))?;
        let key = normalize(path);
        if key.is_empty() {
            return Err(security_error(path, PathValidationError::Empty));
        }
        Ok(self.root.join(key))
    }

    /// Dry-run every check `write` would make, without touching disk.
    pub fn validate(&self, path: &str, content: &str) -> Result<()> {
        self.resolve(path)?;
        validate_content_size(content.len(), self.max_file_bytes)
            .map_err(|e| security_error(path, e))
    }

    /// Read the full content of a workspace file.
    pub async fn read(&self, path: &str) -> Result<String> {
        let target = self.resolve(path)?;
        tokio::fs::read_to_string(&target)
            .await
            .map_err(|e| io_error(path, e))
    }

    /// Replace the whole file at `path` with `content`.
    pub async fn write(&self, path: &str, content: &str) -> Result<()> {
        self.validate(path, content)?;
        let target = self.resolve(path)?;

        if let Some(parent) = target.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| io_error(path, e))?;
        }

        let file_name = target
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let temp = target.with_file_name(format!(
            ".{file_name}.{}.tmp",
            uuid::Uuid::new_v4().simple()
        ));

        tokio::fs::write(&temp, content)
            .await
            .map_err(|e| io_error(path, e))?;
        if let Err(e) = tokio::fs::rename(&temp, &target).await {
            let _ = tokio::fs::remove_file(&temp).await;
            return Err(io_error(path, e));
        }

        debug!(path, temp = %temp.display(), "Renamed temporary file into place");
        info!(path, bytes = content.len(), "Wrote file");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn setup() -> (tempfile::TempDir, Materializer) {
        let dir = tempfile::tempdir().unwrap();
        let materializer = Materializer::new(dir.path(), 5_000_000);
        (dir, materializer)
    }

    #[test]
    fn normalize_strips_dot_segments() {
        assert_eq!(normalize("./src//lib.rs"), "src/lib.rs");
        assert_eq!(normalize("src\\main.rs"), "src/main.rs");
        assert_eq!(normalize("hello.txt"), "hello.txt");
    }

    #[tokio::test]
    async fn write_creates_parent_dirs() {
        let (dir, materializer) = setup();
        materializer
            .write("nested/dir/file.txt", "nested content")
            .await
            .unwrap();
        let content = std::fs::read_to_string(dir.path().join("nested/dir/file.txt")).unwrap();
        assert_eq!(content, "nested content");
    }

    #[tokio::test]
    async fn overwrite_replaces_whole_file() {
        let (dir, materializer) = setup();
        std::fs::write(dir.path().join("a.txt"), "old content that is longer").unwrap();
        materializer.write("a.txt", "new").await.unwrap();
        assert_eq!(std::fs::read_to_string(dir.path().join("a.txt")).unwrap(), "new");
    }

    #[tokio::test]
    async fn no_temporary_files_left_behind() {
        let (dir, materializer) = setup();
        materializer.write("a.txt", "x").await.unwrap();
        let names: Vec<_> = std::fs::read_dir(dir.path())
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, vec!["a.txt".to_string()]);
    }

    #[tokio::test]
    async fn tilde_rejected_regardless_of_size() {
        let (dir, materializer) = setup();
        let large = "x".repeat(6_000_000);
        for content in ["", "small", large.as_str()] {
            match materializer.write("notes/~backup/a.txt", content).await {
                Err(Error::PathSecurityViolation { reason, .. }) => {
                    assert!(reason.contains("home"), "reason was: {reason}");
                }
                other => panic!("Expected PathSecurityViolation, got: {other:?}"),
            }
        }
        assert!(!dir.path().join("notes").exists());
    }

    #[tokio::test]
    async fn size_ceiling_boundary() {
        let (dir, materializer) = setup();
        let at_limit = "a".repeat(5_000_000);
        materializer.write("big.txt", &at_limit).await.unwrap();

        let over_limit = "a".repeat(5_000_001);
        assert!(matches!(
            materializer.write("bigger.txt", &over_limit).await,
            Err(Error::PathSecurityViolation { .. })
        ));
        assert!(dir.path().join("big.txt").exists());
        assert!(!dir.path().join("bigger.txt").exists());
    }

    #[tokio::test]
    async fn traversal_and_absolute_rejected() {
        let (_dir, materializer) = setup();
        for path in ["../escape.txt", "/etc/passwd", "", "a/../../b"] {
            assert!(
                matches!(
                    materializer.write(path, "x").await,
                    Err(Error::PathSecurityViolation { .. })
                ),
                "path {path:?} should be rejected"
            );
        }
    }

    #[tokio::test]
    async fn read_missing_is_not_found() {
        let (_dir, materializer) = setup();
        assert!(matches!(
            materializer.read("missing.txt").await,
            Err(Error::NotFound { .. })
        ));
        assert!(matches!(
            materializer.read("~/x").await,
            Err(Error::PathSecurityViolation { .. })
        ));
    }

    #[test]
    fn validate_does_not_touch_disk() {
        let (dir, materializer) = setup();
        materializer.validate("new/file.txt", "content").unwrap();
        assert!(!dir.path().join("new").exists());
    }
}
