//! `/add` ingestion — read a file or walk a folder into conversation entries.

use std::io::Read;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

const EXCLUDED_NAMES: &[&str] = &[
    ".git",
    "__pycache__",
    "node_modules",
    ".env",
    ".venv",
    "venv",
    ".DS_Store",
    "Thumbs.db",
    "target",
];

const EXCLUDED_EXTENSIONS: &[&str] = &[
    "pyc", "pyo", "pyd", "exe", "dll", "so", "zip", "tar", "gz", "jpg", "jpeg", "png", "gif",
    "pdf",
];

/// Bytes inspected when sniffing for binary content.
const PEEK_SIZE: usize = 1024;

/// A file read for context, keyed the way the model should refer to it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IngestedFile {
    pub path: String,
    pub content: String,
}

#[derive(Debug, Default)]
pub struct IngestReport {
    pub added: Vec<IngestedFile>,
    /// Path and reason
    pub skipped: Vec<(String, String)>,
}

/// Read `target` (a file or folder, relative to `workspace` unless absolute).
///
/// Targets must lie inside the workspace, since edits can only address
/// workspace-relative paths.
pub fn ingest(
    workspace: &Path,
    target: &str,
    max_file_bytes: usize,
) -> Result<IngestReport, std::io::Error> {
    let resolved = resolve(workspace, target);
    if !resolved.exists() {
        return Err(std::io::Error::new(
            std::io::ErrorKind::NotFound,
            format!("'{target}' does not exist"),
        ));
    }
    let workspace = workspace.canonicalize()?;
    let full = resolved.canonicalize()?;
    if !full.starts_with(&workspace) {
        return Err(std::io::Error::new(
            std::io::ErrorKind::InvalidInput,
            format!(
                "'{target}' is outside the workspace {}",
                workspace.display()
            ),
        ));
    }
    let workspace = workspace.as_path();
    let mut report = IngestReport::default();

    if full.is_dir() {
        let walker = WalkDir::new(&full)
            .sort_by_file_name()
            .into_iter()
            .filter_entry(|e| e.depth() == 0 || !is_excluded_name(&e.file_name().to_string_lossy()));

        for entry in walker {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => {
                    let path = e.path().map(|p| p.display().to_string()).unwrap_or_default();
                    report.skipped.push((path, e.to_string()));
                    continue;
                }
            };
            if !entry.file_type().is_file() {
                continue;
            }
            let key = context_key(workspace, entry.path());
            if has_excluded_extension(entry.path()) {
                report.skipped.push((key, "excluded extension".into()));
                continue;
            }
            match read_text(entry.path(), max_file_bytes) {
                Ok(content) => report.added.push(IngestedFile { path: key, content }),
                Err(reason) => report.skipped.push((key, reason)),
            }
        }
        tracing::info!(
            folder = %full.display(),
            added = report.added.len(),
            skipped = report.skipped.len(),
            "Ingested folder"
        );
        return Ok(report);
    }

    let key = context_key(workspace, &full);
    match read_text(&full, max_file_bytes) {
        Ok(content) => report.added.push(IngestedFile { path: key, content }),
        Err(reason) => report.skipped.push((key, reason)),
    }
    Ok(report)
}

fn resolve(workspace: &Path, target: &str) -> PathBuf {
    let path = Path::new(target);
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        workspace.join(path)
    }
}

/// Workspace-relative `/` path when possible, so edits can target it.
fn context_key(workspace: &Path, path: &Path) -> String {
    let relative = path.strip_prefix(workspace).unwrap_or(path);
    relative
        .components()
        .map(|c| c.as_os_str().to_string_lossy().into_owned())
        .collect::<Vec<_>>()
        .join("/")
}

fn is_excluded_name(name: &str) -> bool {
    name.starts_with('.') || EXCLUDED_NAMES.contains(&name)
}

fn has_excluded_extension(path: &Path) -> bool {
    path.extension()
        .map(|ext| ext.to_string_lossy().to_lowercase())
        .is_some_and(|ext| EXCLUDED_EXTENSIONS.contains(&ext.as_str()))
}

/// A NUL byte in the first kilobyte marks a file as binary.
fn is_binary(path: &Path) -> bool {
    let mut buf = [0u8; PEEK_SIZE];
    match std::fs::File::open(path).and_then(|mut f| f.read(&mut buf)) {
        Ok(n) => buf[..n].contains(&0),
        Err(_) => true,
    }
}

fn read_text(path: &Path, max_file_bytes: usize) -> Result<String, String> {
    let size = std::fs::metadata(path).map_err(|e| e.to_string())?.len();
    if size > max_file_bytes as u64 {
        return Err("size limit exceeded".into());
    }
    if is_binary(path) {
        return Err("binary file".into());
    }
    std::fs::read_to_string(path).map_err(|e| e.to_string())
}
