//! Vault directory walker.
//!
//! A vault is one directory per note type, each holding `<basename>.md`
//! files. The walker discovers exactly that shape: markdown files one level
//! below the root. The `.flint-note` sidecar, hidden directories, and
//! underscore-prefixed files (legacy `_description.md`) are skipped.

use std::path::{Path, PathBuf};
use std::time::UNIX_EPOCH;

use thiserror::Error;
use walkdir::WalkDir;

#[derive(Debug, Error)]
pub enum VaultWalkerError {
    #[error("vault root does not exist: {0}")]
    MissingRoot(String),

    #[error("failed to walk vault directory {0}: {1}")]
    WalkError(String, #[source] walkdir::Error),

    #[error("failed to read file metadata {0}: {1}")]
    MetadataError(String, #[source] std::io::Error),
}

/// A discovered note file.
#[derive(Debug, Clone)]
pub struct WalkedFile {
    /// Absolute path to the file.
    pub absolute_path: PathBuf,
    /// Vault-relative path, forward slashes on every OS.
    pub relative_path: String,
    /// Type directory name.
    pub note_type: String,
    /// Basename including the `.md` extension.
    pub filename: String,
    /// File modification time, unix milliseconds.
    pub modified_ms: i64,
    /// File size in bytes.
    pub size: u64,
}

/// Walker over a vault's type directories.
#[derive(Debug)]
pub struct VaultWalker {
    root: PathBuf,
}

impl VaultWalker {
    pub fn new(root: &Path) -> Result<Self, VaultWalkerError> {
        if !root.is_dir() {
            return Err(VaultWalkerError::MissingRoot(root.display().to_string()));
        }
        Ok(Self { root: root.to_path_buf() })
    }

    /// Walk the vault and return every note file, sorted by relative path.
    pub fn walk(&self) -> Result<Vec<WalkedFile>, VaultWalkerError> {
        let mut files = Vec::new();

        for entry in WalkDir::new(&self.root)
            .min_depth(2)
            .max_depth(2)
            .follow_links(false)
            .into_iter()
            .filter_entry(|e| !is_hidden(e))
        {
            let entry = entry.map_err(|e| {
                VaultWalkerError::WalkError(self.root.display().to_string(), e)
            })?;

            let path = entry.path();
            if !entry.file_type().is_file() || !is_note_file(path) {
                continue;
            }

            let metadata = entry.metadata().map_err(|e| {
                VaultWalkerError::WalkError(path.display().to_string(), e)
            })?;

            let filename = match path.file_name().and_then(|n| n.to_str()) {
                Some(n) => n.to_string(),
                None => continue,
            };
            let note_type = match path
                .parent()
                .and_then(Path::file_name)
                .and_then(|n| n.to_str())
            {
                Some(t) => t.to_string(),
                None => continue,
            };

            files.push(WalkedFile {
                absolute_path: path.to_path_buf(),
                relative_path: format!("{note_type}/{filename}"),
                note_type,
                filename,
                modified_ms: system_time_ms(metadata.modified().ok()),
                size: metadata.len(),
            });
        }

        files.sort_by(|a, b| a.relative_path.cmp(&b.relative_path));
        Ok(files)
    }

    pub fn root(&self) -> &Path {
        &self.root
    }
}

fn is_hidden(entry: &walkdir::DirEntry) -> bool {
    entry
        .file_name()
        .to_str()
        .is_some_and(|name| name.starts_with('.'))
}

fn is_note_file(path: &Path) -> bool {
    let has_md_ext = path.extension().and_then(|e| e.to_str()) == Some("md");
    let underscored = path
        .file_name()
        .and_then(|n| n.to_str())
        .is_some_and(|n| n.starts_with('_'));
    has_md_ext && !underscored
}

/// Unix milliseconds for an optional system time; 0 when unavailable.
pub fn system_time_ms(time: Option<std::time::SystemTime>) -> i64 {
    time.and_then(|t| t.duration_since(UNIX_EPOCH).ok())
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0)
}
