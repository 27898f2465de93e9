//! Persistence module for gate state
//!
//! Both stores keep a disposable in-memory copy of a line-oriented text
//! file. The file is the source of truth: it is re-read before every
//! decision and rewritten in full after every mutation.

pub mod origin_store;
pub mod whitelist_store;

pub use origin_store::OriginTracker;
pub use whitelist_store::WhitelistStore;

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Errors that can occur during persistence operations
#[derive(Error, Debug)]
pub enum PersistenceError {
    #[error("IO error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Path has no file name: {0}")]
    InvalidPath(PathBuf),
}

impl PersistenceError {
    fn io(path: &Path, source: std::io::Error) -> Self {
        PersistenceError::Io {
            path: path.to_path_buf(),
            source,
        }
    }
}

/// Create the backing file and its parent directory if missing
pub fn ensure_file(path: &Path) -> Result<(), PersistenceError> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent).map_err(|e| PersistenceError::io(parent, e))?;
        }
    }
    if !path.exists() {
        fs::File::create(path).map_err(|e| PersistenceError::io(path, e))?;
    }
    Ok(())
}

/// Read every non-blank line, creating the file first if needed
pub fn read_lines(path: &Path) -> Result<Vec<String>, PersistenceError> {
    ensure_file(path)?;
    let contents = fs::read_to_string(path).map_err(|e| PersistenceError::io(path, e))?;
    Ok(contents
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(String::from)
        .collect())
}

/// Replace the file with the given lines, each newline-terminated
///
/// Data lands in a sibling temp file first and is renamed over the target,
/// so readers never observe a half-written file.
pub fn write_lines<I, S>(path: &Path, lines: I) -> Result<(), PersistenceError>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let file_name = path
        .file_name()
        .ok_or_else(|| PersistenceError::InvalidPath(path.to_path_buf()))?;
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent).map_err(|e| PersistenceError::io(parent, e))?;
        }
    }

    let mut tmp_name = file_name.to_os_string();
    tmp_name.push(".tmp");
    let tmp_path = path.with_file_name(tmp_name);

    let mut buffer = String::new();
    for line in lines {
        buffer.push_str(line.as_ref());
        buffer.push('\n');
    }

    let mut file = fs::File::create(&tmp_path).map_err(|e| PersistenceError::io(&tmp_path, e))?;
    file.write_all(buffer.as_bytes())
        .and_then(|_| file.sync_all())
        .map_err(|e| PersistenceError::io(&tmp_path, e))?;
    drop(file);

    fs::rename(&tmp_path, path).map_err(|e| PersistenceError::io(path, e))
}
