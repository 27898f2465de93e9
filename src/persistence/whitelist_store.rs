//! File-backed set of whitelisted usernames

use super::{read_lines, write_lines};
use crate::models::normalize_username;
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

/// Whitelist backed by a one-username-per-line text file
pub struct WhitelistStore {
    path: PathBuf,
    entries: BTreeSet<String>,
}

impl WhitelistStore {
    /// Open the store and load whatever is on disk
    pub fn open<P: AsRef<Path>>(path: P) -> Self {
        let mut store = WhitelistStore {
            path: path.as_ref().to_path_buf(),
            entries: BTreeSet::new(),
        };
        store.reload();
        store
    }

    /// Replace the in-memory set with the file contents
    ///
    /// On read failure the previous set is kept.
    pub fn reload(&mut self) {
        match read_lines(&self.path) {
            Ok(lines) => {
                self.entries = lines.iter().map(|l| normalize_username(l)).collect();
            }
            Err(e) => {
                log::error!("Failed to load whitelist, keeping {} cached entries: {}", self.entries.len(), e);
            }
        }
    }

    pub fn contains(&self, username: &str) -> bool {
        self.entries.contains(username)
    }

    /// Add a username; returns false if it was already present
    pub fn add(&mut self, username: &str) -> bool {
        let inserted = self.entries.insert(normalize_username(username));
        self.save();
        inserted
    }

    /// Remove a username; returns false if it was absent
    pub fn remove(&mut self, username: &str) -> bool {
        let removed = self.entries.remove(&normalize_username(username));
        self.save();
        removed
    }

    pub fn entries(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn save(&self) {
        if let Err(e) = write_lines(&self.path, &self.entries) {
            log::error!("Failed to save whitelist: {}", e);
        }
    }
}
