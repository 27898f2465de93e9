//! File-backed map of username to last trusted origin
//!
//! Lines are `username:origin`, split on the first colon so descriptors
//! such as IPv6 addresses survive intact.

use super::{read_lines, write_lines};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

pub struct OriginTracker {
    path: PathBuf,
    origins: BTreeMap<String, String>,
}

impl OriginTracker {
    /// Open the tracker and load whatever is on disk
    pub fn open<P: AsRef<Path>>(path: P) -> Self {
        let mut tracker = OriginTracker {
            path: path.as_ref().to_path_buf(),
            origins: BTreeMap::new(),
        };
        tracker.reload();
        tracker
    }

    /// Replace the in-memory map with the file contents
    ///
    /// On read failure the previous map is kept. Lines that do not parse
    /// are skipped.
    pub fn reload(&mut self) {
        let lines = match read_lines(&self.path) {
            Ok(lines) => lines,
            Err(e) => {
                log::error!("Failed to load tracked origins, keeping {} cached entries: {}", self.origins.len(), e);
                return;
            }
        };

        let mut origins = BTreeMap::new();
        for line in lines {
            match parse_line(&line) {
                Some((user, origin)) => {
                    origins.insert(user, origin);
                }
                None => log::warn!("Skipping malformed origin entry: {:?}", line),
            }
        }
        self.origins = origins;
    }

    pub fn get(&self, username: &str) -> Option<&str> {
        self.origins.get(username).map(String::as_str)
    }

    /// Insert or replace the origin for a user and persist
    pub fn set(&mut self, username: &str, origin: &str) {
        self.origins
            .insert(username.to_string(), sanitize_origin(origin));
        self.save();
    }

    /// Forget a user's origin; returns false if none was tracked
    pub fn remove(&mut self, username: &str) -> bool {
        let removed = self.origins.remove(username).is_some();
        self.save();
        removed
    }

    pub fn entries(&self) -> impl Iterator<Item = (&str, &str)> {
        self.origins.iter().map(|(u, o)| (u.as_str(), o.as_str()))
    }

    pub fn len(&self) -> usize {
        self.origins.len()
    }

    pub fn is_empty(&self) -> bool {
        self.origins.is_empty()
    }

    fn save(&self) {
        let lines = self
            .origins
            .iter()
            .map(|(user, origin)| format!("{}:{}", user, origin));
        if let Err(e) = write_lines(&self.path, lines) {
            log::error!("Failed to save tracked origins: {}", e);
        }
    }
}

fn parse_line(line: &str) -> Option<(String, String)> {
    let (user, origin) = line.split_once(':')?;
    let user = user.trim();
    if user.is_empty() {
        return None;
    }
    Some((user.to_lowercase(), origin.trim().to_string()))
}

/// Descriptors must stay on one line
fn sanitize_origin(origin: &str) -> String {
    origin
        .trim()
        .chars()
        .map(|c| if c == '\n' || c == '\r' { ' ' } else { c })
        .collect()
}
