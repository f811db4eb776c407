// src/watch/scope.rs

//! Per-token subscription state.

use std::collections::BTreeSet;
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use regex::Regex;
use tokio::sync::mpsc;

use crate::errors::{Result, WatchError};
use crate::types::{AbsPath, RelPath};
use crate::watch::event::Event;
use crate::watch::registry::WatchKey;

/// Pattern matching only the root directory itself.
pub const ROOT_DIRECTORY_PATTERN: &str = "^$";

/// A compiled regular expression that remembers its source text, so that
/// patterns can be compared and removed by value.
#[derive(Clone)]
pub struct Pattern {
    source: String,
    regex: Regex,
}

impl Pattern {
    pub fn new(source: &str) -> Result<Self> {
        Ok(Self {
            source: source.to_string(),
            regex: Regex::new(source)?,
        })
    }

    pub fn as_str(&self) -> &str {
        &self.source
    }

    pub fn matches(&self, rel: &RelPath) -> bool {
        self.regex.is_match(rel.as_str())
    }
}

impl PartialEq for Pattern {
    fn eq(&self, other: &Self) -> bool {
        self.source == other.source
    }
}

impl Eq for Pattern {}

impl fmt::Debug for Pattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Pattern").field(&self.source).finish()
    }
}

/// Binding of one watched directory to its native registration.
#[derive(Debug, Clone)]
pub struct WatchEntry {
    pub dir: AbsPath,
    pub rel: RelPath,
    pub key: WatchKey,
    /// Child directories whose deletion must be treated as a directory
    /// deletion rather than a file deletion.
    pub children: BTreeSet<AbsPath>,
}

impl WatchEntry {
    pub fn new(dir: AbsPath, rel: RelPath, key: WatchKey) -> Self {
        Self {
            dir,
            rel,
            key,
            children: BTreeSet::new(),
        }
    }
}

/// Mutable state of one subscriber, owned by the engine.
pub struct Scope {
    pub(crate) dir_patterns: Vec<Pattern>,
    pub(crate) file_patterns: Vec<Pattern>,
    pub(crate) entries: Vec<WatchEntry>,
    sender: mpsc::UnboundedSender<Event>,
    destroyed: Arc<AtomicBool>,
}

impl fmt::Debug for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Scope")
            .field("dir_patterns", &self.dir_patterns)
            .field("file_patterns", &self.file_patterns)
            .field("entries", &self.entries.len())
            .finish_non_exhaustive()
    }
}

impl Scope {
    pub fn new(sender: mpsc::UnboundedSender<Event>, destroyed: Arc<AtomicBool>) -> Self {
        Self {
            dir_patterns: Vec::new(),
            file_patterns: Vec::new(),
            entries: Vec::new(),
            sender,
            destroyed,
        }
    }

    pub fn matches_dir(&self, rel: &RelPath) -> bool {
        self.dir_patterns.iter().any(|p| p.matches(rel))
    }

    pub fn matches_file(&self, rel: &RelPath) -> bool {
        self.file_patterns.iter().any(|p| p.matches(rel))
    }

    pub fn entry(&self, dir: &AbsPath) -> Option<&WatchEntry> {
        self.entries.iter().find(|e| &e.dir == dir)
    }

    pub fn entry_mut(&mut self, dir: &AbsPath) -> Option<&mut WatchEntry> {
        self.entries.iter_mut().find(|e| &e.dir == dir)
    }

    pub fn owns_key(&self, key: WatchKey) -> bool {
        self.entries.iter().any(|e| e.key == key)
    }

    /// Add an entry unless this scope already watches `dir`.
    ///
    /// Returns true if a new entry was created.
    pub fn add_entry(&mut self, entry: WatchEntry) -> bool {
        if self.entry(&entry.dir).is_some() {
            return false;
        }
        self.entries.push(entry);
        true
    }

    pub fn add_file_pattern(&mut self, pattern: Pattern) -> Result<()> {
        if self.dir_patterns.is_empty() {
            return Err(WatchError::NoDirectoryPattern);
        }
        if self.file_patterns.contains(&pattern) {
            return Err(WatchError::DuplicateFilePattern(pattern.source));
        }
        self.file_patterns.push(pattern);
        Ok(())
    }

    pub fn remove_file_pattern(&mut self, source: &str) -> Result<()> {
        if self.dir_patterns.is_empty() {
            return Err(WatchError::NoDirectoryPattern);
        }
        let before = self.file_patterns.len();
        self.file_patterns.retain(|p| p.source != source);
        if self.file_patterns.len() == before {
            return Err(WatchError::FilePatternNotFound(source.to_string()));
        }
        Ok(())
    }

    /// Queue an event for the subscriber. A dropped receiver is not an error:
    /// the token is about to be destroyed.
    pub fn send(&self, event: Event) {
        let _ = self.sender.send(event);
    }

    pub(crate) fn mark_destroyed(&self) {
        self.destroyed.store(true, Ordering::SeqCst);
    }

    pub fn snapshot(&self) -> ScopeSnapshot {
        ScopeSnapshot {
            dir_patterns: self.dir_patterns.iter().map(|p| p.source.clone()).collect(),
            file_patterns: self.file_patterns.iter().map(|p| p.source.clone()).collect(),
            entries: self.entries.clone(),
        }
    }
}

/// A point-in-time copy of a scope, for inspection and tests.
#[derive(Debug, Clone)]
pub struct ScopeSnapshot {
    pub dir_patterns: Vec<String>,
    pub file_patterns: Vec<String>,
    pub entries: Vec<WatchEntry>,
}

impl ScopeSnapshot {
    pub fn entry(&self, rel: &str) -> Option<&WatchEntry> {
        self.entries.iter().find(|e| e.rel.as_str() == rel)
    }

    pub fn watched_dirs(&self) -> Vec<String> {
        let mut dirs: Vec<String> = self.entries.iter().map(|e| e.rel.to_string()).collect();
        dirs.sort();
        dirs
    }
}
