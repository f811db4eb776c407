// src/types.rs

//! Path value types shared by the engine, templates and records.

use std::borrow::Borrow;
use std::fmt;
use std::path::{Component, Path, PathBuf};
use std::str::FromStr;

use crate::errors::{Result, WatchError};

/// An absolute filesystem path.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct AbsPath(PathBuf);

impl AbsPath {
    /// Wrap `path`, rejecting relative paths.
    pub fn new(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        if !path.is_absolute() {
            return Err(WatchError::InvalidPath(format!(
                "expected an absolute path, got {:?}",
                path
            )));
        }
        Ok(Self(path))
    }

    pub fn as_path(&self) -> &Path {
        &self.0
    }

    pub fn join(&self, rel: &RelPath) -> AbsPath {
        if rel.is_root() {
            return self.clone();
        }
        AbsPath(self.0.join(rel.as_str()))
    }

    pub fn parent(&self) -> Option<AbsPath> {
        self.0.parent().map(|p| AbsPath(p.to_path_buf()))
    }
}

impl AsRef<Path> for AbsPath {
    fn as_ref(&self) -> &Path {
        &self.0
    }
}

impl Borrow<Path> for AbsPath {
    fn borrow(&self) -> &Path {
        &self.0
    }
}

impl fmt::Display for AbsPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.display())
    }
}

/// A path relative to the store root, always with forward slashes.
///
/// The empty string denotes the root itself. Relative paths never start or
/// end with `/` and never contain `.` or `..` segments.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct RelPath(String);

impl RelPath {
    pub fn root() -> Self {
        Self(String::new())
    }

    pub fn new(s: impl Into<String>) -> Result<Self> {
        let s = s.into();
        if s.is_empty() {
            return Ok(Self::root());
        }
        if s.starts_with('/') || s.ends_with('/') || s.contains('\\') {
            return Err(WatchError::InvalidPath(format!(
                "relative path {s:?} must use inner forward slashes only"
            )));
        }
        if s.split('/').any(|seg| seg.is_empty() || seg == "." || seg == "..") {
            return Err(WatchError::InvalidPath(format!(
                "relative path {s:?} contains an empty, '.' or '..' segment"
            )));
        }
        Ok(Self(s))
    }

    /// Express `path` relative to `root`.
    ///
    /// - First we try a direct `strip_prefix(root)`.
    /// - If that fails (symlinked prefixes such as macOS `/private/var`),
    ///   we canonicalize both paths and try again.
    ///
    /// Returns `None` if the path cannot be related to `root`.
    pub fn between(root: &AbsPath, path: &Path) -> Option<RelPath> {
        if let Ok(rel) = path.strip_prefix(root.as_path()) {
            return Self::from_components(rel);
        }

        if let (Ok(root_canon), Ok(path_canon)) =
            (root.as_path().canonicalize(), path.canonicalize())
        {
            if let Ok(rel) = path_canon.strip_prefix(&root_canon) {
                return Self::from_components(rel);
            }
        }

        None
    }

    fn from_components(rel: &Path) -> Option<RelPath> {
        let mut parts = Vec::new();
        for component in rel.components() {
            match component {
                Component::Normal(seg) => parts.push(seg.to_str()?.to_string()),
                Component::CurDir => {}
                _ => return None,
            }
        }
        Some(RelPath(parts.join("/")))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_root(&self) -> bool {
        self.0.is_empty()
    }

    /// Parent directory, or `None` for the root.
    pub fn parent(&self) -> Option<RelPath> {
        if self.is_root() {
            return None;
        }
        match self.0.rfind('/') {
            Some(idx) => Some(RelPath(self.0[..idx].to_string())),
            None => Some(RelPath::root()),
        }
    }

    /// Last segment, or `None` for the root.
    pub fn file_name(&self) -> Option<&str> {
        if self.is_root() {
            return None;
        }
        self.0.rsplit('/').next()
    }
}

impl FromStr for RelPath {
    type Err = WatchError;

    fn from_str(s: &str) -> Result<Self> {
        RelPath::new(s)
    }
}

impl fmt::Display for RelPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
