// src/watch/patterns.rs

//! Path templates: the declarative path DSL records are stored under.
//!
//! A template such as
//!
//! ```text
//! users/{user:uuid}/posts/{post}.json
//! ```
//!
//! is split into `/`-separated segments. Each segment compiles to one regular
//! expression fragment: literal text is escaped, `{name}` matches any
//! non-empty string without `/`, and `{name:uuid}` matches a hyphenated UUID.
//!
//! From a template we derive the directory patterns a token registers (the
//! root and every directory prefix, so that new directories at any level are
//! picked up) and the single file pattern that identifies a record.

use std::collections::{BTreeMap, HashSet};
use std::fmt;
use std::path::PathBuf;

use regex::Regex;
use walkdir::WalkDir;

use crate::errors::{Result, WatchError};
use crate::types::{AbsPath, RelPath};

const UUID_FRAGMENT: &str =
    "[0-9a-fA-F]{8}-[0-9a-fA-F]{4}-[0-9a-fA-F]{4}-[0-9a-fA-F]{4}-[0-9a-fA-F]{12}";
const STRING_FRAGMENT: &str = "[^/]+";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaceholderKind {
    String,
    Uuid,
}

impl PlaceholderKind {
    fn fragment(self) -> &'static str {
        match self {
            PlaceholderKind::String => STRING_FRAGMENT,
            PlaceholderKind::Uuid => UUID_FRAGMENT,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Part {
    Literal(String),
    Placeholder { name: String, kind: PlaceholderKind },
}

/// Values extracted from a record path, keyed by placeholder name.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RecordKey(BTreeMap<String, String>);

impl RecordKey {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, name: &str, value: impl Into<String>) -> Self {
        self.0.insert(name.to_string(), value.into());
        self
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.0.get(name).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Display for RecordKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parts: Vec<String> = self.0.iter().map(|(k, v)| format!("{k}={v}")).collect();
        write!(f, "{{{}}}", parts.join(", "))
    }
}

/// A compiled path template.
#[derive(Clone)]
pub struct PathTemplate {
    source: String,
    segments: Vec<Vec<Part>>,
    file_regex: Regex,
}

impl fmt::Debug for PathTemplate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PathTemplate")
            .field("source", &self.source)
            .finish_non_exhaustive()
    }
}

impl PathTemplate {
    pub fn parse(source: &str) -> Result<Self> {
        if source.is_empty() {
            return Err(WatchError::InvalidTemplate("template is empty".to_string()));
        }

        let mut seen = HashSet::new();
        let mut segments = Vec::new();
        for raw in source.split('/') {
            if raw.is_empty() {
                return Err(WatchError::InvalidTemplate(format!(
                    "template {source:?} contains an empty segment"
                )));
            }
            let parts = parse_segment(raw)?;
            for part in &parts {
                if let Part::Placeholder { name, .. } = part {
                    if !seen.insert(name.clone()) {
                        return Err(WatchError::InvalidTemplate(format!(
                            "placeholder {{{name}}} used twice in {source:?}"
                        )));
                    }
                }
            }
            segments.push(parts);
        }

        let file_regex = Regex::new(&anchored(&segments, true))?;
        Ok(Self {
            source: source.to_string(),
            segments,
            file_regex,
        })
    }

    pub fn as_str(&self) -> &str {
        &self.source
    }

    /// Directory patterns, shallowest first: `^$` for the root, then one per
    /// directory prefix of the template.
    pub fn directory_patterns(&self) -> Vec<String> {
        (0..self.segments.len())
            .map(|depth| anchored(&self.segments[..depth], false))
            .collect()
    }

    /// Pattern matching record files.
    pub fn file_pattern(&self) -> String {
        self.file_regex.as_str().to_string()
    }

    pub fn matches(&self, rel: &RelPath) -> bool {
        self.file_regex.is_match(rel.as_str())
    }

    pub fn extract(&self, rel: &RelPath) -> Option<RecordKey> {
        let caps = self.file_regex.captures(rel.as_str())?;
        let mut key = RecordKey::new();
        for name in self.file_regex.capture_names().flatten() {
            if let Some(m) = caps.name(name) {
                key.0.insert(name.to_string(), m.as_str().to_string());
            }
        }
        Some(key)
    }

    /// Inverse of [`extract`](Self::extract): build the record path for `key`.
    pub fn render(&self, key: &RecordKey) -> Result<RelPath> {
        let mut out = Vec::with_capacity(self.segments.len());
        for parts in &self.segments {
            let mut segment = String::new();
            for part in parts {
                match part {
                    Part::Literal(text) => segment.push_str(text),
                    Part::Placeholder { name, .. } => {
                        let value = key.get(name).ok_or_else(|| {
                            WatchError::InvalidTemplate(format!("missing value for {{{name}}}"))
                        })?;
                        segment.push_str(value);
                    }
                }
            }
            out.push(segment);
        }
        let rel = RelPath::new(out.join("/"))?;
        if !self.matches(&rel) {
            return Err(WatchError::InvalidTemplate(format!(
                "key {key} does not produce a path matching {:?}",
                self.source
            )));
        }
        Ok(rel)
    }

    /// All existing files under `root` that match this template.
    pub fn collect_matching(&self, root: &AbsPath) -> Vec<(RelPath, PathBuf)> {
        let mut files = Vec::new();
        for entry in WalkDir::new(root.as_path())
            .follow_links(false)
            .into_iter()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_type().is_file())
        {
            if let Some(rel) = RelPath::between(root, entry.path()) {
                if self.matches(&rel) {
                    files.push((rel, entry.into_path()));
                }
            }
        }
        files.sort();
        files
    }
}

fn anchored(segments: &[Vec<Part>], capture: bool) -> String {
    let body: Vec<String> = segments
        .iter()
        .map(|parts| segment_regex(parts, capture))
        .collect();
    format!("^{}$", body.join("/"))
}

fn segment_regex(parts: &[Part], capture: bool) -> String {
    let mut out = String::new();
    for part in parts {
        match part {
            Part::Literal(text) => out.push_str(&regex::escape(text)),
            Part::Placeholder { name, kind } if capture => {
                out.push_str(&format!("(?P<{name}>{})", kind.fragment()));
            }
            Part::Placeholder { kind, .. } => {
                out.push_str(&format!("(?:{})", kind.fragment()));
            }
        }
    }
    out
}

fn parse_segment(raw: &str) -> Result<Vec<Part>> {
    let mut parts = Vec::new();
    let mut rest = raw;

    while !rest.is_empty() {
        match rest.find('{') {
            Some(0) => {
                let close = rest.find('}').ok_or_else(|| {
                    WatchError::InvalidTemplate(format!("unclosed '{{' in segment {raw:?}"))
                })?;
                parts.push(parse_placeholder(&rest[1..close], raw)?);
                rest = &rest[close + 1..];
                if matches!(parts.last(), Some(Part::Placeholder { .. }))
                    && rest.starts_with('{')
                {
                    return Err(WatchError::InvalidTemplate(format!(
                        "adjacent placeholders are ambiguous in segment {raw:?}"
                    )));
                }
            }
            Some(idx) => {
                push_literal(&mut parts, &rest[..idx], raw)?;
                rest = &rest[idx..];
            }
            None => {
                push_literal(&mut parts, rest, raw)?;
                rest = "";
            }
        }
    }

    Ok(parts)
}

fn push_literal(parts: &mut Vec<Part>, text: &str, raw: &str) -> Result<()> {
    if text.contains('}') {
        return Err(WatchError::InvalidTemplate(format!(
            "unmatched '}}' in segment {raw:?}"
        )));
    }
    if text == "." || text == ".." {
        return Err(WatchError::InvalidTemplate(format!(
            "segment {raw:?} is not a valid path component"
        )));
    }
    parts.push(Part::Literal(text.to_string()));
    Ok(())
}

fn parse_placeholder(inner: &str, raw: &str) -> Result<Part> {
    let (name, kind) = match inner.split_once(':') {
        Some((name, "uuid")) => (name, PlaceholderKind::Uuid),
        Some((name, "string")) => (name, PlaceholderKind::String),
        Some((_, other)) => {
            return Err(WatchError::InvalidTemplate(format!(
                "unknown placeholder kind {other:?} in segment {raw:?} (expected \"uuid\" or \"string\")"
            )));
        }
        None => (inner, PlaceholderKind::String),
    };

    let valid = !name.is_empty()
        && !name.starts_with(|c: char| c.is_ascii_digit())
        && name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_');
    if !valid {
        return Err(WatchError::InvalidTemplate(format!(
            "invalid placeholder name {name:?} in segment {raw:?}"
        )));
    }

    Ok(Part::Placeholder {
        name: name.to_string(),
        kind,
    })
}
