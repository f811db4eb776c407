// src/watch/event.rs

//! Notifications delivered on a token's event stream.

use std::fmt;

use crate::types::RelPath;

/// Where a `Created`/`Modified` notification came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Origin {
    /// Delivered by the native watch primitive in real time.
    Watch,
    /// Found by the catch-up scan of a freshly watched directory.
    Scan,
}

impl fmt::Display for Origin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Origin::Watch => f.write_str("watch"),
            Origin::Scan => f.write_str("scan"),
        }
    }
}

/// One observed path-level transition.
///
/// The engine emits `Event<()>`; consumers that re-read the file can map the
/// placeholder into a parsed payload with [`Event::map_content`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event<T = ()> {
    Created {
        path: RelPath,
        content: T,
        origin: Origin,
    },
    Modified {
        path: RelPath,
        content: T,
        origin: Origin,
    },
    Deleted {
        path: RelPath,
        origin: Origin,
    },
    /// The native primitive dropped events; the subscriber's view of the
    /// affected subtree may be stale.
    Overflow,
}

impl<T> Event<T> {
    /// Record identity, if this event carries one.
    pub fn path(&self) -> Option<&RelPath> {
        match self {
            Event::Created { path, .. }
            | Event::Modified { path, .. }
            | Event::Deleted { path, .. } => Some(path),
            Event::Overflow => None,
        }
    }

    pub fn origin(&self) -> Option<Origin> {
        match self {
            Event::Created { origin, .. }
            | Event::Modified { origin, .. }
            | Event::Deleted { origin, .. } => Some(*origin),
            Event::Overflow => None,
        }
    }

    pub fn map_content<U>(self, f: impl FnOnce(T) -> U) -> Event<U> {
        match self {
            Event::Created { path, content, origin } => Event::Created {
                path,
                content: f(content),
                origin,
            },
            Event::Modified { path, content, origin } => Event::Modified {
                path,
                content: f(content),
                origin,
            },
            Event::Deleted { path, origin } => Event::Deleted { path, origin },
            Event::Overflow => Event::Overflow,
        }
    }
}

/// The kind of a file-level transition, before it becomes an [`Event`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeKind {
    Created,
    Modified,
    Deleted,
}

impl ChangeKind {
    pub(crate) fn into_event(self, path: RelPath, origin: Origin) -> Event {
        match self {
            ChangeKind::Created => Event::Created {
                path,
                content: (),
                origin,
            },
            ChangeKind::Modified => Event::Modified {
                path,
                content: (),
                origin,
            },
            ChangeKind::Deleted => Event::Deleted { path, origin },
        }
    }
}
