// src/watch/native.rs

//! The flat, single-directory watch primitive the engine builds on.
//!
//! A [`WatchBackend`] opens a [`WatchService`] together with the receiving
//! end of its notification stream. The service only ever watches individual
//! directories non-recursively; recursion is the engine's job.

use std::fmt;
use std::path::{Path, PathBuf};

use notify::event::{ModifyKind, RemoveKind, RenameMode};
use notify::{Config, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::errors::Result;

/// One notification as reported by the primitive, in absolute paths.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NativeEvent {
    Created(PathBuf),
    Modified(PathBuf),
    Deleted(PathBuf),
    /// The primitive knows the deleted entry was a directory.
    DeletedDir(PathBuf),
    /// Events were lost. Carries the affected directory when the primitive
    /// knows it, `None` when every registration may be affected.
    Overflow(Option<PathBuf>),
}

pub type NativeBatch = Vec<NativeEvent>;
pub type NativeReceiver = mpsc::UnboundedReceiver<NativeBatch>;

/// An open watch primitive. Dropping it closes the primitive and ends the
/// notification stream.
pub trait WatchService: Send {
    fn watch(&mut self, dir: &Path) -> Result<()>;
    fn unwatch(&mut self, dir: &Path) -> Result<()>;
}

/// Factory for watch primitives. The engine opens a fresh one every time it
/// leaves the idle state.
pub trait WatchBackend: Send + Sync + fmt::Debug {
    fn open(&self) -> Result<(Box<dyn WatchService>, NativeReceiver)>;
}

/// Backend using the platform's recommended `notify` watcher in
/// non-recursive mode.
#[derive(Debug, Clone, Copy, Default)]
pub struct NotifyBackend;

impl WatchBackend for NotifyBackend {
    fn open(&self) -> Result<(Box<dyn WatchService>, NativeReceiver)> {
        let (event_tx, event_rx) = mpsc::unbounded_channel::<NativeBatch>();

        // Called synchronously on notify's own thread.
        let watcher = RecommendedWatcher::new(
            move |res: notify::Result<notify::Event>| match res {
                Ok(event) => {
                    let batch = translate(event);
                    if batch.is_empty() {
                        return;
                    }
                    if event_tx.send(batch).is_err() {
                        debug!("native event receiver gone; dropping batch");
                    }
                }
                Err(err) => {
                    warn!("native watch error: {err}");
                }
            },
            Config::default(),
        )?;

        Ok((Box::new(NotifyService { watcher }), event_rx))
    }
}

struct NotifyService {
    watcher: RecommendedWatcher,
}

impl WatchService for NotifyService {
    fn watch(&mut self, dir: &Path) -> Result<()> {
        self.watcher.watch(dir, RecursiveMode::NonRecursive)?;
        Ok(())
    }

    fn unwatch(&mut self, dir: &Path) -> Result<()> {
        self.watcher.unwatch(dir)?;
        Ok(())
    }
}

/// Map a `notify` event onto the primitive-level notification set.
///
/// Renames are reported as a deletion of the old name and a creation of the
/// new one. Access events carry no existence change and are dropped.
pub fn translate(event: notify::Event) -> NativeBatch {
    if event.need_rescan() {
        return vec![NativeEvent::Overflow(event.paths.into_iter().next())];
    }

    let notify::Event { kind, paths, .. } = event;
    match kind {
        EventKind::Create(_) => paths.into_iter().map(NativeEvent::Created).collect(),
        EventKind::Remove(RemoveKind::Folder) => {
            paths.into_iter().map(NativeEvent::DeletedDir).collect()
        }
        EventKind::Remove(_) => paths.into_iter().map(NativeEvent::Deleted).collect(),
        EventKind::Modify(ModifyKind::Name(RenameMode::From)) => {
            paths.into_iter().map(NativeEvent::Deleted).collect()
        }
        EventKind::Modify(ModifyKind::Name(RenameMode::To)) => {
            paths.into_iter().map(NativeEvent::Created).collect()
        }
        EventKind::Modify(ModifyKind::Name(RenameMode::Both)) => {
            let mut paths = paths.into_iter();
            let mut batch = Vec::with_capacity(2);
            if let Some(from) = paths.next() {
                batch.push(NativeEvent::Deleted(from));
            }
            if let Some(to) = paths.next() {
                batch.push(NativeEvent::Created(to));
            }
            batch
        }
        // Rename with unknown direction: decide by what is on disk now.
        EventKind::Modify(ModifyKind::Name(_)) => paths
            .into_iter()
            .map(|p| {
                if p.exists() {
                    NativeEvent::Created(p)
                } else {
                    NativeEvent::Deleted(p)
                }
            })
            .collect(),
        EventKind::Modify(_) => paths.into_iter().map(NativeEvent::Modified).collect(),
        EventKind::Access(_) | EventKind::Any | EventKind::Other => Vec::new(),
    }
}
