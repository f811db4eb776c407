// src/engine/event_handlers.rs

//! Classification of native notifications and the catch-up scan.
//!
//! Deletions are checked against the directory bookkeeping first: a path
//! that is itself registered, or recorded as a watched child, is a watched
//! directory going away and tears down its entries. This also covers a
//! directory watched without its parent, whose only notification comes from
//! its own registration. Repeats of a directory deletion are dropped.
//!
//! Every other notification is resolved to the registration that produced
//! it (its parent directory) and then classified as either
//! - a new directory, which is watched for every interested scope and
//!   scanned after a settle delay, or
//! - a file-level change, delivered to scopes whose file patterns match.
//!
//! Overflow skips resolution and is broadcast to the affected scopes.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::{debug, trace, warn};

use crate::engine::core::{EngineInner, list_dir};
use crate::types::{AbsPath, RelPath};
use crate::watch::event::{ChangeKind, Event, Origin};
use crate::watch::native::{NativeBatch, NativeEvent};

impl EngineInner {
    /// Handle one native batch in order. Runs on its own task; batches may
    /// be handled concurrently with each other.
    pub(crate) fn handle_batch(self: &Arc<Self>, batch: NativeBatch) {
        for event in batch {
            self.handle_native(event);
        }
    }

    pub(crate) fn handle_native(self: &Arc<Self>, event: NativeEvent) {
        match event {
            NativeEvent::Created(path) => self.handle_path(path, ChangeKind::Created, false),
            NativeEvent::Modified(path) => self.handle_path(path, ChangeKind::Modified, false),
            NativeEvent::Deleted(path) => self.handle_path(path, ChangeKind::Deleted, false),
            NativeEvent::DeletedDir(path) => self.handle_path(path, ChangeKind::Deleted, true),
            NativeEvent::Overflow(dir) => self.handle_overflow(dir.as_deref()),
        }
    }

    /// `was_dir` is set when the primitive reported the path as a directory.
    fn handle_path(self: &Arc<Self>, path: PathBuf, kind: ChangeKind, was_dir: bool) {
        let Some(parent) = path.parent().and_then(|p| AbsPath::new(p).ok()) else {
            trace!(?path, "notification without a parent directory; dropping");
            return;
        };
        let Some(rel) = RelPath::between(&self.root, &path) else {
            trace!(?path, "notification outside the store root; dropping");
            return;
        };
        // Stat before locking; the entry may already be gone again.
        let created_dir = kind == ChangeKind::Created && path.is_dir();
        let Ok(abs) = AbsPath::new(path) else {
            return;
        };

        let mut state = self.lock();
        match kind {
            ChangeKind::Deleted => {
                if state.registry.key_for(abs.as_path()).is_some() || state.is_watched_child(&abs) {
                    trace!(path = %rel, "watched directory deleted");
                    state.forget_directory(&abs);
                    return;
                }
                if was_dir || state.vanished.contains(&abs) {
                    trace!(path = %rel, "directory already forgotten; dropping deletion");
                    return;
                }
            }
            ChangeKind::Created => {
                state.vanished.remove(&abs);
            }
            ChangeKind::Modified => {}
        }

        let Some(key) = state.registry.key_for(parent.as_path()) else {
            trace!(path = %rel, "no registration owns this notification; dropping");
            return;
        };
        trace!(path = %rel, key = key.0, ?kind, "classifying notification");

        if created_dir {
            if state.discover_directory(&parent, &abs, &rel) {
                drop(state);
                self.schedule_reconcile(abs);
            }
        } else {
            state.dispatch_file(kind, &rel, Origin::Watch);
        }
    }

    fn handle_overflow(&self, dir: Option<&Path>) {
        let state = self.lock();
        let key = dir.and_then(|d| {
            state
                .registry
                .key_for(d)
                .or_else(|| d.parent().and_then(|p| state.registry.key_for(p)))
        });
        warn!(dir = ?dir, "native event queue overflowed; events may have been lost");

        for (id, scope) in state.scopes.iter() {
            let affected = match key {
                Some(key) => scope.owns_key(key),
                None => !scope.entries.is_empty(),
            };
            if affected {
                debug!(token = *id, "delivering overflow");
                scope.send(Event::Overflow);
            }
        }
    }

    /// List `dir` once the settle delay has passed.
    pub(crate) fn schedule_reconcile(self: &Arc<Self>, dir: AbsPath) {
        let engine = Arc::downgrade(self);
        let delay = self.config.settle_delay();
        self.runtime.spawn(async move {
            tokio::time::sleep(delay).await;
            let Some(engine) = engine.upgrade() else {
                return;
            };
            let result = tokio::task::spawn_blocking(move || engine.reconcile(dir)).await;
            if let Err(err) = result {
                warn!(error = %err, "catch-up scan task failed");
            }
        });
    }

    /// Catch-up scan of a newly watched directory.
    ///
    /// Content written before the native registration took effect produced
    /// no notification; this reports it as `Created` with `Origin::Scan`,
    /// and watches (and scans) matching subdirectories on the way down.
    pub(crate) fn reconcile(&self, dir: AbsPath) {
        let mut pending = vec![dir];

        while let Some(dir) = pending.pop() {
            let listing = match list_dir(dir.as_path()) {
                Ok(listing) => listing,
                Err(err) => {
                    debug!(dir = %dir, error = %err, "catch-up scan could not list directory");
                    continue;
                }
            };

            let mut state = self.lock();
            if state.service.is_none() {
                return;
            }
            if state.registry.key_for(dir.as_path()).is_none() {
                debug!(dir = %dir, "directory no longer watched; skipping catch-up scan");
                continue;
            }

            for (path, is_dir) in listing {
                let Some(rel) = RelPath::between(&self.root, &path) else {
                    continue;
                };
                let Ok(abs) = AbsPath::new(path) else {
                    continue;
                };
                state.vanished.remove(&abs);
                if is_dir {
                    if state.discover_directory(&dir, &abs, &rel) {
                        pending.push(abs);
                    }
                } else {
                    state.dispatch_file(ChangeKind::Created, &rel, Origin::Scan);
                }
            }
        }
    }
}
