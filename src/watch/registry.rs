// src/watch/registry.rs

//! Directory-to-registration cache.
//!
//! The native primitive has no notion of a shareable handle, so the engine
//! keeps one `WatchKey` per absolute directory. Registering a directory that
//! is already registered returns its existing key and does not touch the
//! primitive.

use std::collections::HashMap;
use std::path::Path;

use tracing::debug;

use crate::errors::Result;
use crate::types::AbsPath;
use crate::watch::native::WatchService;

/// Handle for one native directory registration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct WatchKey(pub u64);

#[derive(Debug, Default)]
pub struct Registry {
    by_dir: HashMap<AbsPath, WatchKey>,
    next: u64,
}

impl Registry {
    pub fn register(&mut self, service: &mut dyn WatchService, dir: &AbsPath) -> Result<WatchKey> {
        if let Some(&key) = self.by_dir.get(dir) {
            return Ok(key);
        }

        service.watch(dir.as_path())?;
        let key = WatchKey(self.next);
        self.next += 1;
        self.by_dir.insert(dir.clone(), key);
        debug!(dir = %dir, key = key.0, "registered native watch");
        Ok(key)
    }

    /// Drop the registration for `dir`, if any.
    ///
    /// Failures are logged, not returned: the directory is usually already
    /// gone, and the primitive forgets it on its own.
    pub fn cancel(&mut self, service: &mut dyn WatchService, dir: &AbsPath) {
        let Some(key) = self.by_dir.remove(dir) else {
            return;
        };
        if let Err(err) = service.unwatch(dir.as_path()) {
            debug!(dir = %dir, error = %err, "unwatch failed; registration already gone");
        } else {
            debug!(dir = %dir, key = key.0, "cancelled native watch");
        }
    }

    pub fn key_for(&self, dir: &Path) -> Option<WatchKey> {
        self.by_dir.get(dir).copied()
    }

    pub fn len(&self) -> usize {
        self.by_dir.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_dir.is_empty()
    }

    pub fn clear(&mut self) {
        if !self.is_empty() {
            debug!(count = self.len(), "discarding native registrations");
        }
        self.by_dir.clear();
    }
}
