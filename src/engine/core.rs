// src/engine/core.rs

//! Shared engine state and the directory registration protocol.
//!
//! Everything mutable lives in [`State`] behind one mutex. Every operation
//! (public calls, per-notification handlers, catch-up scans) takes that lock
//! for the duration of its mutation and never awaits while holding it.
//! Filesystem walks happen before the lock is taken.

use std::collections::{HashMap, HashSet};
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::runtime::Handle;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, warn};
use walkdir::WalkDir;

use crate::config::WatchConfig;
use crate::errors::{Result, WatchError};
use crate::types::{AbsPath, RelPath};
use crate::watch::event::{ChangeKind, Event, Origin};
use crate::watch::ids::{IdAllocator, TokenId};
use crate::watch::native::{WatchBackend, WatchService};
use crate::watch::registry::Registry;
use crate::watch::scope::{Pattern, Scope, ScopeSnapshot, WatchEntry};

pub(crate) struct EngineInner {
    pub(crate) root: AbsPath,
    pub(crate) config: WatchConfig,
    pub(crate) backend: Arc<dyn WatchBackend>,
    pub(crate) runtime: Handle,
    state: Mutex<State>,
}

/// The engine's single critical section.
pub(crate) struct State {
    pub(crate) scopes: HashMap<TokenId, Scope>,
    pub(crate) ids: IdAllocator,
    /// Open native primitive; `None` while idle.
    pub(crate) service: Option<Box<dyn WatchService>>,
    pub(crate) registry: Registry,
    /// Background poll loop; `None` while idle.
    pub(crate) poll_task: Option<JoinHandle<()>>,
    /// Watched directories torn down after a deletion. Later deletion
    /// notifications for these paths are repeats, not file events.
    pub(crate) vanished: HashSet<AbsPath>,
}

/// What a new token needs from the engine.
pub(crate) struct NewToken {
    pub(crate) id: TokenId,
    pub(crate) events: mpsc::UnboundedReceiver<Event>,
    pub(crate) destroyed: Arc<AtomicBool>,
}

impl EngineInner {
    pub(crate) fn new(
        root: AbsPath,
        config: WatchConfig,
        backend: Arc<dyn WatchBackend>,
        runtime: Handle,
    ) -> Self {
        Self {
            root,
            state: Mutex::new(State {
                scopes: HashMap::new(),
                ids: IdAllocator::new(config.max_tokens),
                service: None,
                registry: Registry::default(),
                poll_task: None,
                vanished: HashSet::new(),
            }),
            config,
            backend,
            runtime,
        }
    }

    /// Take the engine lock. A panic in another holder leaves the state
    /// consistent at the granularity of one mutation, so poisoning is
    /// ignored.
    pub(crate) fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub(crate) fn create_token(self: &Arc<Self>) -> Result<NewToken> {
        let mut guard = self.lock();
        let state = &mut *guard;

        let id = state.ids.allocate()?;
        if state.service.is_none() {
            if let Err(err) = self.start(state) {
                state.ids.release(id);
                return Err(err);
            }
        }

        let (tx, rx) = mpsc::unbounded_channel();
        let destroyed = Arc::new(AtomicBool::new(false));
        state.scopes.insert(id, Scope::new(tx, Arc::clone(&destroyed)));
        debug!(token = id, live = state.scopes.len(), "created token");

        Ok(NewToken {
            id,
            events: rx,
            destroyed,
        })
    }

    /// Destroy the token `id`. `destroyed` is the token's own flag; it is
    /// flipped under the lock so that a recycled identifier is never torn
    /// down by a stale handle.
    pub(crate) fn destroy_token(&self, id: TokenId, destroyed: &AtomicBool) {
        let mut guard = self.lock();
        if destroyed.swap(true, Ordering::SeqCst) {
            return;
        }
        let state = &mut *guard;

        let Some(scope) = state.scopes.remove(&id) else {
            return;
        };
        let dirs: Vec<AbsPath> = scope.entries.iter().map(|e| e.dir.clone()).collect();
        // Dropping the scope drops the sender and closes the token's stream.
        drop(scope);

        state.release_unreferenced(dirs);
        state.ids.release(id);
        debug!(token = id, live = state.scopes.len(), "destroyed token");

        if state.scopes.is_empty() {
            self.stop(state);
        }
    }

    pub(crate) fn shut_down(&self) {
        let mut guard = self.lock();
        let state = &mut *guard;

        let State { scopes, ids, .. } = &mut *state;
        for (id, scope) in scopes.drain() {
            scope.mark_destroyed();
            ids.release(id);
        }
        self.stop(state);
    }

    pub(crate) fn register_directory_pattern(
        &self,
        id: TokenId,
        destroyed: &AtomicBool,
        source: &str,
    ) -> Result<()> {
        let pattern = Pattern::new(source)?;
        let dirs = walk_dirs(&self.root);

        let mut guard = self.lock();
        let State {
            scopes,
            registry,
            service,
            ..
        } = &mut *guard;

        let scope = live_scope(scopes, id, destroyed)?;
        let Some(svc) = service.as_mut() else {
            debug!(token = id, pattern = source, "engine idle; ignoring directory pattern");
            return Ok(());
        };

        scope.dir_patterns.push(pattern.clone());

        for (dir, rel) in &dirs {
            if !pattern.matches(rel) {
                continue;
            }
            match registry.register(&mut **svc, dir) {
                Ok(key) => {
                    if scope.add_entry(WatchEntry::new(dir.clone(), rel.clone(), key)) {
                        debug!(token = id, dir = %rel, key = key.0, "watching directory");
                    }
                }
                Err(err) => {
                    warn!(token = id, dir = %dir, error = %err, "failed to watch directory; skipping");
                }
            }
        }

        // Record children of every watched directory, matched or not, so that
        // their deletion is recognized as a directory deletion.
        for (dir, rel) in &dirs {
            if rel.is_root() {
                continue;
            }
            let Some(parent) = dir.parent() else {
                continue;
            };
            if let Some(entry) = scope.entry_mut(&parent) {
                entry.children.insert(dir.clone());
            }
        }

        Ok(())
    }

    pub(crate) fn unregister_directory_pattern(
        &self,
        id: TokenId,
        destroyed: &AtomicBool,
        source: &str,
    ) -> Result<()> {
        let pattern = Pattern::new(source)?;

        let mut guard = self.lock();
        let state = &mut *guard;
        let scope = live_scope(&mut state.scopes, id, destroyed)?;

        scope.dir_patterns.retain(|p| p != &pattern);
        let (removed, kept): (Vec<WatchEntry>, Vec<WatchEntry>) = std::mem::take(&mut scope.entries)
            .into_iter()
            .partition(|e| pattern.matches(&e.rel));
        scope.entries = kept;

        debug!(token = id, pattern = source, removed = removed.len(), "unregistered directory pattern");
        state.release_unreferenced(removed.into_iter().map(|e| e.dir));
        Ok(())
    }

    pub(crate) fn register_file_pattern(
        &self,
        id: TokenId,
        destroyed: &AtomicBool,
        source: &str,
    ) -> Result<()> {
        let pattern = Pattern::new(source)?;
        let mut guard = self.lock();
        live_scope(&mut guard.scopes, id, destroyed)?.add_file_pattern(pattern)
    }

    pub(crate) fn unregister_file_pattern(
        &self,
        id: TokenId,
        destroyed: &AtomicBool,
        source: &str,
    ) -> Result<()> {
        let mut guard = self.lock();
        live_scope(&mut guard.scopes, id, destroyed)?.remove_file_pattern(source)
    }

    pub(crate) fn snapshot(&self, id: TokenId, destroyed: &AtomicBool) -> Option<ScopeSnapshot> {
        let mut guard = self.lock();
        live_scope(&mut guard.scopes, id, destroyed)
            .ok()
            .map(|scope| scope.snapshot())
    }
}

fn live_scope<'a>(
    scopes: &'a mut HashMap<TokenId, Scope>,
    id: TokenId,
    destroyed: &AtomicBool,
) -> Result<&'a mut Scope> {
    if destroyed.load(Ordering::SeqCst) {
        return Err(WatchError::TokenDestroyed(id));
    }
    scopes.get_mut(&id).ok_or(WatchError::TokenDestroyed(id))
}

impl State {
    /// Cancel the native registration of each directory no live scope still
    /// has an entry for.
    pub(crate) fn release_unreferenced(&mut self, dirs: impl IntoIterator<Item = AbsPath>) {
        let Some(svc) = self.service.as_mut() else {
            return;
        };
        for dir in dirs {
            if self.scopes.values().any(|s| s.entry(&dir).is_some()) {
                continue;
            }
            self.registry.cancel(&mut **svc, &dir);
        }
    }

    /// A directory appeared under `parent`. Record it as a child of every
    /// entry for `parent` and start watching it for every scope whose
    /// directory patterns match.
    ///
    /// Returns true if at least one scope gained a new entry.
    pub(crate) fn discover_directory(&mut self, parent: &AbsPath, dir: &AbsPath, rel: &RelPath) -> bool {
        let State {
            scopes,
            registry,
            service,
            ..
        } = self;
        let Some(svc) = service.as_mut() else {
            return false;
        };

        let mut added = false;
        for (id, scope) in scopes.iter_mut() {
            if let Some(entry) = scope.entry_mut(parent) {
                entry.children.insert(dir.clone());
            }
            if !scope.matches_dir(rel) {
                continue;
            }
            match registry.register(&mut **svc, dir) {
                Ok(key) => {
                    if scope.add_entry(WatchEntry::new(dir.clone(), rel.clone(), key)) {
                        debug!(token = *id, dir = %rel, key = key.0, "watching new directory");
                        added = true;
                    }
                }
                Err(err) => {
                    debug!(token = *id, dir = %dir, error = %err, "new directory vanished before it could be watched");
                    continue;
                }
            }
        }
        added
    }

    /// True if some entry records `dir` as one of its watched children.
    pub(crate) fn is_watched_child(&self, dir: &AbsPath) -> bool {
        self.scopes
            .values()
            .any(|s| s.entries.iter().any(|e| e.children.contains(dir)))
    }

    /// A watched directory disappeared. Drop its entries (and those of any
    /// directory below it) from every scope, and forget it as a child.
    ///
    /// Every torn-down directory is remembered in `vanished` until the path
    /// is created again.
    pub(crate) fn forget_directory(&mut self, dir: &AbsPath) {
        let mut gone = Vec::new();
        for (id, scope) in self.scopes.iter_mut() {
            scope.entries.retain(|e| {
                if e.dir.as_path().starts_with(dir.as_path()) {
                    debug!(token = *id, dir = %e.rel, "watched directory deleted");
                    gone.push(e.dir.clone());
                    false
                } else {
                    true
                }
            });
            for entry in scope.entries.iter_mut() {
                entry.children.remove(dir);
            }
        }
        gone.sort();
        gone.dedup();
        self.vanished.insert(dir.clone());
        self.vanished.extend(gone.iter().cloned());
        self.release_unreferenced(gone);
    }

    /// Deliver a file-level change to every scope whose file patterns match.
    pub(crate) fn dispatch_file(&self, kind: ChangeKind, rel: &RelPath, origin: Origin) {
        for (id, scope) in self.scopes.iter() {
            if scope.matches_file(rel) {
                debug!(token = *id, path = %rel, ?kind, ?origin, "dispatching event");
                scope.send(kind.into_event(rel.clone(), origin));
            }
        }
    }
}

/// Every directory under `root`, including `root` itself.
pub(crate) fn walk_dirs(root: &AbsPath) -> Vec<(AbsPath, RelPath)> {
    WalkDir::new(root.as_path())
        .follow_links(false)
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_dir())
        .filter_map(|e| {
            let rel = RelPath::between(root, e.path())?;
            let abs = AbsPath::new(e.into_path()).ok()?;
            Some((abs, rel))
        })
        .collect()
}

/// Immediate children of `dir` as `(path, is_dir)`.
pub(crate) fn list_dir(dir: &Path) -> std::io::Result<Vec<(std::path::PathBuf, bool)>> {
    let mut out = Vec::new();
    for entry in std::fs::read_dir(dir)? {
        let entry = entry?;
        let is_dir = entry.file_type().map(|t| t.is_dir()).unwrap_or(false);
        out.push((entry.path(), is_dir));
    }
    Ok(out)
}
