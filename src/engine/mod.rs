// src/engine/mod.rs

//! The multi-subscriber watch engine.
//!
//! This module ties together:
//! - the token/scope store and registration protocol ([`core`])
//! - notification classification and catch-up scans ([`event_handlers`])
//! - the idle lifecycle and background poll loop ([`runtime`])
//!
//! A [`WatchEngine`] is bound to one store root. Subscribers create a
//! [`Token`], register directory and file patterns on it, and read events
//! from it. The native primitive runs only while at least one token is live.

mod core;
mod event_handlers;
mod runtime;

use std::fmt;
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use tokio::runtime::Handle;
use tokio::sync::mpsc;

use crate::config::{WatchConfig, validate_watch_config};
use crate::errors::{Result, WatchError};
use crate::types::AbsPath;
use crate::watch::event::Event;
use crate::watch::ids::TokenId;
use crate::watch::native::{NotifyBackend, WatchBackend};
use crate::watch::scope::{ROOT_DIRECTORY_PATTERN, ScopeSnapshot};

use self::core::EngineInner;

/// Handle to a watch engine. Cheap to clone; clones share one engine.
#[derive(Clone)]
pub struct WatchEngine {
    inner: Arc<EngineInner>,
}

impl fmt::Debug for WatchEngine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WatchEngine")
            .field("root", &self.inner.root)
            .field("config", &self.inner.config)
            .finish_non_exhaustive()
    }
}

impl WatchEngine {
    /// Engine over `root` using the platform's native watcher.
    ///
    /// Must be called from within a Tokio runtime; the engine spawns its
    /// background tasks onto that runtime.
    pub fn new(root: impl AsRef<Path>, config: WatchConfig) -> Result<Self> {
        Self::with_backend(root, config, Arc::new(NotifyBackend))
    }

    pub fn with_backend(
        root: impl AsRef<Path>,
        config: WatchConfig,
        backend: Arc<dyn WatchBackend>,
    ) -> Result<Self> {
        validate_watch_config(&config)?;
        let runtime = Handle::try_current().map_err(|_| WatchError::NoRuntime)?;

        let root = root.as_ref();
        let canonical = root.canonicalize()?;
        if !canonical.is_dir() {
            return Err(WatchError::InvalidPath(format!(
                "store root {:?} is not a directory",
                root
            )));
        }
        let root = AbsPath::new(canonical)?;

        Ok(Self {
            inner: Arc::new(EngineInner::new(root, config, backend, runtime)),
        })
    }

    /// Canonical store root.
    pub fn root(&self) -> &AbsPath {
        &self.inner.root
    }

    pub fn config(&self) -> &WatchConfig {
        &self.inner.config
    }

    /// Register a new subscriber. Starts the engine if it is idle.
    pub fn create_token(&self) -> Result<Token> {
        let new = self.inner.create_token()?;
        Ok(Token {
            id: new.id,
            engine: Arc::clone(&self.inner),
            events: new.events,
            destroyed: new.destroyed,
        })
    }

    /// Same as [`Token::destroy`].
    pub fn destroy_token(&self, token: &Token) {
        token.destroy();
    }

    /// Destroy every token and release the native primitive.
    pub fn shut_down(&self) {
        self.inner.shut_down();
    }

    /// True while the native primitive and poll loop are active.
    pub fn is_running(&self) -> bool {
        self.inner.lock().service.is_some()
    }

    pub fn live_tokens(&self) -> usize {
        self.inner.lock().scopes.len()
    }

    /// Reclaimable token identifier ranges, ascending.
    pub fn free_ranges(&self) -> Vec<(TokenId, TokenId)> {
        self.inner.lock().ids.free_ranges()
    }

    /// Number of distinct native directory registrations.
    pub fn watch_key_count(&self) -> usize {
        self.inner.lock().registry.len()
    }
}

/// One subscription to a [`WatchEngine`].
///
/// Dropping a token destroys it.
pub struct Token {
    id: TokenId,
    engine: Arc<EngineInner>,
    events: mpsc::UnboundedReceiver<Event>,
    destroyed: Arc<AtomicBool>,
}

impl fmt::Debug for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Token")
            .field("id", &self.id)
            .field("destroyed", &self.is_destroyed())
            .finish_non_exhaustive()
    }
}

impl Token {
    pub fn id(&self) -> TokenId {
        self.id
    }

    pub fn is_destroyed(&self) -> bool {
        self.destroyed.load(Ordering::SeqCst)
    }

    /// Watch every directory whose root-relative path matches `pattern`,
    /// now and as matching directories appear.
    pub fn register_directory_pattern(&self, pattern: &str) -> Result<()> {
        self.engine
            .register_directory_pattern(self.id, &self.destroyed, pattern)
    }

    /// Watch the store root itself.
    pub fn register_root_directory(&self) -> Result<()> {
        self.register_directory_pattern(ROOT_DIRECTORY_PATTERN)
    }

    pub fn unregister_directory_pattern(&self, pattern: &str) -> Result<()> {
        self.engine
            .unregister_directory_pattern(self.id, &self.destroyed, pattern)
    }

    pub fn unregister_root_directory(&self) -> Result<()> {
        self.unregister_directory_pattern(ROOT_DIRECTORY_PATTERN)
    }

    /// Report changes to files whose root-relative path matches `pattern`.
    ///
    /// Fails unless a directory pattern is already registered, or if the
    /// pattern is already present.
    pub fn register_file_pattern(&self, pattern: &str) -> Result<()> {
        self.engine
            .register_file_pattern(self.id, &self.destroyed, pattern)
    }

    pub fn unregister_file_pattern(&self, pattern: &str) -> Result<()> {
        self.engine
            .unregister_file_pattern(self.id, &self.destroyed, pattern)
    }

    /// Next event, or `None` once the token is destroyed and drained.
    pub async fn recv(&mut self) -> Option<Event> {
        self.events.recv().await
    }

    pub fn try_recv(&mut self) -> Option<Event> {
        self.events.try_recv().ok()
    }

    pub fn events(&mut self) -> &mut mpsc::UnboundedReceiver<Event> {
        &mut self.events
    }

    /// Copy of this token's patterns and directory entries.
    pub fn snapshot(&self) -> Option<ScopeSnapshot> {
        self.engine.snapshot(self.id, &self.destroyed)
    }

    /// Destroy this token. Idempotent.
    pub fn destroy(&self) {
        self.engine.destroy_token(self.id, &self.destroyed);
    }
}

impl Drop for Token {
    fn drop(&mut self) {
        self.destroy();
    }
}
