// src/watch/mock.rs

//! In-memory watch backend for tests.
//!
//! Nothing is observed on disk; tests inject notifications with
//! [`MockBackend::emit`] and inspect which directories are registered.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use tokio::sync::mpsc;

use super::native::{NativeBatch, NativeEvent, NativeReceiver, WatchBackend, WatchService};
use crate::errors::{Result, WatchError};

#[derive(Debug, Default)]
struct MockState {
    watched: BTreeSet<PathBuf>,
    sender: Option<mpsc::UnboundedSender<NativeBatch>>,
    opened: usize,
    watch_calls: usize,
    fail_open: bool,
    refused: BTreeSet<PathBuf>,
}

#[derive(Debug, Clone, Default)]
pub struct MockBackend {
    state: Arc<Mutex<MockState>>,
}

impl MockBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the next `open` calls fail.
    pub fn fail_open(&self, fail: bool) {
        self.state.lock().unwrap().fail_open = fail;
    }

    /// Make `watch` fail for `dir`, as if it vanished before registration.
    pub fn refuse_watch(&self, dir: impl AsRef<Path>) {
        self.state.lock().unwrap().refused.insert(dir.as_ref().to_path_buf());
    }

    /// Deliver one batch to the engine. Returns false if no primitive is open.
    pub fn emit(&self, batch: impl IntoIterator<Item = NativeEvent>) -> bool {
        let state = self.state.lock().unwrap();
        match &state.sender {
            Some(tx) => tx.send(batch.into_iter().collect()).is_ok(),
            None => false,
        }
    }

    pub fn is_open(&self) -> bool {
        self.state.lock().unwrap().sender.is_some()
    }

    pub fn open_count(&self) -> usize {
        self.state.lock().unwrap().opened
    }

    /// Number of times a directory was handed to the primitive.
    pub fn watch_calls(&self) -> usize {
        self.state.lock().unwrap().watch_calls
    }

    pub fn is_watched(&self, dir: impl AsRef<Path>) -> bool {
        self.state.lock().unwrap().watched.contains(dir.as_ref())
    }

    pub fn watched(&self) -> Vec<PathBuf> {
        self.state.lock().unwrap().watched.iter().cloned().collect()
    }
}

impl WatchBackend for MockBackend {
    fn open(&self) -> Result<(Box<dyn WatchService>, NativeReceiver)> {
        let mut state = self.state.lock().unwrap();
        if state.fail_open {
            return Err(WatchError::Other(anyhow::anyhow!("mock backend refused to open")));
        }
        let (tx, rx) = mpsc::unbounded_channel();
        state.sender = Some(tx);
        state.opened += 1;
        state.watched.clear();
        Ok((
            Box::new(MockService {
                state: Arc::clone(&self.state),
            }),
            rx,
        ))
    }
}

struct MockService {
    state: Arc<Mutex<MockState>>,
}

impl WatchService for MockService {
    fn watch(&mut self, dir: &Path) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        state.watch_calls += 1;
        if state.refused.contains(dir) {
            return Err(WatchError::InvalidPath(format!("{:?} does not exist", dir)));
        }
        state.watched.insert(dir.to_path_buf());
        Ok(())
    }

    fn unwatch(&mut self, dir: &Path) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        if state.watched.remove(dir) {
            Ok(())
        } else {
            Err(WatchError::InvalidPath(format!("{:?} is not watched", dir)))
        }
    }
}

impl Drop for MockService {
    fn drop(&mut self) {
        if let Ok(mut state) = self.state.lock() {
            state.sender = None;
            state.watched.clear();
        }
    }
}
