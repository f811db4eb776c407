// src/records.rs

//! Typed record subscriptions on top of the watch engine.
//!
//! A [`RecordSubscription`] registers the patterns derived from a
//! [`PathTemplate`] on its own token and turns path-level events into
//! record-level ones, re-reading and parsing the JSON file on every
//! creation or modification.

use std::io::ErrorKind;
use std::marker::PhantomData;
use std::path::Path;
use std::time::Duration;

use serde::de::DeserializeOwned;
use tracing::{debug, warn};

use crate::engine::{Token, WatchEngine};
use crate::errors::{Result, WatchError};
use crate::types::{AbsPath, RelPath};
use crate::watch::event::{Event, Origin};
use crate::watch::patterns::{PathTemplate, RecordKey};

/// Pause before the single re-read of a file that failed to parse.
const REREAD_DELAY: Duration = Duration::from_millis(20);

#[derive(Debug, Clone, PartialEq)]
pub enum RecordEvent<T> {
    Created {
        key: RecordKey,
        path: RelPath,
        record: T,
        origin: Origin,
    },
    Updated {
        key: RecordKey,
        path: RelPath,
        record: T,
        origin: Origin,
    },
    Removed {
        key: RecordKey,
        path: RelPath,
    },
    /// Events were lost; callers should re-read with
    /// [`RecordSubscription::scan`].
    Rescan,
}

pub struct RecordSubscription<T> {
    root: AbsPath,
    template: PathTemplate,
    token: Token,
    _record: PhantomData<fn() -> T>,
}

impl<T: DeserializeOwned> RecordSubscription<T> {
    /// Create a token on `engine` and register `template`'s directory
    /// patterns followed by its file pattern.
    pub fn subscribe(engine: &WatchEngine, template: PathTemplate) -> Result<Self> {
        let token = engine.create_token()?;
        for pattern in template.directory_patterns() {
            token.register_directory_pattern(&pattern)?;
        }
        token.register_file_pattern(&template.file_pattern())?;
        debug!(token = token.id(), template = template.as_str(), "record subscription ready");

        Ok(Self {
            root: engine.root().clone(),
            template,
            token,
            _record: PhantomData,
        })
    }

    pub fn template(&self) -> &PathTemplate {
        &self.template
    }

    pub fn token(&self) -> &Token {
        &self.token
    }

    /// Next record event, or `None` once the underlying token is closed.
    ///
    /// Files that vanish before they can be read, or that still fail to parse
    /// after one retry, are skipped.
    pub async fn next(&mut self) -> Option<RecordEvent<T>> {
        loop {
            let event = self.token.recv().await?;
            if let Some(record_event) = self.resolve(event).await {
                return Some(record_event);
            }
        }
    }

    async fn resolve(&self, event: Event) -> Option<RecordEvent<T>> {
        let (path, origin, created) = match event {
            Event::Overflow => return Some(RecordEvent::Rescan),
            Event::Deleted { path, .. } => {
                let key = self.key_for(&path)?;
                return Some(RecordEvent::Removed { key, path });
            }
            Event::Created { path, origin, .. } => (path, origin, true),
            Event::Modified { path, origin, .. } => (path, origin, false),
        };

        let key = self.key_for(&path)?;
        let record = self.read_with_retry(&path).await?;
        Some(if created {
            RecordEvent::Created {
                key,
                path,
                record,
                origin,
            }
        } else {
            RecordEvent::Updated {
                key,
                path,
                record,
                origin,
            }
        })
    }

    fn key_for(&self, path: &RelPath) -> Option<RecordKey> {
        let key = self.template.extract(path);
        if key.is_none() {
            debug!(path = %path, "event path does not fit the template; skipping");
        }
        key
    }

    async fn read_with_retry(&self, path: &RelPath) -> Option<T> {
        let abs = self.root.join(path);
        match read_record(abs.as_path()).await {
            Ok(record) => return Some(record),
            Err(WatchError::Io(err)) if err.kind() == ErrorKind::NotFound => {
                debug!(path = %path, "record vanished before it could be read");
                return None;
            }
            Err(err) => {
                debug!(path = %path, error = %err, "record unreadable; retrying once");
            }
        }

        tokio::time::sleep(REREAD_DELAY).await;
        match read_record(abs.as_path()).await {
            Ok(record) => Some(record),
            Err(err) => {
                warn!(path = %path, error = %err, "skipping unreadable record");
                None
            }
        }
    }

    /// Read every record currently on disk that fits the template.
    ///
    /// Unreadable files are logged and left out.
    pub async fn scan(&self) -> Result<Vec<(RecordKey, T)>> {
        let root = self.root.clone();
        let template = self.template.clone();
        let files = tokio::task::spawn_blocking(move || template.collect_matching(&root))
            .await
            .map_err(|err| WatchError::Other(err.into()))?;

        let mut records = Vec::with_capacity(files.len());
        for (rel, abs) in files {
            let Some(key) = self.template.extract(&rel) else {
                continue;
            };
            match read_record(&abs).await {
                Ok(record) => records.push((key, record)),
                Err(err) => warn!(path = %rel, error = %err, "skipping unreadable record"),
            }
        }
        Ok(records)
    }
}

async fn read_record<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let bytes = tokio::fs::read(path).await?;
    Ok(serde_json::from_slice(&bytes)?)
}
