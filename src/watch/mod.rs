// src/watch/mod.rs

//! Building blocks of the watch engine.
//!
//! This module is responsible for:
//! - The event model delivered to subscribers (`event`).
//! - Recyclable token identifiers (`ids`).
//! - Per-token subscription state (`scope`).
//! - The flat native watch primitive and its `notify` implementation
//!   (`native`), plus the directory-to-key cache on top of it (`registry`).
//! - Path templates that turn the record path DSL into patterns (`patterns`).
//!
//! It does **not** own any task or lock; the orchestration lives in
//! [`crate::engine`].

pub mod event;
pub mod ids;
pub mod mock;
pub mod native;
pub mod patterns;
pub mod registry;
pub mod scope;

pub use event::{ChangeKind, Event, Origin};
pub use ids::{IdAllocator, TokenId};
pub use native::{NativeEvent, NotifyBackend, WatchBackend, WatchService};
pub use patterns::{PathTemplate, RecordKey};
pub use registry::WatchKey;
pub use scope::{ROOT_DIRECTORY_PATTERN, ScopeSnapshot, WatchEntry};
