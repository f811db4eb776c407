// src/lib.rs

pub mod cli;
pub mod config;
pub mod engine;
pub mod errors;
pub mod logging;
pub mod records;
pub mod types;
pub mod watch;

use anyhow::{Context, Result};
use tracing::info;

use crate::cli::CliArgs;
use crate::config::load_or_default;
use crate::engine::WatchEngine;
use crate::records::{RecordEvent, RecordSubscription};
use crate::watch::event::Event;
use crate::watch::patterns::PathTemplate;
use crate::watch::scope::ROOT_DIRECTORY_PATTERN;

pub use crate::engine::Token;
pub use crate::errors::WatchError;

/// File pattern used when the CLI is given no patterns at all.
const ALL_FILES_PATTERN: &str = "^.+$";

/// High-level entry point used by `main.rs`.
///
/// This wires together:
/// - config loading
/// - the watch engine over `--root`
/// - either a typed record subscription (`--template`) or a raw token
/// - Ctrl-C handling
pub async fn run(args: CliArgs) -> Result<()> {
    let cfg = load_or_default(args.config.as_deref()).context("failed to load configuration")?;
    let engine = WatchEngine::new(&args.root, cfg.watch)
        .with_context(|| format!("failed to open store root {:?}", args.root))?;
    info!(root = %engine.root(), "watching store");

    match &args.template {
        Some(template) => watch_records(&engine, template).await,
        None => watch_paths(&engine, &args).await,
    }
}

async fn watch_paths(engine: &WatchEngine, args: &CliArgs) -> Result<()> {
    let mut token = engine.create_token()?;

    let dir_patterns = if args.dir_pattern.is_empty() {
        vec![ROOT_DIRECTORY_PATTERN.to_string()]
    } else {
        args.dir_pattern.clone()
    };
    let file_patterns = if args.file_pattern.is_empty() {
        vec![ALL_FILES_PATTERN.to_string()]
    } else {
        args.file_pattern.clone()
    };
    for pattern in &dir_patterns {
        token
            .register_directory_pattern(pattern)
            .with_context(|| format!("invalid directory pattern {pattern:?}"))?;
    }
    for pattern in &file_patterns {
        token
            .register_file_pattern(pattern)
            .with_context(|| format!("invalid file pattern {pattern:?}"))?;
    }

    loop {
        tokio::select! {
            res = tokio::signal::ctrl_c() => {
                res.context("failed to listen for Ctrl+C")?;
                info!("shutdown requested");
                engine.shut_down();
                return Ok(());
            }
            event = token.recv() => {
                let Some(event) = event else {
                    return Ok(());
                };
                println!("{}", format_event(&event));
            }
        }
    }
}

async fn watch_records(engine: &WatchEngine, template: &str) -> Result<()> {
    let template = PathTemplate::parse(template)?;
    let mut subscription: RecordSubscription<serde_json::Value> =
        RecordSubscription::subscribe(engine, template)?;

    loop {
        tokio::select! {
            res = tokio::signal::ctrl_c() => {
                res.context("failed to listen for Ctrl+C")?;
                info!("shutdown requested");
                engine.shut_down();
                return Ok(());
            }
            event = subscription.next() => {
                let Some(event) = event else {
                    return Ok(());
                };
                println!("{}", format_record_event(&event));
            }
        }
    }
}

/// One output line for a path-level event.
pub fn format_event<T>(event: &Event<T>) -> String {
    match event {
        Event::Created { path, origin, .. } => format!("created {path} ({origin})"),
        Event::Modified { path, origin, .. } => format!("modified {path} ({origin})"),
        Event::Deleted { path, .. } => format!("deleted {path}"),
        Event::Overflow => "overflow".to_string(),
    }
}

/// One output line for a record-level event.
pub fn format_record_event(event: &RecordEvent<serde_json::Value>) -> String {
    match event {
        RecordEvent::Created {
            key, record, origin, ..
        } => format!("created {key} ({origin}) {record}"),
        RecordEvent::Updated {
            key, record, origin, ..
        } => format!("updated {key} ({origin}) {record}"),
        RecordEvent::Removed { key, .. } => format!("removed {key}"),
        RecordEvent::Rescan => "rescan".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::RelPath;
    use crate::watch::event::Origin;
    use crate::watch::patterns::RecordKey;

    #[test]
    fn event_lines() {
        let path = RelPath::new("sub/a.txt").unwrap();
        let created: Event = Event::Created {
            path: path.clone(),
            content: (),
            origin: Origin::Scan,
        };
        assert_eq!(format_event(&created), "created sub/a.txt (scan)");
        let deleted: Event = Event::Deleted {
            path,
            origin: Origin::Watch,
        };
        assert_eq!(format_event(&deleted), "deleted sub/a.txt");
        assert_eq!(format_event::<()>(&Event::Overflow), "overflow");
    }

    #[test]
    fn record_lines_include_payload() {
        let event = RecordEvent::Updated {
            key: RecordKey::new().with("name", "alice"),
            path: RelPath::new("alice.json").unwrap(),
            record: serde_json::json!({"age": 3}),
            origin: Origin::Watch,
        };
        let line = format_record_event(&event);
        assert!(line.starts_with("updated "));
        assert!(line.contains("(watch)"));
        assert!(line.ends_with(r#"{"age":3}"#));
    }
}
