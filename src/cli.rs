// src/cli.rs

//! CLI argument parsing using `clap`.

use std::path::PathBuf;

use clap::{Parser, ValueEnum};

/// Command-line arguments for `jsonstore-watch`.
#[derive(Debug, Clone, Parser)]
#[command(
    name = "jsonstore-watch",
    version,
    about = "Watch a file-backed JSON record store and print every change.",
    long_about = None
)]
pub struct CliArgs {
    /// Root directory of the record store.
    #[arg(long, value_name = "DIR")]
    pub root: PathBuf,

    /// Record path template, e.g. `users/{user:uuid}/{name}.json`.
    ///
    /// Records are parsed as JSON and printed with their key.
    #[arg(long, value_name = "TEMPLATE", conflicts_with_all = ["dir_pattern", "file_pattern"])]
    pub template: Option<String>,

    /// Directory pattern (regex over root-relative paths). Repeatable.
    ///
    /// Default when neither this nor `--template` is given: the root only.
    #[arg(long = "dir-pattern", value_name = "REGEX")]
    pub dir_pattern: Vec<String>,

    /// File pattern (regex over root-relative paths). Repeatable.
    ///
    /// Default when neither this nor `--template` is given: every file.
    #[arg(long = "file-pattern", value_name = "REGEX")]
    pub file_pattern: Vec<String>,

    /// Path to the config file (TOML).
    ///
    /// If omitted, `jsonstore-watch.toml` in the current directory is used
    /// when present, else built-in defaults.
    #[arg(long, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Logging level (error, warn, info, debug, trace).
    ///
    /// If omitted, `JSONSTORE_WATCH_LOG` or a default level will be used.
    #[arg(long, value_enum, value_name = "LEVEL")]
    pub log_level: Option<LogLevel>,
}

/// Log level as exposed on the CLI.
#[derive(Debug, Copy, Clone, ValueEnum)]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

/// Convenience wrapper around `CliArgs::parse()`.
pub fn parse() -> CliArgs {
    CliArgs::parse()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn repeatable_patterns() {
        let args = CliArgs::try_parse_from([
            "jsonstore-watch",
            "--root",
            "/store",
            "--dir-pattern",
            "^$",
            "--dir-pattern",
            "^users$",
            "--file-pattern",
            r"\.json$",
        ])
        .unwrap();
        assert_eq!(args.root, PathBuf::from("/store"));
        assert_eq!(args.dir_pattern, vec!["^$", "^users$"]);
        assert_eq!(args.file_pattern.len(), 1);
        assert!(args.template.is_none());
    }

    #[test]
    fn template_conflicts_with_raw_patterns() {
        let res = CliArgs::try_parse_from([
            "jsonstore-watch",
            "--root",
            "/store",
            "--template",
            "{name}.json",
            "--file-pattern",
            "x",
        ]);
        assert!(res.is_err());
    }

    #[test]
    fn root_is_required() {
        assert!(CliArgs::try_parse_from(["jsonstore-watch"]).is_err());
    }
}
