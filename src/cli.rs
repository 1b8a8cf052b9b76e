// src/cli.rs

//! CLI argument parsing using `clap`.

use std::path::PathBuf;

use clap::{Parser, ValueEnum};

/// Command-line arguments for `pkgplan`.
#[derive(Debug, Clone, Parser)]
#[command(
    name = "pkgplan",
    version,
    about = "Concretize a package spec against a recipe registry and build the result.",
    long_about = None
)]
pub struct CliArgs {
    /// Abstract spec to concretize and build, e.g. "app@2: +ssl ^zlib@1.3".
    #[arg(value_name = "SPEC")]
    pub spec: String,

    /// Directory containing recipe TOML files.
    #[arg(long, value_name = "DIR", default_value = "recipes")]
    pub recipes: PathBuf,

    /// Maximum number of packages building concurrently.
    ///
    /// Defaults to the host's available parallelism.
    #[arg(long, short = 'j', value_name = "N")]
    pub jobs: Option<usize>,

    /// Stop dispatching new builds after the first failure instead of
    /// finishing independent branches.
    #[arg(long)]
    pub fail_fast: bool,

    /// Concretize and print the resolved graph, but build nothing.
    #[arg(long)]
    pub dry_run: bool,

    /// Root directory package prefixes are installed under.
    #[arg(long, value_name = "DIR", default_value = "install")]
    pub install_root: PathBuf,

    /// Logging level (error, warn, info, debug, trace).
    ///
    /// If omitted, `PKGPLAN_LOG` or a default level will be used.
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
