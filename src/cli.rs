// src/cli.rs

//! CLI argument parsing using `clap`.

use clap::{Parser, ValueEnum};

/// Command-line arguments for `healmatrix`.
#[derive(Debug, Clone, Parser)]
#[command(
    name = "healmatrix",
    version,
    about = "Run a matrix of build configurations with self-healing retries.",
    long_about = None
)]
pub struct CliArgs {
    /// Path to the config file (TOML).
    ///
    /// Default: `Healmatrix.toml` in the current working directory.
    #[arg(long, value_name = "PATH", default_value = "Healmatrix.toml")]
    pub config: String,

    /// Parent build number used to tag child runs and their causes.
    #[arg(long, value_name = "N", default_value_t = 1)]
    pub build_number: u64,

    /// Logging level (error, warn, info, debug, trace).
    ///
    /// If omitted, `HEALMATRIX_LOG` or a default level will be used.
    #[arg(long, value_enum, value_name = "LEVEL")]
    pub log_level: Option<LogLevel>,

    /// Parse + validate, print the matrix, but don't execute any commands.
    #[arg(long)]
    pub dry_run: bool,
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
