//! CLI argument parsing for interlock.
//!
//! Uses clap derive macros for declarative argument definitions.
//! This module defines the command structure; actual implementations
//! are in the `commands` module.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Interlock: named lock groups and transactional execution templates.
///
/// The CLI exercises the library for diagnostics:
/// - validate and print configuration
/// - run a lock-contention exercise through one lock group
/// - run a callback under a transactional template and print the journal
#[derive(Parser, Debug)]
#[command(name = "interlock")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Log lifecycle events at debug level (overridden by RUST_LOG).
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Command,
}

/// Available commands for interlock.
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Configuration commands.
    ///
    /// Validate a configuration file or print the defaults.
    Config(ConfigCommand),

    /// Hammer one lock group from several threads.
    ///
    /// Every thread acquires every identifier repeatedly and checks that no
    /// other thread is inside the same identifier at the same time. The group
    /// is disposed at the end and must have released every lock.
    Contend(ContendArgs),

    /// Run a callback under a transactional template.
    ///
    /// Uses the in-memory transaction manager and prints the invocation
    /// result together with the transaction journal.
    Execute(ExecuteArgs),
}

#[derive(Parser, Debug)]
pub struct ConfigCommand {
    #[command(subcommand)]
    pub action: ConfigAction,
}

#[derive(Subcommand, Debug)]
pub enum ConfigAction {
    /// Load and validate a YAML configuration, then print it normalized.
    Check(ConfigCheckArgs),

    /// Print the default configuration.
    Defaults,
}

#[derive(Parser, Debug)]
pub struct ConfigCheckArgs {
    /// Path to the configuration file.
    pub path: PathBuf,
}

/// Arguments for the `contend` command.
#[derive(Parser, Debug)]
pub struct ContendArgs {
    /// Number of worker threads.
    #[arg(short, long, default_value_t = 4)]
    pub threads: usize,

    /// Number of distinct lock identifiers.
    #[arg(short, long, default_value_t = 2)]
    pub identifiers: usize,

    /// Acquisitions per thread and identifier.
    #[arg(short = 'n', long, default_value_t = 100)]
    pub iterations: usize,

    /// How long each acquisition holds the lock, in milliseconds.
    #[arg(long, default_value_t = 0)]
    pub hold_ms: u64,

    /// Configuration file for lock fairness and disposal timeout.
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Print the report as JSON.
    #[arg(long)]
    pub json: bool,
}

/// Arguments for the `execute` command.
#[derive(Parser, Debug)]
pub struct ExecuteArgs {
    /// Transaction action (e.g. always_begin, begin_or_join, not_supported).
    ///
    /// Defaults to the action in the configuration.
    #[arg(short, long)]
    pub action: Option<String>,

    /// Template mode (standard, scope, compatibility).
    ///
    /// Defaults to the mode in the configuration.
    #[arg(short, long)]
    pub mode: Option<String>,

    /// Make the callback fail.
    #[arg(long)]
    pub fail: bool,

    /// Mark the transaction seen by the callback rollback-only.
    #[arg(long)]
    pub rollback_only: bool,

    /// Run inside an already bound ambient transaction.
    #[arg(long)]
    pub ambient: bool,

    /// Make ambient and external transactions XA.
    #[arg(long)]
    pub xa: bool,

    /// Offer an external transaction and let the template join it.
    #[arg(long)]
    pub external: bool,

    /// Timeout for begun transactions, in milliseconds.
    #[arg(long)]
    pub timeout_ms: Option<u64>,

    /// How long the callback runs, in milliseconds.
    #[arg(long, default_value_t = 0)]
    pub work_ms: u64,

    /// Configuration file supplying defaults.
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Print the report as JSON.
    #[arg(long)]
    pub json: bool,
}

impl Cli {
    pub fn parse_args() -> Self {
        Cli::parse()
    }
}
