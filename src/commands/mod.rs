//! Command implementations for interlock.
//!
//! This module provides the dispatcher that routes CLI commands to their
//! implementations.

mod config_cmd;
mod contend;
mod execute;

use crate::cli::{Command, ConfigAction, ConfigCommand};
use interlock::config::Config;
use interlock::error::{InterlockError, Result};
use serde::Serialize;
use std::path::Path;

/// Dispatch a command to its implementation.
pub fn dispatch(command: Command) -> Result<()> {
    match command {
        Command::Config(config_cmd) => dispatch_config(config_cmd),
        Command::Contend(args) => contend::cmd_contend(args),
        Command::Execute(args) => execute::cmd_execute(args),
    }
}

/// Dispatch config subcommands.
fn dispatch_config(config_cmd: ConfigCommand) -> Result<()> {
    match config_cmd.action {
        ConfigAction::Check(args) => config_cmd::cmd_config_check(args),
        ConfigAction::Defaults => config_cmd::cmd_config_defaults(),
    }
}

/// Configuration from `path`, or the defaults when none is given.
///
/// An explicitly named file must exist and be valid.
fn load_config(path: Option<&Path>) -> Result<Config> {
    match path {
        Some(path) => Config::load(path),
        None => Ok(Config::default()),
    }
}

fn print_json<T: Serialize>(report: &T) -> Result<()> {
    let json = serde_json::to_string_pretty(report)
        .map_err(|e| InterlockError::Config(format!("failed to serialize report: {}", e)))?;
    println!("{}", json);
    Ok(())
}
