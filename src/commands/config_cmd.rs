//! Implementation of the `interlock config` commands.

use crate::cli::ConfigCheckArgs;
use interlock::config::Config;
use interlock::error::Result;

/// Execute `interlock config check <path>`.
///
/// Loads and validates the file, then prints it with every default filled in.
pub fn cmd_config_check(args: ConfigCheckArgs) -> Result<()> {
    let config = Config::load(&args.path)?;
    println!("# {} is valid", args.path.display());
    print!("{}", config.to_yaml()?);
    Ok(())
}

/// Execute `interlock config defaults`.
pub fn cmd_config_defaults() -> Result<()> {
    print!("{}", Config::default().to_yaml()?);
    Ok(())
}
