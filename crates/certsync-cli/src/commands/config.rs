//! Config command - print the effective configuration

use super::ConfigArgs;
use crate::error::Result;

/// Run the config command
pub fn run(args: &ConfigArgs) -> Result<()> {
    let config = args.resolve()?;
    tracing::debug!(file = ?args.config, "Resolved configuration");
    print!("{}", config.to_yaml()?);
    Ok(())
}
