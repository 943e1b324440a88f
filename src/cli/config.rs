//! `dob config` command.

use crate::config::Config;
use anyhow::Result;
use clap::Args;

/// Arguments for the config command.
#[derive(Args, Debug)]
pub struct ConfigArgs {
    /// Colon separated path from the root (`modules`, `odoo:options:db_name`)
    pub option: Option<String>,
}

/// Print the resolved configuration.
pub fn run_config(config: &Config, args: &ConfigArgs) -> Result<i32> {
    print!("{}", config.dump(args.option.as_deref())?);
    Ok(0)
}
