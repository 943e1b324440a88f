//! `dob run` command.

use super::{prepare_runtime, report_precondition};
use crate::config::{Config, ConfigValue};
use anyhow::Result;
use clap::Args;

/// Arguments for the run command.
#[derive(Args, Debug)]
pub struct RunArgs {
    /// Arguments passed through to the platform server
    #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
    pub args: Vec<String>,
}

/// Start the platform server in the foreground.
pub fn run_server(config: &Config, args: &RunArgs) -> Result<i32> {
    report_precondition(start(config, args))
}

fn start(config: &Config, args: &RunArgs) -> Result<i32> {
    let runtime = prepare_runtime(config)?;
    let debugger = config.setting("debugger").and_then(ConfigValue::as_str);
    runtime.start(&args.args, debugger)
}
