//! `dob update` command.

use super::{db_name, prepare_runtime, report_precondition};
use crate::config::Config;
use crate::scripts::ScriptRegistry;
use crate::upgrade::{Upgrade, UpdateRequest, UpgradeSettings};
use anyhow::Result;
use clap::Args;
use tracing::info;

/// Arguments for the update command.
#[derive(Args, Debug)]
pub struct UpdateArgs {
    /// Only update these modules
    pub modules: Vec<String>,

    /// Update all modules instead of only changed ones
    #[arg(long)]
    pub all: bool,

    /// Update all listed modules instead of only changed ones
    #[arg(long)]
    pub listed: bool,

    /// Set the configured user passwords
    #[arg(long)]
    pub passwords: bool,
}

impl UpdateArgs {
    pub fn request(&self) -> UpdateRequest {
        UpdateRequest {
            modules: self.modules.clone(),
            all: self.all,
            listed: self.listed,
            passwords: self.passwords,
        }
    }
}

/// Install and update the modules of the configured database.
pub fn run_update(config: &Config, args: &UpdateArgs) -> Result<i32> {
    report_precondition(update(config, args))
}

fn update(config: &Config, args: &UpdateArgs) -> Result<i32> {
    let settings = UpgradeSettings::from_config(config)?;
    let db = db_name(config)?;
    let runtime = prepare_runtime(config)?;
    let scripts = ScriptRegistry::discover(&config.paths().root)?;

    let request = args.request();
    let run = Upgrade::new(&runtime, &scripts, &settings, &request, &db).run()?;
    info!(
        "Update finished: {} installed, {} auto-installed",
        run.uninstalled.len(),
        run.auto_installed.len()
    );
    Ok(0)
}
