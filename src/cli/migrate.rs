//! `dob migrate` command.

use super::init::FetchArgs;
use super::{db_name, prepare_runtime, report_precondition};
use crate::aggregate::{GitAggregator, repos_from_config};
use crate::config::Config;
use crate::migrate::{MigrateRequest, Migration, fetch};
use crate::scripts::ScriptRegistry;
use crate::version::Version;
use anyhow::Result;
use clap::Args;
use tracing::info;

/// Arguments for the migrate command.
#[derive(Args, Debug)]
pub struct MigrateArgs {
    /// Target platform version
    pub version: String,

    /// Skip the pre-migration scripts
    #[arg(long)]
    pub skip_premigrate: bool,

    /// Skip the core migration
    #[arg(long)]
    pub skip_migrate: bool,

    /// Skip the post-migration scripts
    #[arg(long)]
    pub skip_postmigrate: bool,

    #[command(flatten)]
    pub fetch: FetchArgs,
}

impl MigrateArgs {
    pub fn request(&self) -> MigrateRequest {
        MigrateRequest {
            version: Version::parse(&self.version),
            skip_premigrate: self.skip_premigrate,
            skip_migrate: self.skip_migrate,
            skip_postmigrate: self.skip_postmigrate,
        }
    }
}

/// Fetch the target version and migrate the configured database.
pub fn run_migrate(config: &Config, args: &MigrateArgs) -> Result<i32> {
    report_precondition(migrate(config, args))
}

fn migrate(config: &Config, args: &MigrateArgs) -> Result<i32> {
    let request = args.request();
    let db = db_name(config)?;

    info!("Checkout Odoo {} repos", request.version);
    let repos = repos_from_config(config)?;
    let code = fetch(
        &GitAggregator::new(),
        &repos,
        &config.paths().root,
        &args.fetch.options(),
    )?;
    if code != 0 {
        return Ok(code);
    }

    let runtime = prepare_runtime(config)?;
    let scripts = ScriptRegistry::discover(&config.paths().root)?;
    Migration::new(&runtime, &scripts, &request, &db).run()
}
