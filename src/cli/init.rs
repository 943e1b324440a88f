//! `dob init` command.

use crate::aggregate::{AggregateOptions, GitAggregator, aggregate, repos_from_config};
use crate::config::{Config, generate_runtime_config};
use anyhow::Result;
use clap::Args;

/// Arguments shared by the commands that fetch repositories.
#[derive(Args, Debug, Clone)]
pub struct FetchArgs {
    /// Stash local changes instead of failing
    #[arg(short, long)]
    pub force: bool,

    /// Only bootstrap repositories with a matching glob
    #[arg(short, long)]
    pub dirmatch: Option<String>,

    /// Number of parallel jobs (default: number of CPUs)
    #[arg(short, long)]
    pub jobs: Option<usize>,
}

impl FetchArgs {
    pub fn options(&self) -> AggregateOptions {
        AggregateOptions {
            jobs: self.jobs.unwrap_or_else(|| {
                std::thread::available_parallelism()
                    .map(|n| n.get())
                    .unwrap_or(1)
            }),
            force: self.force,
            dirmatch: self.dirmatch.clone(),
        }
    }
}

/// Arguments for the init command.
#[derive(Args, Debug)]
pub struct InitArgs {
    /// Skip generating the runtime configuration
    #[arg(long)]
    pub no_config: bool,

    #[command(flatten)]
    pub fetch: FetchArgs,
}

/// Generate the runtime configuration and bootstrap the repositories.
pub fn run_init(config: &Config, args: &InitArgs) -> Result<i32> {
    if !args.no_config {
        generate_runtime_config(config)?;
    }

    let repos = repos_from_config(config)?;
    let report = aggregate(
        &GitAggregator::new(),
        &repos,
        &config.paths().root,
        &args.fetch.options(),
    )?;
    Ok(report.exit_code())
}
