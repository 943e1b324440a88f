//! CLI command definitions for dob
//!
//! This module defines the CLI structure using clap's derive macros.
//! The main entry point is the `Cli` struct which contains subcommands.

pub mod config;
pub mod init;
pub mod migrate;
pub mod run;
pub mod update;

use crate::addons::link_modules;
use crate::config::{Config, generate_runtime_config};
use crate::error::PreconditionError;
use crate::runtime::ProcessRuntime;
use anyhow::Result;
use clap::{Parser, Subcommand, ValueEnum};
use config::ConfigArgs;
use init::InitArgs;
use migrate::MigrateArgs;
use run::RunArgs;
use std::path::PathBuf;
use tracing::error;
use tracing::level_filters::LevelFilter;
use update::UpdateArgs;

/// Console log level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum LogLevel {
    Debug,
    #[default]
    Info,
    Warning,
    Error,
    Critical,
    Off,
}

impl LogLevel {
    pub fn filter(&self) -> LevelFilter {
        match self {
            LogLevel::Debug => LevelFilter::DEBUG,
            LogLevel::Info => LevelFilter::INFO,
            LogLevel::Warning => LevelFilter::WARN,
            LogLevel::Error | LogLevel::Critical => LevelFilter::ERROR,
            LogLevel::Off => LevelFilter::OFF,
        }
    }
}

/// Odoo project bootstrapping and upgrade tool
#[derive(Parser, Debug)]
#[command(name = "dob", author, version, about, long_about = None)]
pub struct Cli {
    /// Configuration file (default: odoo.local.yaml, then odoo.project.yaml)
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Log level
    #[arg(long, value_enum, default_value_t = LogLevel::Info, global = true)]
    pub logging: LogLevel,

    /// Logging output: 0/off, 1/stdout, 2/stderr (default), or filename
    #[arg(long, default_value = "2", global = true)]
    pub log: String,

    #[command(subcommand)]
    pub command: Command,
}

/// Available subcommands
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Show the resolved configuration or one option of it
    #[command(visible_alias = "c")]
    Config(ConfigArgs),

    /// Generate the runtime configuration and bootstrap the repositories
    #[command(visible_alias = "i")]
    Init(InitArgs),

    /// Install missing modules and update installed ones
    #[command(visible_alias = "u")]
    Update(UpdateArgs),

    /// Migrate the database to a new major version
    Migrate(MigrateArgs),

    /// Start the platform server
    #[command(visible_alias = "r")]
    Run(RunArgs),
}

/// Generate the runtime configuration, link the addons and detect the platform.
pub fn prepare_runtime(config: &Config) -> Result<ProcessRuntime> {
    generate_runtime_config(config)?;
    let runtime = ProcessRuntime::from_config(config)?;
    link_modules(config)?;
    Ok(runtime)
}

/// Configured database name.
pub fn db_name(config: &Config) -> Result<String, PreconditionError> {
    config.db_name().ok_or(PreconditionError::NoDatabase)
}

/// Turn precondition failures into an error message and exit code 1.
pub fn report_precondition(result: Result<i32>) -> Result<i32> {
    match result {
        Err(err) => match err.downcast_ref::<PreconditionError>() {
            Some(precondition) => {
                error!("{precondition}");
                Ok(1)
            }
            None => Err(err),
        },
        ok => ok,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_update() {
        let cli = Cli::try_parse_from(["dob", "-c", "odoo.yaml", "update", "sale", "--passwords"])
            .unwrap();
        assert_eq!(cli.config, Some(PathBuf::from("odoo.yaml")));
        let Command::Update(args) = cli.command else {
            panic!("expected update");
        };
        assert_eq!(args.modules, vec!["sale"]);
        assert!(args.passwords);
        assert!(!args.all);
    }

    #[test]
    fn test_parse_migrate_flags() {
        let cli = Cli::try_parse_from(["dob", "migrate", "15.0", "--skip-premigrate"]).unwrap();
        let Command::Migrate(args) = cli.command else {
            panic!("expected migrate");
        };
        assert_eq!(args.version, "15.0");
        assert!(args.skip_premigrate);
        assert!(!args.skip_migrate);
    }

    #[test]
    fn test_parse_logging() {
        let cli = Cli::try_parse_from(["dob", "--logging", "warning", "c"]).unwrap();
        assert_eq!(cli.logging.filter(), LevelFilter::WARN);
    }

    #[test]
    fn test_precondition_becomes_exit_code() {
        let result: Result<i32> = Err(PreconditionError::NoDatabase.into());
        assert_eq!(report_precondition(result).unwrap(), 1);

        let result: Result<i32> = Err(anyhow::anyhow!("boom"));
        assert!(report_precondition(result).is_err());
    }
}
