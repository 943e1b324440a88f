//! dob
//!
//! Bootstraps, updates and migrates Odoo installations described by layered
//! YAML configuration.

use anyhow::{Result, bail};
use clap::Parser;
use dob::cli::config::run_config;
use dob::cli::init::run_init;
use dob::cli::migrate::run_migrate;
use dob::cli::run::run_server;
use dob::cli::update::run_update;
use dob::cli::{Cli, Command};
use dob::config::{ConfigLoader, EnvVars, ProjectPaths};
use std::fs::OpenOptions;
use std::process::ExitCode;
use std::sync::Mutex;
use tracing::debug;
use tracing::level_filters::LevelFilter;
use tracing_subscriber::{EnvFilter, FmtSubscriber};

/// `RUST_LOG` when set, otherwise the `--logging` level.
fn env_filter(level: LevelFilter) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level.to_string()))
}

fn init_logging(cli: &Cli) -> Result<()> {
    let level = cli.logging.filter();
    if level == LevelFilter::OFF {
        return Ok(());
    }

    match cli.log.as_str() {
        "0" | "off" => {
            // No logging
        }
        "1" | "stdout" => {
            let subscriber = FmtSubscriber::builder()
                .with_env_filter(env_filter(level))
                .with_target(false)
                .with_writer(std::io::stdout)
                .finish();
            tracing::subscriber::set_global_default(subscriber)?;
        }
        "2" | "stderr" => {
            let subscriber = FmtSubscriber::builder()
                .with_env_filter(env_filter(level))
                .with_target(false)
                .with_writer(std::io::stderr)
                .finish();
            tracing::subscriber::set_global_default(subscriber)?;
        }
        filename => {
            // Log to file (append mode)
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(filename)?;
            let subscriber = FmtSubscriber::builder()
                .with_env_filter(env_filter(level))
                .with_writer(Mutex::new(file))
                .with_ansi(false)
                .finish();
            tracing::subscriber::set_global_default(subscriber)?;
        }
    }
    Ok(())
}

fn main() -> Result<ExitCode> {
    let cli = Cli::parse();
    init_logging(&cli)?;

    let paths = ProjectPaths::discover();
    let config_file = match cli.config.clone().or_else(|| paths.default_config_file()) {
        Some(file) => file,
        None => bail!("No configuration file found"),
    };
    debug!(config = %config_file.display(), "using configuration");

    let config = ConfigLoader::new(paths, EnvVars::capture()).load(&config_file)?;

    let code = match &cli.command {
        Command::Config(args) => run_config(&config, args)?,
        Command::Init(args) => run_init(&config, args)?,
        Command::Update(args) => run_update(&config, args)?,
        Command::Migrate(args) => run_migrate(&config, args)?,
        Command::Run(args) => run_server(&config, args)?,
    };

    Ok(ExitCode::from(u8::try_from(code).unwrap_or(1)))
}
