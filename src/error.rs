//! Error taxonomy.
//!
//! Configuration errors are fatal and abort before any tree is used.
//! Precondition errors describe expected operational conditions; the command
//! runners report them and exit non-zero instead of propagating them.
//! Runtime and database failures travel as `anyhow::Error` from the
//! collaborator that raised them.

use std::path::PathBuf;
use thiserror::Error;

/// Fatal configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read configuration file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Malformed YAML in {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },

    #[error("{section}:extend must be str or list")]
    InvalidExtend { section: &'static str },

    #[error("Configuration file {path} extends itself")]
    ExtendCycle { path: PathBuf },

    #[error("modules: must be str or dict of length 1")]
    InvalidModuleSpec,

    #[error("Invalid substitution token '{token}': empty path segment")]
    Substitution { token: String },
}

/// Expected operational conditions that stop a command.
#[derive(Debug, Error)]
pub enum PreconditionError {
    #[error("No {section}:odoo defined")]
    RuntimeNotFound { section: &'static str },

    #[error("Missing odoo folder: {0}")]
    RuntimeMissing(PathBuf),

    #[error("No database configured (odoo:options:db_name)")]
    NoDatabase,

    #[error("Database '{0}' is not initialized")]
    DatabaseNotInitialized(String),

    #[error("Unable to determine the platform version from {0}")]
    UnknownVersion(PathBuf),
}

pub type ConfigResult<T> = std::result::Result<T, ConfigError>;
