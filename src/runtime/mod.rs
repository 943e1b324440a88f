//! Platform runtime seam.
//!
//! Everything that touches the platform or its database goes through the
//! [`Runtime`] trait. [`ProcessRuntime`] drives a platform checkout through
//! its command line and `psql`; tests substitute a recording fake.

mod process;
mod psql;

pub use process::ProcessRuntime;
pub use psql::{Psql, quote_literal};

use crate::error::PreconditionError;
use crate::modules::ModuleInfo;
use crate::version::Version;
use anyhow::Result;
use regex_lite::Regex;
use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};
use std::sync::LazyLock;

/// Which modules an update pass targets.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UpdateSelection {
    All,
    Modules(BTreeSet<String>),
}

/// Options for module installation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InstallOptions {
    pub without_demo: bool,
    pub languages: Vec<String>,
}

/// Operations against the platform and one of its databases.
pub trait Runtime {
    /// Whether `db` exists and carries the platform's base schema.
    fn is_initialized(&self, db: &str) -> Result<bool>;

    /// Create the base schema and install the base module.
    ///
    /// The demo-data policy chosen here sticks to the database.
    fn initialize(&self, db: &str, options: &InstallOptions) -> Result<()>;

    fn install(&self, db: &str, modules: &BTreeSet<String>, options: &InstallOptions)
    -> Result<()>;

    fn update(&self, db: &str, selection: &UpdateSelection) -> Result<()>;

    /// Update modules whose source checksum changed.
    ///
    /// Returns `false` when the database has no changed-module detector.
    fn update_changed(&self, db: &str) -> Result<bool>;

    /// Names of modules in the `installed` state.
    fn query_installed(&self, db: &str) -> Result<BTreeSet<String>>;

    fn query_module_metadata(&self, db: &str) -> Result<BTreeMap<String, ModuleInfo>>;

    /// Upper-case country codes of all companies.
    fn query_company_countries(&self, db: &str) -> Result<BTreeSet<String>>;

    fn get_config_param(&self, db: &str, key: &str) -> Result<Option<String>>;

    fn set_config_param(&self, db: &str, key: &str, value: &str) -> Result<()>;

    fn set_password(&self, db: &str, login: &str, password: &str) -> Result<()>;

    /// Run a hook script's `migrate(env, db_version)` inside the platform.
    fn run_hook(&self, db: &str, script: &Path, db_version: &Version) -> Result<()>;

    fn execute_sql(&self, db: &str, script: &Path) -> Result<()>;

    /// Update every module with only `load` as server-wide modules and
    /// return the platform's exit code.
    fn upgrade_all(&self, db: &str, load: &[&str]) -> Result<i32>;
}

/// Executable layout of a platform checkout.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServerLayout {
    /// Before 11.0: `openerp-server`
    Legacy,
    /// 11.0 and later: `odoo-bin`
    Modern,
}

impl ServerLayout {
    pub fn for_version(version: &Version) -> Self {
        match version.major() {
            Some(major) if major < 11 => Self::Legacy,
            _ => Self::Modern,
        }
    }

    pub fn executable(&self) -> &'static str {
        match self {
            Self::Legacy => "openerp-server",
            Self::Modern => "odoo-bin",
        }
    }

    /// Flag that keeps the HTTP server from starting.
    pub fn no_http_flag(&self) -> &'static str {
        match self {
            Self::Legacy => "--no-xmlrpc",
            Self::Modern => "--no-http",
        }
    }
}

/// What the detected platform version supports.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Capabilities {
    pub version: Version,
    pub layout: ServerLayout,
    /// Modules carry country restrictions (17.0 and later).
    pub country_constraints: bool,
}

static VERSION_INFO: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"version_info\s*=\s*\(\s*(\d+)\s*,\s*(\d+)").expect("version pattern is valid")
});

impl Capabilities {
    pub fn for_version(version: Version) -> Self {
        Self {
            layout: ServerLayout::for_version(&version),
            country_constraints: version.major().is_some_and(|major| major >= 17),
            version,
        }
    }

    /// Detect the version of the checkout at `platform_dir` from its release file.
    pub fn detect(platform_dir: &Path) -> Result<Self, PreconditionError> {
        let candidates: Vec<PathBuf> = ["odoo", "openerp"]
            .iter()
            .map(|package| platform_dir.join(package).join("release.py"))
            .collect();

        for release in &candidates {
            let Ok(content) = std::fs::read_to_string(release) else {
                continue;
            };
            if let Some(caps) = VERSION_INFO.captures(&content) {
                let version = Version::parse(&format!("{}.{}", &caps[1], &caps[2]));
                return Ok(Self::for_version(version));
            }
            return Err(PreconditionError::UnknownVersion(release.clone()));
        }

        Err(PreconditionError::UnknownVersion(candidates[0].clone()))
    }
}
