//! The resolved configuration and typed views over it.

use super::loader::{ProjectPaths, SECTION};
use super::value::{ConfigValue, split_path};
use crate::version::Version;
use std::path::{Path, PathBuf};

/// A fully resolved configuration tree.
///
/// Produced by [`ConfigLoader::load`](super::ConfigLoader::load); extend
/// chains, environment overrides and substitutions are already applied.
#[derive(Debug, Clone)]
pub struct Config {
    tree: ConfigValue,
    paths: ProjectPaths,
    source: PathBuf,
}

impl Config {
    pub fn new(tree: ConfigValue, paths: ProjectPaths, source: PathBuf) -> Self {
        Self {
            tree,
            paths,
            source,
        }
    }

    pub fn tree(&self) -> &ConfigValue {
        &self.tree
    }

    pub fn paths(&self) -> &ProjectPaths {
        &self.paths
    }

    /// The configuration file the tree was loaded from.
    pub fn source(&self) -> &Path {
        &self.source
    }

    /// Value at `path`, treating explicit nulls as missing.
    pub fn get<S: AsRef<str>>(&self, path: &[S]) -> Option<&ConfigValue> {
        self.tree.get(path)
    }

    /// Value at a colon separated path such as `odoo:options:db_name`.
    pub fn get_path(&self, path: &str) -> Option<&ConfigValue> {
        self.tree.get(&split_path(path))
    }

    /// Runtime option under `odoo:options`.
    pub fn opt(&self, key: &str) -> Option<&ConfigValue> {
        self.tree.get(&["odoo", "options", key])
    }

    pub fn set<S: AsRef<str>>(&mut self, path: &[S], value: ConfigValue) {
        self.tree.set(path, value);
    }

    /// Setting under the reserved section.
    pub fn setting(&self, key: &str) -> Option<&ConfigValue> {
        self.tree.get(&[SECTION, key])
    }

    /// Configured database name, if any.
    pub fn db_name(&self) -> Option<String> {
        self.opt("db_name")
            .map(ConfigValue::render)
            .filter(|name| !name.is_empty() && name != "False")
    }

    /// Directory of the platform checkout (`bootstrap:odoo`).
    pub fn platform_dir(&self) -> Option<PathBuf> {
        self.setting("odoo")
            .and_then(ConfigValue::as_str)
            .map(|dir| self.paths.resolve(dir))
    }

    /// Configured platform version (`odoo:version`).
    pub fn odoo_version(&self) -> Option<Version> {
        self.get(&["odoo", "version"])
            .map(ConfigValue::render)
            .map(|v| Version::parse(&v))
    }

    /// Interpreter used to launch the platform.
    pub fn python(&self) -> String {
        self.setting("python")
            .and_then(ConfigValue::as_str)
            .unwrap_or("python3")
            .to_string()
    }

    /// YAML dump of the whole tree or of one option.
    ///
    /// `option` is a colon separated path from the root (`modules`,
    /// `odoo:options:db_name`).
    pub fn dump(&self, option: Option<&str>) -> Result<String, serde_yaml::Error> {
        let Some(option) = option else {
            return serde_yaml::to_string(&self.tree);
        };

        match self.get_path(option) {
            Some(ConfigValue::String(s)) => Ok(format!("{s}\n")),
            Some(other) => serde_yaml::to_string(other),
            None => Ok(String::new()),
        }
    }
}
