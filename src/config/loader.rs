//! Configuration loader with `extend` chains.
//!
//! Loads a YAML document, its declared base documents (depth first, base
//! before derived) and the optional version-pin file, merging them into one
//! tree. Environment overrides, variable substitution, addon path
//! normalization and repository defaults are applied afterwards.

use super::merge::merge;
use super::substitute::substitute;
use super::types::Config;
use super::value::{ConfigValue, Mapping};
use crate::error::{ConfigError, ConfigResult};
use std::collections::{BTreeMap, BTreeSet};
use std::path::{Component, Path, PathBuf};
use tracing::{info, warn};

/// Reserved top-level section holding the tool's own settings.
pub const SECTION: &str = "bootstrap";

/// Keys whose override value replaces the base value wholesale.
pub const REPLACE_KEYS: &[&str] = &["merges"];

/// Configuration files tried in order when none is given explicitly.
pub const CONFIG_CANDIDATES: &[&str] = &["odoo.local.yaml", "odoo.project.yaml"];

/// Optional version-pin document merged after the extend chain.
pub const VERSIONS_FILE: &str = "odoo.versions.yaml";

/// Generated runtime configuration file.
pub const RUNTIME_CONFIG: &str = "etc/odoo.cfg";

/// Internal addon directory that linked modules are collected in.
pub const ADDON_PATH: &str = ".dob/addons";

/// Environment variables applied onto fixed configuration paths.
pub const ENVIRONMENT: &[(&str, &[&str])] = &[
    ("ODOO_VERSION", &["odoo", "version"]),
    ("BOOTSTRAP_MODE", &[SECTION, "mode"]),
    ("BOOTSTRAP_DEBUGGER", &[SECTION, "debugger"]),
];

/// Snapshot of the process environment.
///
/// Captured once at startup so loading stays deterministic for a given
/// snapshot. Empty values count as unset.
#[derive(Debug, Clone, Default)]
pub struct EnvVars(BTreeMap<String, String>);

impl EnvVars {
    /// Capture the current process environment.
    pub fn capture() -> Self {
        std::env::vars().collect()
    }

    /// Get a non-empty variable.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.0
            .get(key)
            .map(String::as_str)
            .filter(|value| !value.is_empty())
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for EnvVars {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self(
            iter.into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        )
    }
}

/// Well-known locations inside a project.
#[derive(Debug, Clone)]
pub struct ProjectPaths {
    /// Project root; relative paths in the configuration resolve against it.
    pub root: PathBuf,
}

impl ProjectPaths {
    /// Create paths rooted at `root` (made absolute against the working directory).
    pub fn new(root: impl Into<PathBuf>) -> Self {
        let root = root.into();
        let root = if root.is_absolute() {
            root
        } else {
            std::env::current_dir()
                .unwrap_or_else(|_| PathBuf::from("."))
                .join(root)
        };
        Self {
            root: normalize_path(&root),
        }
    }

    /// Paths rooted at the current working directory.
    pub fn discover() -> Self {
        Self::new(".")
    }

    /// Resolve a configured path against the root and normalize it lexically.
    pub fn resolve(&self, path: impl AsRef<Path>) -> PathBuf {
        let path = path.as_ref();
        if path.is_absolute() {
            normalize_path(path)
        } else {
            normalize_path(&self.root.join(path))
        }
    }

    /// First existing default configuration file, if any.
    pub fn default_config_file(&self) -> Option<PathBuf> {
        CONFIG_CANDIDATES
            .iter()
            .map(|name| self.root.join(name))
            .find(|path| path.is_file())
    }

    pub fn versions_file(&self) -> PathBuf {
        self.root.join(VERSIONS_FILE)
    }

    pub fn runtime_config(&self) -> PathBuf {
        self.root.join(RUNTIME_CONFIG)
    }

    pub fn addon_path(&self) -> PathBuf {
        self.root.join(ADDON_PATH)
    }
}

/// Resolve `.` and `..` components without touching the filesystem.
pub fn normalize_path(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                if !out.pop() {
                    out.push("..");
                }
            }
            other => out.push(other.as_os_str()),
        }
    }
    out
}

/// Configuration loader that resolves extend chains.
#[derive(Debug, Clone)]
pub struct ConfigLoader {
    paths: ProjectPaths,
    env: EnvVars,
}

impl ConfigLoader {
    pub fn new(paths: ProjectPaths, env: EnvVars) -> Self {
        Self { paths, env }
    }

    /// Load `file` with its whole extend chain and return the resolved configuration.
    pub fn load(&self, file: impl AsRef<Path>) -> ConfigResult<Config> {
        info!("Loading configuration file");
        let file = self.paths.resolve(file);

        let mut tree = ConfigValue::mapping();
        let mut chain = Vec::new();
        self.load_file(&file, true, &mut tree, &mut chain)?;
        self.load_file(&self.paths.versions_file(), false, &mut tree, &mut chain)?;

        let tree = self.post_process(tree)?;
        Ok(Config::new(tree, self.paths.clone(), file))
    }

    /// Load one document, its bases first, and merge it into `tree`.
    fn load_file(
        &self,
        path: &Path,
        required: bool,
        tree: &mut ConfigValue,
        chain: &mut Vec<PathBuf>,
    ) -> ConfigResult<()> {
        if !required && !path.is_file() {
            warn!(" * {}", path.display());
            return Ok(());
        }

        if chain.iter().any(|p| p == path) {
            return Err(ConfigError::ExtendCycle {
                path: path.to_path_buf(),
            });
        }

        info!(" * {}", path.display());
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let document = parse_document(path, &content)?;

        // Load all base documents first
        chain.push(path.to_path_buf());
        for base in extends(&document)? {
            let base = self.paths.resolve(&base);
            self.load_file(&base, true, tree, chain)?;
        }
        chain.pop();

        *tree = merge(tree, &document, REPLACE_KEYS);
        Ok(())
    }

    /// Apply environment overrides, substitution, addon paths and repo defaults.
    fn post_process(&self, mut tree: ConfigValue) -> ConfigResult<ConfigValue> {
        // Environment variables go in first so substitutions can see them
        for &(var, path) in ENVIRONMENT {
            if let Some(value) = self.env.get(var) {
                tree.set(path, value.into());
            }
        }

        if let Some(options) = tree
            .as_mapping_mut()
            .and_then(|root| root.get_mut("odoo"))
            .and_then(ConfigValue::as_mapping_mut)
            .and_then(|odoo| odoo.get_mut("options"))
            .and_then(ConfigValue::as_mapping_mut)
        {
            for (key, value) in options.iter_mut() {
                let var = format!("ODOO_{}", key.to_uppercase());
                if let Some(env_value) = self.env.get(&var) {
                    *value = env_value.into();
                }
            }
        }

        let mut tree = substitute(&tree)?;

        // Combine the addon paths with the internal one
        let mut addons: BTreeSet<String> = tree
            .get(&["odoo", "addons_path"])
            .map(ConfigValue::to_string_list)
            .unwrap_or_default()
            .into_iter()
            .map(|p| self.paths.resolve(p).to_string_lossy().into_owned())
            .collect();
        addons.insert(self.paths.addon_path().to_string_lossy().into_owned());
        tree.set(&["odoo", "options", "addons_path"], ConfigValue::Set(addons));

        // Every repository inherits the default repository template
        let default_repo = tree
            .get(&[SECTION, "repo"])
            .cloned()
            .unwrap_or_else(ConfigValue::mapping);
        if let Some(repos) = tree.get(&["repos"]).and_then(ConfigValue::as_mapping) {
            let repos: Mapping = repos
                .iter()
                .map(|(name, repo)| (name.clone(), merge(&default_repo, repo, REPLACE_KEYS)))
                .collect();
            tree.set(&["repos"], ConfigValue::Mapping(repos));
        }

        Ok(tree)
    }
}

fn parse_document(path: &Path, content: &str) -> ConfigResult<ConfigValue> {
    let value: serde_yaml::Value =
        serde_yaml::from_str(content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
    Ok(match ConfigValue::from(value) {
        ConfigValue::Null => ConfigValue::mapping(),
        other => other,
    })
}

/// Base documents declared under `bootstrap:extend`.
fn extends(document: &ConfigValue) -> ConfigResult<Vec<String>> {
    match document.get(&[SECTION, "extend"]) {
        None => Ok(Vec::new()),
        Some(ConfigValue::String(path)) => Ok(vec![path.clone()]),
        Some(ConfigValue::Sequence(items)) => items
            .iter()
            .map(|item| match item {
                ConfigValue::String(path) => Ok(path.clone()),
                _ => Err(ConfigError::InvalidExtend { section: SECTION }),
            })
            .collect(),
        Some(_) => Err(ConfigError::InvalidExtend { section: SECTION }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn write(dir: &Path, name: &str, content: &str) {
        std::fs::write(dir.join(name), content).unwrap();
    }

    fn loader(temp: &TempDir, env: &[(&str, &str)]) -> ConfigLoader {
        ConfigLoader::new(
            ProjectPaths::new(temp.path()),
            env.iter().copied().collect(),
        )
    }

    #[test]
    fn test_normalize_path() {
        assert_eq!(
            normalize_path(Path::new("/a/./b/../c")),
            PathBuf::from("/a/c")
        );
    }

    #[test]
    fn test_load_single_file() {
        let temp = TempDir::new().unwrap();
        write(temp.path(), "odoo.yaml", "odoo:\n  options:\n    db_name: prod\n");

        let config = loader(&temp, &[]).load(temp.path().join("odoo.yaml")).unwrap();
        assert_eq!(config.opt("db_name"), Some(&ConfigValue::from("prod")));
    }

    #[test]
    fn test_extend_chain_derived_wins() {
        let temp = TempDir::new().unwrap();
        write(temp.path(), "base.yaml", "a: 1\nb: {x: 1, y: 1}\nl: [1]\n");
        write(
            temp.path(),
            "mid.yaml",
            "bootstrap:\n  extend: base.yaml\nb: {y: 2}\nl: [2]\n",
        );
        write(
            temp.path(),
            "local.yaml",
            "bootstrap:\n  extend: [mid.yaml]\na: 3\n",
        );

        let config = loader(&temp, &[]).load("local.yaml").unwrap();
        assert_eq!(config.get(&["a"]), Some(&ConfigValue::Int(3)));
        assert_eq!(config.get(&["b", "x"]), Some(&ConfigValue::Int(1)));
        assert_eq!(config.get(&["b", "y"]), Some(&ConfigValue::Int(2)));
        assert_eq!(
            config.get(&["l"]),
            Some(&ConfigValue::Sequence(vec![
                ConfigValue::Int(1),
                ConfigValue::Int(2)
            ]))
        );
    }

    #[test]
    fn test_invalid_extend_is_fatal() {
        let temp = TempDir::new().unwrap();
        write(temp.path(), "odoo.yaml", "bootstrap:\n  extend: 1\n");

        let err = loader(&temp, &[]).load("odoo.yaml").unwrap_err();
        assert!(matches!(err, ConfigError::InvalidExtend { .. }));
        assert_eq!(err.to_string(), "bootstrap:extend must be str or list");
    }

    #[test]
    fn test_extend_cycle_is_detected() {
        let temp = TempDir::new().unwrap();
        write(temp.path(), "a.yaml", "bootstrap:\n  extend: b.yaml\n");
        write(temp.path(), "b.yaml", "bootstrap:\n  extend: a.yaml\n");

        let err = loader(&temp, &[]).load("a.yaml").unwrap_err();
        assert!(matches!(err, ConfigError::ExtendCycle { .. }));
    }

    #[test]
    fn test_missing_required_file() {
        let temp = TempDir::new().unwrap();
        let err = loader(&temp, &[]).load("nope.yaml").unwrap_err();
        assert!(matches!(err, ConfigError::Io { .. }));
    }

    #[test]
    fn test_malformed_yaml() {
        let temp = TempDir::new().unwrap();
        write(temp.path(), "odoo.yaml", "a: [unclosed\n");
        let err = loader(&temp, &[]).load("odoo.yaml").unwrap_err();
        assert!(matches!(err, ConfigError::Parse { .. }));
    }

    #[test]
    fn test_versions_file_is_optional_and_merged() {
        let temp = TempDir::new().unwrap();
        write(temp.path(), "odoo.yaml", "odoo:\n  version: '14.0'\n");
        let config = loader(&temp, &[]).load("odoo.yaml").unwrap();
        assert_eq!(config.get(&["odoo", "version"]), Some(&ConfigValue::from("14.0")));

        write(temp.path(), VERSIONS_FILE, "odoo:\n  version: '15.0'\n");
        let config = loader(&temp, &[]).load("odoo.yaml").unwrap();
        assert_eq!(config.get(&["odoo", "version"]), Some(&ConfigValue::from("15.0")));
    }

    #[test]
    fn test_environment_overrides() {
        let temp = TempDir::new().unwrap();
        write(
            temp.path(),
            "odoo.yaml",
            "odoo:\n  version: '14.0'\n  options:\n    workers: 2\n    db_host: db\n    label: 'v${odoo:version}'\n",
        );

        let env = [
            ("ODOO_VERSION", "16.0"),
            ("ODOO_WORKERS", "8"),
            ("ODOO_DB_HOST", ""),
            ("BOOTSTRAP_MODE", "staging"),
        ];
        let config = loader(&temp, &env).load("odoo.yaml").unwrap();
        assert_eq!(config.get(&["odoo", "version"]), Some(&ConfigValue::from("16.0")));
        assert_eq!(config.opt("workers"), Some(&ConfigValue::from("8")));
        // Empty variables are ignored
        assert_eq!(config.opt("db_host"), Some(&ConfigValue::from("db")));
        assert_eq!(config.get(&[SECTION, "mode"]), Some(&ConfigValue::from("staging")));
        // Substitution sees the overridden value
        assert_eq!(config.opt("label"), Some(&ConfigValue::from("v16.0")));
    }

    #[test]
    fn test_addons_path_is_absolute_and_includes_internal_path() {
        let temp = TempDir::new().unwrap();
        write(
            temp.path(),
            "odoo.yaml",
            "odoo:\n  addons_path: [odoo/addons, ./odoo/addons, /opt/extra]\n",
        );

        let config = loader(&temp, &[]).load("odoo.yaml").unwrap();
        let root = ProjectPaths::new(temp.path()).root;
        let expected: BTreeSet<String> = [
            root.join("odoo/addons"),
            PathBuf::from("/opt/extra"),
            root.join(ADDON_PATH),
        ]
        .iter()
        .map(|p| p.to_string_lossy().into_owned())
        .collect();
        assert_eq!(config.opt("addons_path"), Some(&ConfigValue::Set(expected)));
    }

    #[test]
    fn test_repo_defaults_are_merged_with_replaced_merges() {
        let temp = TempDir::new().unwrap();
        write(
            temp.path(),
            "odoo.yaml",
            "bootstrap:\n  repo:\n    defaults: {depth: 1}\n    merges: [origin 15.0]\nrepos:\n  odoo:\n    merges: [origin 16.0]\n  other: {}\n",
        );

        let config = loader(&temp, &[]).load("odoo.yaml").unwrap();
        assert_eq!(
            config.get(&["repos", "odoo", "merges"]),
            Some(&ConfigValue::Sequence(vec!["origin 16.0".into()]))
        );
        assert_eq!(
            config.get(&["repos", "odoo", "defaults", "depth"]),
            Some(&ConfigValue::Int(1))
        );
        assert_eq!(
            config.get(&["repos", "other", "merges"]),
            Some(&ConfigValue::Sequence(vec!["origin 15.0".into()]))
        );
    }
}
