//! Migration script registry.
//!
//! Scripts live in the project root and are found by name:
//! - `pre_install.py`, `pre_update.py`, `post_update.py` for upgrades
//! - `pre_migrate_<major>.py|.sql`, `post_migrate_<major>.py|.sql` for migrations
//!
//! Python scripts are hooks exposing `migrate(env, version)`; SQL scripts run
//! directly against the database.

use crate::runtime::Runtime;
use crate::version::Version;
use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use tracing::info;

/// Parameter holding the version the database was last upgraded to.
pub const DB_VERSION_PARAM: &str = "db_version";

const UPGRADE_SCRIPTS: &[&str] = &["pre_install", "pre_update", "post_update"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ScriptKind {
    Sql,
    Hook,
}

impl ScriptKind {
    fn from_extension(ext: &str) -> Option<Self> {
        match ext {
            "py" => Some(Self::Hook),
            "sql" => Some(Self::Sql),
            _ => None,
        }
    }
}

/// A discovered script.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MigrationScript {
    pub name: String,
    pub kind: ScriptKind,
    pub path: PathBuf,
}

impl MigrationScript {
    /// Execute the script against `db`.
    ///
    /// Hooks receive the version currently stamped in the database.
    pub fn run<R: Runtime + ?Sized>(&self, runtime: &R, db: &str) -> Result<()> {
        info!("Executing {} script", self.name.replace('_', " "));
        match self.kind {
            ScriptKind::Sql => runtime.execute_sql(db, &self.path),
            ScriptKind::Hook => {
                let version = runtime
                    .get_config_param(db, DB_VERSION_PARAM)?
                    .map(|v| Version::parse(&v))
                    .unwrap_or_default();
                runtime.run_hook(db, &self.path, &version)
            }
        }
    }
}

/// Whether `name` follows one of the script naming conventions.
pub fn is_conventional(name: &str) -> bool {
    if UPGRADE_SCRIPTS.contains(&name) {
        return true;
    }
    ["pre_migrate_", "post_migrate_"].iter().any(|prefix| {
        name.strip_prefix(prefix)
            .is_some_and(|major| !major.is_empty() && major.bytes().all(|b| b.is_ascii_digit()))
    })
}

/// Scripts discovered in one directory, ordered by name then kind.
#[derive(Debug, Clone, Default)]
pub struct ScriptRegistry {
    scripts: Vec<MigrationScript>,
}

impl ScriptRegistry {
    pub fn empty() -> Self {
        Self::default()
    }

    /// Enumerate the conventionally named scripts in `dir`.
    pub fn discover(dir: &Path) -> Result<Self> {
        let mut scripts = Vec::new();
        let entries = std::fs::read_dir(dir)
            .with_context(|| format!("Failed to list scripts in {}", dir.display()))?;

        for entry in entries.filter_map(|entry| entry.ok()) {
            let path = entry.path();
            if !path.is_file() {
                continue;
            }
            let (Some(stem), Some(ext)) = (
                path.file_stem().and_then(|s| s.to_str()),
                path.extension().and_then(|s| s.to_str()),
            ) else {
                continue;
            };
            let Some(kind) = ScriptKind::from_extension(ext) else {
                continue;
            };
            if is_conventional(stem) {
                scripts.push(MigrationScript {
                    name: stem.to_string(),
                    kind,
                    path: path.clone(),
                });
            }
        }

        Ok(Self::from_scripts(scripts))
    }

    pub fn from_scripts(mut scripts: Vec<MigrationScript>) -> Self {
        scripts.sort_by(|a, b| (&a.name, a.kind).cmp(&(&b.name, b.kind)));
        Self { scripts }
    }

    pub fn scripts(&self) -> &[MigrationScript] {
        &self.scripts
    }

    fn find(&self, name: &str, kind: ScriptKind) -> Option<&MigrationScript> {
        self.scripts
            .iter()
            .find(|script| script.name == name && script.kind == kind)
    }

    pub fn hook(&self, name: &str) -> Option<&MigrationScript> {
        self.find(name, ScriptKind::Hook)
    }

    pub fn sql(&self, name: &str) -> Option<&MigrationScript> {
        self.find(name, ScriptKind::Sql)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_conventional_names() {
        assert!(is_conventional("pre_install"));
        assert!(is_conventional("post_update"));
        assert!(is_conventional("pre_migrate_15"));
        assert!(!is_conventional("pre_migrate_"));
        assert!(!is_conventional("pre_migrate_x"));
        assert!(!is_conventional("setup"));
    }

    #[test]
    fn test_discover_orders_scripts() {
        let temp = TempDir::new().unwrap();
        for name in [
            "pre_update.py",
            "pre_migrate_15.py",
            "pre_migrate_15.sql",
            "post_update.sh",
            "helper.py",
        ] {
            std::fs::write(temp.path().join(name), "").unwrap();
        }

        let registry = ScriptRegistry::discover(temp.path()).unwrap();
        let found: Vec<_> = registry
            .scripts()
            .iter()
            .map(|s| (s.name.as_str(), s.kind))
            .collect();
        assert_eq!(
            found,
            vec![
                ("pre_migrate_15", ScriptKind::Sql),
                ("pre_migrate_15", ScriptKind::Hook),
                ("pre_update", ScriptKind::Hook),
            ]
        );
        assert!(registry.hook("pre_update").is_some());
        assert!(registry.sql("pre_update").is_none());
    }
}
