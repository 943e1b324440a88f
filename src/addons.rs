//! Addon linking.
//!
//! Every module found in a configured repository is symlinked into the
//! internal addon directory, honoring the repository's module filters.
//! Entries in `modules` prefixed with `!` are blacklisted; the others form a
//! whitelist that, when non-empty, is the only modules linked.

use crate::config::{Config, ConfigValue};
use anyhow::{Context, Result};
use std::collections::BTreeSet;
use std::path::Path;
use tracing::{info, warn};

/// Files marking a directory as a module.
pub const MANIFESTS: &[&str] = &["__manifest__.py", "__openerp__.py"];

/// Whether `name` passes a whitelist and blacklist.
pub fn check_filters(name: &str, whitelist: &BTreeSet<String>, blacklist: &BTreeSet<String>) -> bool {
    (whitelist.is_empty() || whitelist.contains(name)) && !blacklist.contains(name)
}

/// Split a `modules` filter list into whitelist and blacklist.
pub fn split_filters(modules: &[String]) -> (BTreeSet<String>, BTreeSet<String>) {
    let mut whitelist = BTreeSet::new();
    let mut blacklist = BTreeSet::new();
    for module in modules {
        match module.strip_prefix('!') {
            Some(name) => blacklist.insert(name.to_string()),
            None => whitelist.insert(module.clone()),
        };
    }
    (whitelist, blacklist)
}

pub fn is_module(path: &Path) -> bool {
    MANIFESTS.iter().any(|manifest| path.join(manifest).is_file())
}

/// Recreate the internal addon directory and link all repository modules.
///
/// Returns the number of linked modules.
pub fn link_modules(config: &Config) -> Result<usize> {
    let addon_path = config.paths().addon_path();
    match std::fs::remove_dir_all(&addon_path) {
        Err(e) if e.kind() != std::io::ErrorKind::NotFound => {
            return Err(e).with_context(|| format!("Failed to clear {}", addon_path.display()));
        }
        _ => {}
    }
    std::fs::create_dir_all(&addon_path)
        .with_context(|| format!("Failed to create {}", addon_path.display()))?;
    info!("Linking Odoo modules");

    let Some(repos) = config.get(&["repos"]).and_then(ConfigValue::as_mapping) else {
        return Ok(0);
    };

    let mut linked = 0;
    for (name, repo) in repos {
        let target = repo
            .get(&["addon_path"])
            .and_then(ConfigValue::as_str)
            .unwrap_or(name);
        let target = config.paths().resolve(target);
        let filters = repo
            .get(&["modules"])
            .map(ConfigValue::to_string_list)
            .unwrap_or_default();
        let (whitelist, blacklist) = split_filters(&filters);

        if !target.is_dir() {
            warn!("Repository directory {} is missing", target.display());
            continue;
        }

        let mut entries: Vec<_> = std::fs::read_dir(&target)
            .with_context(|| format!("Failed to list {}", target.display()))?
            .filter_map(|entry| entry.ok())
            .collect();
        entries.sort_by_key(|entry| entry.file_name());

        for entry in entries {
            let path = entry.path();
            let module = entry.file_name().to_string_lossy().into_owned();
            if !is_module(&path) || !check_filters(&module, &whitelist, &blacklist) {
                continue;
            }

            symlink_dir(&path, &addon_path.join(&module))
                .with_context(|| format!("Failed to link module {module}"))?;
            linked += 1;
        }
    }

    Ok(linked)
}

#[cfg(unix)]
fn symlink_dir(src: &Path, dst: &Path) -> std::io::Result<()> {
    std::os::unix::fs::symlink(src, dst)
}

#[cfg(windows)]
fn symlink_dir(src: &Path, dst: &Path) -> std::io::Result<()> {
    std::os::windows::fs::symlink_dir(src, dst)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ProjectPaths;
    use tempfile::TempDir;

    fn names(items: &[&str]) -> BTreeSet<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_check_filters() {
        assert!(check_filters("a", &names(&[]), &names(&[])));
        assert!(check_filters("a", &names(&["a"]), &names(&[])));
        assert!(!check_filters("b", &names(&["a"]), &names(&[])));
        assert!(!check_filters("a", &names(&[]), &names(&["a"])));
    }

    #[test]
    fn test_split_filters() {
        let (white, black) = split_filters(&["a".to_string(), "!b".to_string()]);
        assert_eq!(white, names(&["a"]));
        assert_eq!(black, names(&["b"]));
    }

    #[cfg(unix)]
    #[test]
    fn test_link_modules() {
        let temp = TempDir::new().unwrap();
        let repo = temp.path().join("addons");
        for module in ["sale_x", "stock_x", "legacy_x"] {
            std::fs::create_dir_all(repo.join(module)).unwrap();
        }
        std::fs::write(repo.join("sale_x/__manifest__.py"), "{}").unwrap();
        std::fs::write(repo.join("stock_x/__manifest__.py"), "{}").unwrap();
        std::fs::write(repo.join("legacy_x/__openerp__.py"), "{}").unwrap();
        std::fs::create_dir_all(repo.join("not_a_module")).unwrap();

        let tree: ConfigValue = serde_yaml::from_str::<serde_yaml::Value>(
            "repos: {addons: {modules: ['!stock_x']}, missing: {}}",
        )
        .unwrap()
        .into();
        let config = Config::new(tree, ProjectPaths::new(temp.path()), "o.yaml".into());

        assert_eq!(link_modules(&config).unwrap(), 2);
        let addon_path = config.paths().addon_path();
        assert!(addon_path.join("sale_x").exists());
        assert!(addon_path.join("legacy_x").exists());
        assert!(!addon_path.join("stock_x").exists());
        assert!(!addon_path.join("not_a_module").exists());
    }
}
