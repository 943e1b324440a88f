//! Module set resolution.
//!
//! Computes which modules a project declares for the active modes, which are
//! installed in a database, and which auto-install modules become eligible
//! once a set of modules is in place.

use crate::config::{Config, ConfigValue, SECTION};
use crate::error::{ConfigError, ConfigResult};
use crate::runtime::Runtime;
use anyhow::Result;
use std::collections::{BTreeMap, BTreeSet};

/// The module every database has.
pub const BASE_MODULE: &str = "base";

/// Installation state of a module as recorded by the platform.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModuleState {
    Installed,
    ToUpgrade,
    ToInstall,
    ToRemove,
    Uninstalled,
    Uninstallable,
}

impl ModuleState {
    pub fn parse(state: &str) -> Self {
        match state {
            "installed" => Self::Installed,
            "to upgrade" => Self::ToUpgrade,
            "to install" => Self::ToInstall,
            "to remove" => Self::ToRemove,
            "uninstallable" => Self::Uninstallable,
            _ => Self::Uninstalled,
        }
    }

    /// Whether the module satisfies a dependency of another module.
    pub fn satisfies_dependency(&self) -> bool {
        matches!(self, Self::Installed | Self::ToUpgrade | Self::ToInstall)
    }
}

/// What the platform knows about one module.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModuleInfo {
    pub name: String,
    pub state: ModuleState,
    pub dependencies: BTreeSet<String>,
    pub auto_install: bool,
    /// Country codes the module is restricted to. Empty means unrestricted.
    pub countries: BTreeSet<String>,
}

impl ModuleInfo {
    pub fn new(name: impl Into<String>, state: ModuleState) -> Self {
        Self {
            name: name.into(),
            state,
            dependencies: BTreeSet::new(),
            auto_install: false,
            countries: BTreeSet::new(),
        }
    }
}

/// Active modes from `bootstrap:mode`, a comma separated string or a list.
pub fn active_modes(config: &Config) -> BTreeSet<String> {
    config
        .get(&[SECTION, "mode"])
        .map(ConfigValue::to_string_list)
        .unwrap_or_default()
        .into_iter()
        .collect()
}

/// Modules declared under `modules` for the given modes, always including `base`.
///
/// Each entry is either a module name or a one-entry mapping from module
/// name to the mode (or list of modes) it is restricted to.
pub fn resolve_declared(
    tree: &ConfigValue,
    modes: &BTreeSet<String>,
) -> ConfigResult<BTreeSet<String>> {
    let mut modules = BTreeSet::from([BASE_MODULE.to_string()]);

    let entries = match tree.get(&["modules"]) {
        None => return Ok(modules),
        Some(ConfigValue::Sequence(entries)) => entries.as_slice(),
        Some(_) => return Err(ConfigError::InvalidModuleSpec),
    };

    for entry in entries {
        match entry {
            ConfigValue::String(name) => {
                modules.insert(name.clone());
            }
            ConfigValue::Mapping(map) if map.len() == 1 => {
                let Some((name, mode)) = map.iter().next() else {
                    continue;
                };
                let selected = match mode {
                    ConfigValue::String(mode) => modes.contains(mode),
                    ConfigValue::Sequence(list) => list
                        .iter()
                        .filter_map(ConfigValue::as_str)
                        .any(|mode| modes.contains(mode)),
                    _ => false,
                };
                if selected {
                    modules.insert(name.clone());
                }
            }
            _ => return Err(ConfigError::InvalidModuleSpec),
        }
    }

    Ok(modules)
}

/// Modules installed in `db`, always including `base`.
pub fn resolve_installed<R: Runtime + ?Sized>(runtime: &R, db: &str) -> Result<BTreeSet<String>> {
    let mut installed = runtime.query_installed(db)?;
    installed.insert(BASE_MODULE.to_string());
    Ok(installed)
}

/// Auto-install modules that become installable given the current states.
///
/// A candidate is an uninstalled auto-install module. It is selected once
/// every dependency is installed, scheduled, or itself selected. Candidates
/// restricted to countries that none of the companies belong to are
/// excluded. Selection repeats until nothing changes, so chains of
/// auto-install modules resolve and dependency cycles simply never qualify.
pub fn auto_install_closure(
    modules: &BTreeMap<String, ModuleInfo>,
    company_countries: &BTreeSet<String>,
) -> BTreeSet<String> {
    let satisfied: BTreeSet<&str> = modules
        .values()
        .filter(|m| m.state.satisfies_dependency())
        .map(|m| m.name.as_str())
        .collect();

    let mut candidates: Vec<&ModuleInfo> = modules
        .values()
        .filter(|m| m.auto_install && m.state == ModuleState::Uninstalled)
        .filter(|m| {
            m.countries.is_empty()
                || m.countries
                    .iter()
                    .any(|c| company_countries.contains(&c.to_ascii_uppercase()))
        })
        .collect();

    let mut selected = BTreeSet::new();
    loop {
        let before = selected.len();
        candidates.retain(|m| {
            let ready = m
                .dependencies
                .iter()
                .all(|dep| satisfied.contains(dep.as_str()) || selected.contains(dep));
            if ready {
                selected.insert(m.name.clone());
            }
            !ready
        });
        if selected.len() == before {
            break;
        }
    }

    selected
}
