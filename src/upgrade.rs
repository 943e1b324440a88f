//! Module upgrade orchestration.
//!
//! `dob update` walks a fixed sequence of states against one database:
//!
//! ```text
//! Start -> DbCheck -> Initialize | AlreadyInitialized -> PreInstall -> InstallMissing
//!       -> AutoInstall -> PreUpdate -> UpdateModules -> PostUpdate -> Finalize -> Done
//! ```
//!
//! No state is entered twice. A failing runtime call stops the run with the
//! phase named in the error; work already committed by the runtime stays.

use crate::config::{Config, ConfigValue, SECTION};
use crate::error::ConfigResult;
use crate::modules::{active_modes, auto_install_closure, resolve_declared, resolve_installed};
use crate::runtime::{InstallOptions, Runtime, UpdateSelection};
use crate::scripts::{DB_VERSION_PARAM, ScriptRegistry};
use anyhow::Result;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use tracing::{debug, info};

/// Version stamped when `bootstrap:version` is not configured.
pub const DEFAULT_DB_VERSION: &str = "0.0";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpgradeState {
    Start,
    DbCheck,
    Initialize,
    AlreadyInitialized,
    PreInstall,
    InstallMissing,
    AutoInstall,
    PreUpdate,
    UpdateModules,
    PostUpdate,
    Finalize,
    Done,
}

impl UpgradeState {
    /// The state following `self`; `needs_init` picks the branch after `DbCheck`.
    pub fn next(self, needs_init: bool) -> Option<Self> {
        use UpgradeState::*;
        Some(match self {
            Start => DbCheck,
            DbCheck if needs_init => Initialize,
            DbCheck => AlreadyInitialized,
            Initialize | AlreadyInitialized => PreInstall,
            PreInstall => InstallMissing,
            InstallMissing => AutoInstall,
            AutoInstall => PreUpdate,
            PreUpdate => UpdateModules,
            UpdateModules => PostUpdate,
            PostUpdate => Finalize,
            Finalize => Done,
            Done => return None,
        })
    }
}

impl fmt::Display for UpgradeState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// What the caller asked `update` to do.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UpdateRequest {
    pub modules: Vec<String>,
    pub all: bool,
    pub listed: bool,
    pub passwords: bool,
}

/// The update branch selected from an [`UpdateRequest`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UpdateMode {
    Specific(BTreeSet<String>),
    All,
    Listed,
    Changed,
}

impl UpdateRequest {
    /// Explicit modules win over `--all`, which wins over `--listed`.
    pub fn mode(&self) -> UpdateMode {
        if !self.modules.is_empty() {
            UpdateMode::Specific(self.modules.iter().cloned().collect())
        } else if self.all {
            UpdateMode::All
        } else if self.listed {
            UpdateMode::Listed
        } else {
            UpdateMode::Changed
        }
    }
}

/// Settings the upgrade reads from the configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpgradeSettings {
    pub declared: BTreeSet<String>,
    pub install: InstallOptions,
    /// Login to password.
    pub users: BTreeMap<String, String>,
    pub version: String,
}

impl UpgradeSettings {
    pub fn from_config(config: &Config) -> ConfigResult<Self> {
        let declared = resolve_declared(config.tree(), &active_modes(config))?;

        let install = InstallOptions {
            without_demo: config.opt("without_demo").is_none_or(ConfigValue::to_bool),
            languages: config
                .opt("load_language")
                .map(ConfigValue::to_string_list)
                .unwrap_or_default(),
        };

        let users = config
            .get(&["odoo", "users"])
            .and_then(ConfigValue::as_mapping)
            .map(|users| {
                users
                    .iter()
                    .map(|(login, password)| (login.clone(), password.render()))
                    .collect()
            })
            .unwrap_or_default();

        let version = config
            .get(&[SECTION, "version"])
            .map(ConfigValue::render)
            .unwrap_or_else(|| DEFAULT_DB_VERSION.to_string());

        Ok(Self {
            declared,
            install,
            users,
            version,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PhaseStatus {
    Passed,
    Skipped,
    Failed,
}

/// Record of a finished upgrade.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UpgradeRun {
    /// Whether this run initialized the database.
    pub initialized: bool,
    /// Modules installed by `InstallMissing`.
    pub uninstalled: BTreeSet<String>,
    /// Modules installed by `AutoInstall`.
    pub auto_installed: BTreeSet<String>,
    /// Selection passed to the update pass, if any.
    pub updated: Option<UpdateSelection>,
    /// Whether the changed-module detector handled the update.
    pub changed_only: bool,
    pub phases: Vec<(UpgradeState, PhaseStatus)>,
}

impl UpgradeRun {
    pub fn status(&self, state: UpgradeState) -> Option<PhaseStatus> {
        self.phases
            .iter()
            .find(|(s, _)| *s == state)
            .map(|(_, status)| *status)
    }
}

/// Context attached to the error of a failed upgrade.
///
/// Holds the phases recorded up to and including the failing one; callers
/// get it back with `err.downcast_ref::<UpgradeFailure>()`.
#[derive(Debug, Clone)]
pub struct UpgradeFailure {
    pub db: String,
    pub state: UpgradeState,
    pub run: UpgradeRun,
}

impl fmt::Display for UpgradeFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Upgrade of '{}' failed in {}", self.db, self.state)
    }
}

/// Drives one database through the upgrade states.
pub struct Upgrade<'a, R: Runtime + ?Sized> {
    runtime: &'a R,
    scripts: &'a ScriptRegistry,
    settings: &'a UpgradeSettings,
    request: &'a UpdateRequest,
    db: &'a str,
    run: UpgradeRun,
}

impl<'a, R: Runtime + ?Sized> Upgrade<'a, R> {
    pub fn new(
        runtime: &'a R,
        scripts: &'a ScriptRegistry,
        settings: &'a UpgradeSettings,
        request: &'a UpdateRequest,
        db: &'a str,
    ) -> Self {
        Self {
            runtime,
            scripts,
            settings,
            request,
            db,
            run: UpgradeRun::default(),
        }
    }

    /// Run every state in order.
    pub fn run(mut self) -> Result<UpgradeRun> {
        let mut state = UpgradeState::Start;
        loop {
            debug!(db = self.db, phase = %state, "upgrade phase");
            match self.step(state) {
                Ok(status) => self.run.phases.push((state, status)),
                Err(err) => {
                    self.run.phases.push((state, PhaseStatus::Failed));
                    return Err(err.context(UpgradeFailure {
                        db: self.db.to_string(),
                        state,
                        run: self.run,
                    }));
                }
            }

            match state.next(self.run.initialized) {
                Some(next) => state = next,
                None => return Ok(self.run),
            }
        }
    }

    fn step(&mut self, state: UpgradeState) -> Result<PhaseStatus> {
        use UpgradeState::*;
        match state {
            Start | Done | AlreadyInitialized => Ok(PhaseStatus::Passed),
            DbCheck => {
                self.run.initialized = !self.runtime.is_initialized(self.db)?;
                Ok(PhaseStatus::Passed)
            }
            Initialize => {
                info!("Initializing the database");
                self.runtime.initialize(self.db, &self.settings.install)?;
                Ok(PhaseStatus::Passed)
            }
            PreInstall => self.script("pre_install"),
            PreUpdate => self.script("pre_update"),
            PostUpdate => self.script("post_update"),
            InstallMissing => self.install_missing(),
            AutoInstall => self.auto_install(),
            UpdateModules => self.update_modules(),
            Finalize => self.finalize(),
        }
    }

    fn script(&self, name: &str) -> Result<PhaseStatus> {
        match self.scripts.hook(name) {
            Some(script) => {
                script.run(self.runtime, self.db)?;
                Ok(PhaseStatus::Passed)
            }
            None => Ok(PhaseStatus::Skipped),
        }
    }

    fn install_missing(&mut self) -> Result<PhaseStatus> {
        let declared = &self.settings.declared;
        self.run.uninstalled = if self.run.initialized {
            declared.clone()
        } else {
            let installed = resolve_installed(self.runtime, self.db)?;
            declared.difference(&installed).cloned().collect()
        };

        info!("Installing all modules");
        if self.run.uninstalled.is_empty() {
            return Ok(PhaseStatus::Skipped);
        }
        self.runtime
            .install(self.db, &self.run.uninstalled, &self.settings.install)?;
        Ok(PhaseStatus::Passed)
    }

    fn auto_install(&mut self) -> Result<PhaseStatus> {
        let metadata = self.runtime.query_module_metadata(self.db)?;
        let countries = self.runtime.query_company_countries(self.db)?;
        self.run.auto_installed = auto_install_closure(&metadata, &countries);

        if self.run.auto_installed.is_empty() {
            return Ok(PhaseStatus::Skipped);
        }
        info!("Installing auto-install modules");
        self.runtime
            .install(self.db, &self.run.auto_installed, &self.settings.install)?;
        Ok(PhaseStatus::Passed)
    }

    fn update_modules(&mut self) -> Result<PhaseStatus> {
        let selection = match self.request.mode() {
            UpdateMode::Specific(modules) => {
                info!("Updating specific modules");
                let installed = resolve_installed(self.runtime, self.db)?;
                let selected: BTreeSet<String> = installed
                    .intersection(&modules)
                    .filter(|m| !self.run.uninstalled.contains(*m))
                    .filter(|m| !self.run.auto_installed.contains(*m))
                    .cloned()
                    .collect();
                if selected.is_empty() {
                    return Ok(PhaseStatus::Skipped);
                }
                UpdateSelection::Modules(selected)
            }
            UpdateMode::All => {
                info!("Updating all modules");
                UpdateSelection::All
            }
            UpdateMode::Listed => {
                info!("Updating listed modules");
                UpdateSelection::Modules(self.settings.declared.clone())
            }
            UpdateMode::Changed => {
                info!("Updating changed modules");
                if self.runtime.update_changed(self.db)? {
                    self.run.changed_only = true;
                    return Ok(PhaseStatus::Passed);
                }
                info!("No changed-module detection available, updating all modules");
                UpdateSelection::All
            }
        };

        self.runtime.update(self.db, &selection)?;
        self.run.updated = Some(selection);
        Ok(PhaseStatus::Passed)
    }

    fn finalize(&mut self) -> Result<PhaseStatus> {
        if (self.run.initialized || self.request.passwords) && !self.settings.users.is_empty() {
            info!("Setting user passwords");
            for (login, password) in &self.settings.users {
                self.runtime.set_password(self.db, login, password)?;
            }
        }

        info!("Setting database version");
        self.runtime
            .set_config_param(self.db, DB_VERSION_PARAM, &self.settings.version)?;
        Ok(PhaseStatus::Passed)
    }
}
