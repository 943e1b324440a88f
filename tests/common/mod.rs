//! Shared fakes for integration tests.

#![allow(dead_code)]

use anyhow::{Result, bail};
use dob::aggregate::{Aggregator, RepoSpec};
use dob::modules::{ModuleInfo, ModuleState};
use dob::runtime::{InstallOptions, Runtime, UpdateSelection};
use dob::scripts::{MigrationScript, ScriptKind, ScriptRegistry};
use dob::version::Version;
use std::cell::RefCell;
use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

/// A runtime operation recorded by [`FakeRuntime`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    Initialize(InstallOptions),
    Install(BTreeSet<String>),
    Update(UpdateSelection),
    UpdateChanged,
    SetPassword(String, String),
    SetParam(String, String),
    Hook(String, String),
    Sql(String),
    UpgradeAll(Vec<String>),
}

/// In-memory runtime that records every mutating call.
#[derive(Debug, Default)]
pub struct FakeRuntime {
    pub initialized: bool,
    pub installed: BTreeSet<String>,
    pub metadata: BTreeMap<String, ModuleInfo>,
    pub countries: BTreeSet<String>,
    pub changed_detection: bool,
    pub upgrade_code: i32,
    pub fail_install: bool,
    pub params: RefCell<BTreeMap<String, String>>,
    pub calls: RefCell<Vec<Call>>,
}

impl FakeRuntime {
    pub fn new() -> Self {
        Self::default()
    }

    /// An initialized database with `installed` modules.
    pub fn with_installed(installed: &[&str]) -> Self {
        Self {
            initialized: true,
            installed: names(installed),
            ..Self::default()
        }
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.borrow().clone()
    }

    pub fn count(&self, pred: impl Fn(&Call) -> bool) -> usize {
        self.calls.borrow().iter().filter(|c| pred(c)).count()
    }

    fn record(&self, call: Call) {
        self.calls.borrow_mut().push(call);
    }
}

fn stem(path: &Path) -> String {
    path.file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default()
}

impl Runtime for FakeRuntime {
    fn is_initialized(&self, _db: &str) -> Result<bool> {
        Ok(self.initialized)
    }

    fn initialize(&self, _db: &str, options: &InstallOptions) -> Result<()> {
        self.record(Call::Initialize(options.clone()));
        Ok(())
    }

    fn install(
        &self,
        _db: &str,
        modules: &BTreeSet<String>,
        _options: &InstallOptions,
    ) -> Result<()> {
        self.record(Call::Install(modules.clone()));
        if self.fail_install {
            bail!("install failed");
        }
        Ok(())
    }

    fn update(&self, _db: &str, selection: &UpdateSelection) -> Result<()> {
        self.record(Call::Update(selection.clone()));
        Ok(())
    }

    fn update_changed(&self, _db: &str) -> Result<bool> {
        if self.changed_detection {
            self.record(Call::UpdateChanged);
        }
        Ok(self.changed_detection)
    }

    fn query_installed(&self, _db: &str) -> Result<BTreeSet<String>> {
        Ok(self.installed.clone())
    }

    fn query_module_metadata(&self, _db: &str) -> Result<BTreeMap<String, ModuleInfo>> {
        Ok(self.metadata.clone())
    }

    fn query_company_countries(&self, _db: &str) -> Result<BTreeSet<String>> {
        Ok(self.countries.clone())
    }

    fn get_config_param(&self, _db: &str, key: &str) -> Result<Option<String>> {
        Ok(self.params.borrow().get(key).cloned())
    }

    fn set_config_param(&self, _db: &str, key: &str, value: &str) -> Result<()> {
        self.params
            .borrow_mut()
            .insert(key.to_string(), value.to_string());
        self.record(Call::SetParam(key.to_string(), value.to_string()));
        Ok(())
    }

    fn set_password(&self, _db: &str, login: &str, password: &str) -> Result<()> {
        self.record(Call::SetPassword(login.to_string(), password.to_string()));
        Ok(())
    }

    fn run_hook(&self, _db: &str, script: &Path, db_version: &Version) -> Result<()> {
        self.record(Call::Hook(stem(script), db_version.to_string()));
        Ok(())
    }

    fn execute_sql(&self, _db: &str, script: &Path) -> Result<()> {
        self.record(Call::Sql(stem(script)));
        Ok(())
    }

    fn upgrade_all(&self, _db: &str, load: &[&str]) -> Result<i32> {
        self.record(Call::UpgradeAll(load.iter().map(|s| s.to_string()).collect()));
        Ok(self.upgrade_code)
    }
}

/// Aggregator that records repositories and fails the named ones.
#[derive(Debug, Default)]
pub struct FakeAggregator {
    pub failing: BTreeSet<String>,
    pub processed: Mutex<Vec<String>>,
}

impl FakeAggregator {
    pub fn failing(names_: &[&str]) -> Self {
        Self {
            failing: names(names_),
            ..Self::default()
        }
    }

    pub fn processed(&self) -> Vec<String> {
        let mut processed = self.processed.lock().unwrap().clone();
        processed.sort();
        processed
    }
}

impl Aggregator for FakeAggregator {
    fn aggregate_repo(&self, repo: &RepoSpec, _force: bool) -> Result<()> {
        self.processed.lock().unwrap().push(repo.name.clone());
        if self.failing.contains(&repo.name) {
            bail!("merge conflict in {}", repo.name);
        }
        Ok(())
    }
}

pub fn names(items: &[&str]) -> BTreeSet<String> {
    items.iter().map(|s| s.to_string()).collect()
}

pub fn module(name: &str, state: ModuleState, deps: &[&str], auto_install: bool) -> ModuleInfo {
    let mut info = ModuleInfo::new(name, state);
    info.dependencies = names(deps);
    info.auto_install = auto_install;
    info
}

/// Registry with hooks and SQL scripts at fake paths.
pub fn registry(hooks: &[&str], sql: &[&str]) -> ScriptRegistry {
    let scripts = hooks
        .iter()
        .map(|name| (name, ScriptKind::Hook, "py"))
        .chain(sql.iter().map(|name| (name, ScriptKind::Sql, "sql")))
        .map(|(name, kind, ext)| MigrationScript {
            name: name.to_string(),
            kind,
            path: PathBuf::from(format!("{name}.{ext}")),
        })
        .collect();
    ScriptRegistry::from_scripts(scripts)
}

pub fn repo(name: &str) -> RepoSpec {
    RepoSpec {
        name: name.to_string(),
        path: PathBuf::from("/srv/project").join(name),
        remotes: BTreeMap::new(),
        merges: Vec::new(),
        branch: "_git_aggregated".to_string(),
        shell_command_after: Vec::new(),
    }
}
