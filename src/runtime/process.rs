//! Runtime backed by a platform checkout and `psql`.

use super::psql::{Psql, quote_literal};
use super::{Capabilities, InstallOptions, Runtime, UpdateSelection};
use crate::config::Config;
use crate::error::PreconditionError;
use crate::modules::{ModuleInfo, ModuleState};
use crate::version::Version;
use anyhow::{Context, Result, anyhow, bail};
use std::collections::{BTreeMap, BTreeSet};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use tracing::{debug, info};

/// Module providing the changed-checksum detector.
const AUTO_UPDATE_MODULE: &str = "module_auto_update";

const DEBUGPY_ARGS: &[&str] = &["-m", "debugpy", "--listen", "0.0.0.0:5678", "--wait-for-client"];

const HOOK_SNIPPET: &str = r#"
import os, runpy
raw = os.environ.get("DOB_DB_VERSION", "")
version = tuple(int(x) if x.isdigit() else x for x in raw.split(".")) if raw else ()
namespace = runpy.run_path(os.environ["DOB_SCRIPT"])
if "migrate" in namespace:
    namespace["migrate"](env, version)
env.cr.commit()
"#;

const CHANGED_SNIPPET: &str = r#"
env["ir.module.module"].upgrade_changed_checksum(True)
env.cr.commit()
"#;

const PASSWORD_SNIPPET: &str = r#"
import os
users = env["res.users"].search([("login", "=", os.environ["DOB_LOGIN"])])
users.write({"password": os.environ["DOB_PASSWORD"]})
env.cr.commit()
"#;

/// Drives the platform through its command line interface.
#[derive(Debug, Clone)]
pub struct ProcessRuntime {
    platform_dir: PathBuf,
    config_file: PathBuf,
    python: String,
    capabilities: Capabilities,
    psql: Psql,
}

impl ProcessRuntime {
    /// Build a runtime for the platform checkout named by `bootstrap:odoo`.
    pub fn from_config(config: &Config) -> Result<Self, PreconditionError> {
        let platform_dir = config
            .platform_dir()
            .ok_or(PreconditionError::RuntimeNotFound {
                section: crate::config::SECTION,
            })?;
        if !platform_dir.is_dir() {
            return Err(PreconditionError::RuntimeMissing(platform_dir));
        }

        let capabilities = Capabilities::detect(&platform_dir)?;
        info!(
            "Detected platform version {} ({})",
            capabilities.version,
            capabilities.layout.executable()
        );

        Ok(Self {
            config_file: config.paths().runtime_config(),
            python: config.python(),
            psql: Psql::from_config(config),
            platform_dir,
            capabilities,
        })
    }

    pub fn capabilities(&self) -> &Capabilities {
        &self.capabilities
    }

    pub fn platform_dir(&self) -> &Path {
        &self.platform_dir
    }

    /// Command running the platform server with the generated configuration.
    pub fn server_command(&self, db: Option<&str>) -> Command {
        self.command_with(&[], db)
    }

    fn command_with(&self, interpreter_args: &[&str], db: Option<&str>) -> Command {
        let mut cmd = Command::new(&self.python);
        cmd.args(interpreter_args)
            .arg(self.platform_dir.join(self.capabilities.layout.executable()))
            .arg("-c")
            .arg(&self.config_file);
        if let Some(db) = db {
            cmd.args(["-d", db]);
        }
        cmd.current_dir(&self.platform_dir);
        cmd
    }

    /// Start the server in the foreground with extra arguments.
    ///
    /// `debugpy` waits for a debugger on port 5678; `dev` enables the
    /// platform's developer mode.
    pub fn start(&self, args: &[String], debugger: Option<&str>) -> Result<i32> {
        let mut cmd = match debugger {
            Some("debugpy") => {
                info!("Starting with debugger debugpy");
                self.command_with(DEBUGPY_ARGS, None)
            }
            _ => self.server_command(None),
        };
        cmd.args(args);
        if debugger == Some("dev") {
            cmd.arg("--dev=all");
        }

        let status = cmd
            .status()
            .map_err(|e| anyhow!("failed to start `{}`: {e}", self.python))?;
        Ok(status.code().unwrap_or(1))
    }

    fn run_server(&self, db: &str, args: &[String]) -> Result<i32> {
        let mut cmd = self.server_command(Some(db));
        cmd.args(args);
        debug!(?cmd, "starting platform");

        let status = cmd
            .status()
            .map_err(|e| anyhow!("failed to start `{}`: {e}", self.python))?;
        Ok(status.code().unwrap_or(1))
    }

    fn run_checked(&self, db: &str, args: &[String]) -> Result<()> {
        match self.run_server(db, args)? {
            0 => Ok(()),
            code => bail!("platform exited with status {code}"),
        }
    }

    /// Execute Python `code` in the platform shell with an `env` bound to `db`.
    fn shell(&self, db: &str, code: &str, vars: &[(&str, &str)]) -> Result<()> {
        let mut cmd = Command::new(&self.python);
        cmd.arg(self.platform_dir.join(self.capabilities.layout.executable()))
            .arg("shell")
            .arg("-c")
            .arg(&self.config_file)
            .args(["-d", db, self.capabilities.layout.no_http_flag()])
            .current_dir(&self.platform_dir)
            .envs(vars.iter().copied())
            .stdin(Stdio::piped());

        let mut child = cmd
            .spawn()
            .map_err(|e| anyhow!("failed to start platform shell: {e}"))?;
        {
            let stdin = child
                .stdin
                .as_mut()
                .ok_or_else(|| anyhow!("failed to open stdin for platform shell"))?;
            stdin.write_all(code.as_bytes())?;
        }

        let status = child.wait()?;
        if !status.success() {
            bail!("platform shell failed: {status}");
        }
        Ok(())
    }

    fn update_args(&self, modules: String) -> Vec<String> {
        vec![
            "-u".to_string(),
            modules,
            "--stop-after-init".to_string(),
            "--i18n-overwrite".to_string(),
        ]
    }
}

fn initialize_args(options: &InstallOptions) -> Vec<String> {
    let mut args = vec![
        "-i".to_string(),
        "base".to_string(),
        "--stop-after-init".to_string(),
    ];
    if options.without_demo {
        args.push("--without-demo=all".to_string());
    }
    args
}

fn join(modules: &BTreeSet<String>) -> String {
    modules.iter().cloned().collect::<Vec<_>>().join(",")
}

impl Runtime for ProcessRuntime {
    fn is_initialized(&self, db: &str) -> Result<bool> {
        if !self.psql.database_exists(db)? {
            return Ok(false);
        }
        let rows = self.psql.query(
            db,
            "SELECT to_regclass('public.ir_module_module') IS NOT NULL",
        )?;
        Ok(rows.first().and_then(|row| row.first()).is_some_and(|v| v == "t"))
    }

    fn initialize(&self, db: &str, options: &InstallOptions) -> Result<()> {
        self.run_checked(db, &initialize_args(options))
            .context("Failed to initialize the database")
    }

    fn install(
        &self,
        db: &str,
        modules: &BTreeSet<String>,
        options: &InstallOptions,
    ) -> Result<()> {
        let mut args = vec![
            "-i".to_string(),
            join(modules),
            "--stop-after-init".to_string(),
            "--i18n-overwrite".to_string(),
        ];
        if options.without_demo {
            args.push("--without-demo=all".to_string());
        }
        if !options.languages.is_empty() {
            args.push(format!("--load-language={}", options.languages.join(",")));
        }
        self.run_checked(db, &args)
            .context("Failed to install modules")
    }

    fn update(&self, db: &str, selection: &UpdateSelection) -> Result<()> {
        let modules = match selection {
            UpdateSelection::All => "all".to_string(),
            UpdateSelection::Modules(modules) => join(modules),
        };
        self.run_checked(db, &self.update_args(modules))
            .context("Failed to update modules")
    }

    fn update_changed(&self, db: &str) -> Result<bool> {
        if !self.query_installed(db)?.contains(AUTO_UPDATE_MODULE) {
            return Ok(false);
        }
        self.shell(db, CHANGED_SNIPPET, &[])
            .context("Failed to update changed modules")?;
        Ok(true)
    }

    fn query_installed(&self, db: &str) -> Result<BTreeSet<String>> {
        let rows = self.psql.query(
            db,
            "SELECT name FROM ir_module_module WHERE state = 'installed'",
        )?;
        Ok(rows.into_iter().filter_map(|row| row.into_iter().next()).collect())
    }

    fn query_module_metadata(&self, db: &str) -> Result<BTreeMap<String, ModuleInfo>> {
        let rows = self.psql.query(
            db,
            "SELECT m.name, m.state, COALESCE(m.auto_install, false), \
             COALESCE(string_agg(d.name, ','), '') \
             FROM ir_module_module m \
             LEFT JOIN ir_module_module_dependency d ON d.module_id = m.id \
             GROUP BY m.id, m.name, m.state, m.auto_install",
        )?;

        let mut modules = BTreeMap::new();
        for row in rows {
            let [name, state, auto_install, deps] = row.as_slice() else {
                continue;
            };
            let mut info = ModuleInfo::new(name.clone(), ModuleState::parse(state));
            info.auto_install = auto_install == "t";
            info.dependencies = deps
                .split(',')
                .filter(|d| !d.is_empty())
                .map(String::from)
                .collect();
            modules.insert(name.clone(), info);
        }

        if self.capabilities.country_constraints {
            let rows = self.psql.query(
                db,
                "SELECT m.name, upper(c.code) FROM ir_module_module m \
                 JOIN module_country rel ON rel.module_id = m.id \
                 JOIN res_country c ON c.id = rel.country_id",
            )?;
            for row in rows {
                if let [name, code] = row.as_slice() {
                    if let Some(info) = modules.get_mut(name) {
                        info.countries.insert(code.clone());
                    }
                }
            }
        }

        Ok(modules)
    }

    fn query_company_countries(&self, db: &str) -> Result<BTreeSet<String>> {
        let rows = self.psql.query(
            db,
            "SELECT DISTINCT upper(c.code) FROM res_company co \
             JOIN res_partner p ON p.id = co.partner_id \
             JOIN res_country c ON c.id = p.country_id",
        )?;
        Ok(rows.into_iter().filter_map(|row| row.into_iter().next()).collect())
    }

    fn get_config_param(&self, db: &str, key: &str) -> Result<Option<String>> {
        let rows = self.psql.query(
            db,
            &format!(
                "SELECT value FROM ir_config_parameter WHERE key = {}",
                quote_literal(key)
            ),
        )?;
        Ok(rows.into_iter().next().and_then(|row| row.into_iter().next()))
    }

    fn set_config_param(&self, db: &str, key: &str, value: &str) -> Result<()> {
        self.psql.execute(
            db,
            &format!(
                "INSERT INTO ir_config_parameter (key, value, create_date, write_date) \
                 VALUES ({key}, {value}, now() at time zone 'UTC', now() at time zone 'UTC') \
                 ON CONFLICT (key) DO UPDATE SET value = EXCLUDED.value, write_date = EXCLUDED.write_date",
                key = quote_literal(key),
                value = quote_literal(value),
            ),
        )
    }

    fn set_password(&self, db: &str, login: &str, password: &str) -> Result<()> {
        self.shell(
            db,
            PASSWORD_SNIPPET,
            &[("DOB_LOGIN", login), ("DOB_PASSWORD", password)],
        )
        .with_context(|| format!("Failed to set the password of {login}"))
    }

    fn run_hook(&self, db: &str, script: &Path, db_version: &Version) -> Result<()> {
        let script_path = script.to_string_lossy();
        let version = db_version.to_string();
        self.shell(
            db,
            HOOK_SNIPPET,
            &[("DOB_SCRIPT", script_path.as_ref()), ("DOB_DB_VERSION", version.as_str())],
        )
        .with_context(|| format!("Script {} failed", script.display()))
    }

    fn execute_sql(&self, db: &str, script: &Path) -> Result<()> {
        self.psql.execute_file(db, script)
    }

    fn upgrade_all(&self, db: &str, load: &[&str]) -> Result<i32> {
        let args = vec![
            "--update".to_string(),
            "all".to_string(),
            "--stop-after-init".to_string(),
            format!("--load={}", load.join(",")),
        ];
        self.run_server(db, &args)
    }
}
