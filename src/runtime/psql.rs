//! Database access through the `psql` client.

use crate::config::{Config, ConfigValue};
use anyhow::{Context, Result, anyhow};
use std::path::Path;
use std::process::{Command, Stdio};
use tracing::debug;

const FIELD_SEPARATOR: char = '\u{1f}';

/// Connection settings taken from the `db_*` runtime options.
#[derive(Debug, Clone, Default)]
pub struct Psql {
    pub program: String,
    pub host: Option<String>,
    pub port: Option<String>,
    pub user: Option<String>,
    pub password: Option<String>,
}

fn option(config: &Config, key: &str) -> Option<String> {
    config
        .opt(key)
        .map(ConfigValue::render)
        .filter(|value| !value.is_empty() && value != "False" && value != "false")
}

impl Psql {
    pub fn from_config(config: &Config) -> Self {
        Self {
            program: "psql".to_string(),
            host: option(config, "db_host"),
            port: option(config, "db_port"),
            user: option(config, "db_user"),
            password: option(config, "db_password"),
        }
    }

    fn command(&self, db: &str) -> Command {
        let mut cmd = Command::new(&self.program);
        cmd.args(["-X", "-q", "-v", "ON_ERROR_STOP=1", "-d", db]);
        if let Some(host) = &self.host {
            cmd.args(["-h", host]);
        }
        if let Some(port) = &self.port {
            cmd.args(["-p", port]);
        }
        if let Some(user) = &self.user {
            cmd.args(["-U", user]);
        }
        if let Some(password) = &self.password {
            cmd.env("PGPASSWORD", password);
        }
        cmd.stdin(Stdio::null());
        cmd
    }

    fn output(&self, mut cmd: Command) -> Result<String> {
        let output = cmd
            .output()
            .map_err(|e| anyhow!("failed to start `{}`: {e}", self.program))?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(anyhow!(
                "`{}` failed: {}\n{}",
                self.program,
                output.status,
                stderr.trim()
            ));
        }
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }

    /// Run a query and return its rows as text fields.
    pub fn query(&self, db: &str, sql: &str) -> Result<Vec<Vec<String>>> {
        debug!(db, sql, "psql query");
        let mut cmd = self.command(db);
        cmd.args(["-A", "-t", "-F"])
            .arg(FIELD_SEPARATOR.to_string())
            .args(["-c", sql]);

        let stdout = self.output(cmd)?;
        Ok(stdout
            .lines()
            .filter(|line| !line.is_empty())
            .map(|line| line.split(FIELD_SEPARATOR).map(String::from).collect())
            .collect())
    }

    /// Run a statement, discarding its output.
    pub fn execute(&self, db: &str, sql: &str) -> Result<()> {
        debug!(db, sql, "psql execute");
        let mut cmd = self.command(db);
        cmd.args(["-c", sql]);
        self.output(cmd).map(|_| ())
    }

    /// Run a script file in a single transaction.
    pub fn execute_file(&self, db: &str, script: &Path) -> Result<()> {
        debug!(db, script = %script.display(), "psql script");
        let mut cmd = self.command(db);
        cmd.arg("-1").arg("-f").arg(script);
        self.output(cmd)
            .with_context(|| format!("Failed to execute {}", script.display()))
            .map(|_| ())
    }

    /// Whether a database named `db` exists on the server.
    pub fn database_exists(&self, db: &str) -> Result<bool> {
        let rows = self.query(
            "postgres",
            &format!(
                "SELECT 1 FROM pg_database WHERE datname = {}",
                quote_literal(db)
            ),
        )?;
        Ok(!rows.is_empty())
    }
}

/// Quote a string as an SQL literal.
pub fn quote_literal(value: &str) -> String {
    format!("'{}'", value.replace('\'', "''"))
}
