//! Major version migration.
//!
//! After the repositories are fetched at the target version, a migration
//! runs these phases against an initialized database:
//! 1. **Pre-migrate** - `pre_migrate_<major>.sql`, then the `pre_migrate_<major>` hook
//! 2. **Core migrate** - the platform updates all modules with a restricted load list
//! 3. **Post-migrate** - `post_migrate_<major>.sql`, then the `post_migrate_<major>` hook
//!
//! Each phase can be skipped to resume a partial run.

use crate::aggregate::{AggregateOptions, Aggregator, RepoSpec, aggregate};
use crate::error::PreconditionError;
use crate::runtime::Runtime;
use crate::scripts::ScriptRegistry;
use crate::version::Version;
use anyhow::Result;
use std::path::Path;
use tracing::{error, info};

/// Module load list used by the core migration pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MigrationStrategy {
    /// 13.0 and earlier
    Legacy,
    /// Later versions ship the upgrade framework as a server-wide module
    Framework,
}

impl MigrationStrategy {
    pub fn for_target(version: &Version) -> Self {
        match version.major() {
            Some(major) if major <= 13 => Self::Legacy,
            _ => Self::Framework,
        }
    }

    pub fn load(&self) -> &'static [&'static str] {
        match self {
            Self::Legacy => &["base", "web"],
            Self::Framework => &["base", "web", "openupgrade_framework"],
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MigrateRequest {
    pub version: Version,
    pub skip_premigrate: bool,
    pub skip_migrate: bool,
    pub skip_postmigrate: bool,
}

/// Fetch the repositories at their target revisions.
///
/// Returns a non-zero exit code if any repository failed.
pub fn fetch(
    aggregator: &dyn Aggregator,
    repos: &[RepoSpec],
    root: &Path,
    options: &AggregateOptions,
) -> Result<i32> {
    let report = aggregate(aggregator, repos, root, options)?;
    Ok(report.exit_code())
}

/// Migrates one database to the requested version.
pub struct Migration<'a, R: Runtime + ?Sized> {
    runtime: &'a R,
    scripts: &'a ScriptRegistry,
    request: &'a MigrateRequest,
    db: &'a str,
    strategy: MigrationStrategy,
}

impl<'a, R: Runtime + ?Sized> Migration<'a, R> {
    pub fn new(
        runtime: &'a R,
        scripts: &'a ScriptRegistry,
        request: &'a MigrateRequest,
        db: &'a str,
    ) -> Self {
        Self {
            runtime,
            scripts,
            request,
            db,
            strategy: MigrationStrategy::for_target(&request.version),
        }
    }

    pub fn strategy(&self) -> MigrationStrategy {
        self.strategy
    }

    /// Run the phases and return the exit code.
    pub fn run(&self) -> Result<i32> {
        if !self.runtime.is_initialized(self.db)? {
            let err = PreconditionError::DatabaseNotInitialized(self.db.to_string());
            error!("{err}");
            return Ok(1);
        }

        let major = self.request.version.major().unwrap_or_default();

        if self.request.skip_premigrate {
            info!("Skipping pre-migration");
        } else {
            info!("Run pre-migration script");
            self.scripts_for(&format!("pre_migrate_{major}"))?;
        }

        if self.request.skip_migrate {
            info!("Skipping migration");
        } else {
            info!(
                "Running OpenUpgrade migration to Odoo {}",
                self.request.version
            );
            let code = self.runtime.upgrade_all(self.db, self.strategy.load())?;
            if code != 0 {
                error!("Migration failed with exit code {code}");
                return Ok(code);
            }
        }

        if self.request.skip_postmigrate {
            info!("Skipping post-migration");
        } else {
            info!("Run post-migration script");
            self.scripts_for(&format!("post_migrate_{major}"))?;
        }

        Ok(0)
    }

    /// SQL script first, then the hook.
    fn scripts_for(&self, name: &str) -> Result<()> {
        if let Some(script) = self.scripts.sql(name) {
            script.run(self.runtime, self.db)?;
        }
        if let Some(script) = self.scripts.hook(name) {
            script.run(self.runtime, self.db)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strategy_by_target() {
        assert_eq!(
            MigrationStrategy::for_target(&Version::parse("13.0")).load(),
            &["base", "web"]
        );
        assert_eq!(
            MigrationStrategy::for_target(&Version::parse("12.0")),
            MigrationStrategy::Legacy
        );
        assert_eq!(
            MigrationStrategy::for_target(&Version::parse("14.0")).load(),
            &["base", "web", "openupgrade_framework"]
        );
    }
}
