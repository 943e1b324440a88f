//! Aggregation through the `git` command line.

use super::{Aggregator, RepoSpec};
use anyhow::{Context, Result, anyhow, bail};
use std::path::Path;
use std::process::Command;
use tracing::{debug, info};

#[derive(Debug, Clone)]
pub struct GitAggregator {
    program: String,
}

impl Default for GitAggregator {
    fn default() -> Self {
        Self {
            program: "git".to_string(),
        }
    }
}

impl GitAggregator {
    pub fn new() -> Self {
        Self::default()
    }

    fn git(&self, cwd: &Path, args: &[&str]) -> Result<String> {
        debug!(cwd = %cwd.display(), ?args, "git");
        let output = Command::new(&self.program)
            .args(args)
            .current_dir(cwd)
            .output()
            .map_err(|e| anyhow!("failed to start `{}`: {e}", self.program))?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            bail!("git {} failed: {}", args.join(" "), stderr.trim());
        }
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }

    fn prepare(&self, repo: &RepoSpec, force: bool) -> Result<()> {
        if !repo.path.join(".git").exists() {
            std::fs::create_dir_all(&repo.path)
                .with_context(|| format!("Failed to create {}", repo.path.display()))?;
            self.git(&repo.path, &["init", "--quiet"])?;
            return Ok(());
        }

        let dirty = !self.git(&repo.path, &["status", "--porcelain"])?.trim().is_empty();
        if dirty {
            if !force {
                bail!(
                    "{} has local changes, use --force to stash them",
                    repo.path.display()
                );
            }
            self.git(&repo.path, &["stash", "--include-untracked"])?;
        }
        Ok(())
    }

    fn set_remotes(&self, repo: &RepoSpec) -> Result<()> {
        let existing = self.git(&repo.path, &["remote"])?;
        for (name, url) in &repo.remotes {
            if existing.lines().any(|line| line.trim() == name) {
                self.git(&repo.path, &["remote", "set-url", name, url])?;
            } else {
                self.git(&repo.path, &["remote", "add", name, url])?;
            }
        }
        Ok(())
    }
}

impl Aggregator for GitAggregator {
    fn aggregate_repo(&self, repo: &RepoSpec, force: bool) -> Result<()> {
        info!("Aggregating {}", repo.name);
        self.prepare(repo, force)?;
        self.set_remotes(repo)?;

        for (i, merge) in repo.merges.iter().enumerate() {
            let depth = merge.depth.map(|d| format!("--depth={d}"));
            let mut fetch = vec!["fetch", "--quiet"];
            if let Some(depth) = &depth {
                fetch.push(depth);
            }
            fetch.extend([merge.remote.as_str(), merge.reference.as_str()]);
            self.git(&repo.path, &fetch)?;

            if i == 0 {
                self.git(&repo.path, &["checkout", "--quiet", "-B", &repo.branch, "FETCH_HEAD"])?;
            } else {
                self.git(&repo.path, &["merge", "--no-edit", "--quiet", "FETCH_HEAD"])?;
            }
        }

        for command in &repo.shell_command_after {
            let status = Command::new("sh")
                .args(["-c", command])
                .current_dir(&repo.path)
                .status()
                .with_context(|| format!("Failed to run `{command}`"))?;
            if !status.success() {
                bail!("`{command}` failed: {status}");
            }
        }
        Ok(())
    }
}
