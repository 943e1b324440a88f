//! Repository aggregation.
//!
//! Each entry under `repos` describes a checkout built from one or more
//! remote references merged on top of each other. Repositories are processed
//! on a bounded worker pool; once any repository fails no further
//! repositories are started, and every failure is reported at the end.

mod git;

pub use git::GitAggregator;

use crate::config::{Config, ConfigValue};
use anyhow::{Context, Result, anyhow, bail};
use rayon::prelude::*;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::{error, info};

/// Local branch used when a repository has no `target`.
pub const DEFAULT_BRANCH: &str = "_git_aggregated";

/// One reference to merge: `<remote> <ref>`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MergeRef {
    pub remote: String,
    pub reference: String,
    pub depth: Option<u64>,
}

impl MergeRef {
    fn parse(value: &ConfigValue, default_depth: Option<u64>) -> Result<Self> {
        match value {
            ConfigValue::String(s) => {
                let mut parts = s.split_whitespace();
                match (parts.next(), parts.next(), parts.next()) {
                    (Some(remote), Some(reference), None) => Ok(Self {
                        remote: remote.to_string(),
                        reference: reference.to_string(),
                        depth: default_depth,
                    }),
                    _ => bail!("Invalid merge '{s}', expected '<remote> <ref>'"),
                }
            }
            ConfigValue::Mapping(_) => {
                let field = |key: &str| {
                    value
                        .get(&[key])
                        .map(ConfigValue::render)
                        .ok_or_else(|| anyhow!("Merge is missing '{key}'"))
                };
                Ok(Self {
                    remote: field("remote")?,
                    reference: field("ref")?,
                    depth: value
                        .get(&["depth"])
                        .and_then(ConfigValue::as_i64)
                        .and_then(|d| u64::try_from(d).ok())
                        .or(default_depth),
                })
            }
            _ => bail!("Invalid merge entry"),
        }
    }
}

/// A repository to aggregate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepoSpec {
    pub name: String,
    pub path: PathBuf,
    pub remotes: BTreeMap<String, String>,
    pub merges: Vec<MergeRef>,
    /// Local branch the merges are assembled on.
    pub branch: String,
    pub shell_command_after: Vec<String>,
}

impl RepoSpec {
    pub fn parse(name: &str, path: PathBuf, value: &ConfigValue) -> Result<Self> {
        let default_depth = value
            .get(&["defaults", "depth"])
            .and_then(ConfigValue::as_i64)
            .and_then(|d| u64::try_from(d).ok());

        let remotes: BTreeMap<String, String> = value
            .get(&["remotes"])
            .and_then(ConfigValue::as_mapping)
            .map(|remotes| {
                remotes
                    .iter()
                    .map(|(k, v)| (k.clone(), v.render()))
                    .collect()
            })
            .unwrap_or_default();

        let merges = value
            .get(&["merges"])
            .and_then(ConfigValue::as_sequence)
            .unwrap_or_default()
            .iter()
            .map(|merge| MergeRef::parse(merge, default_depth))
            .collect::<Result<Vec<_>>>()?;

        for merge in &merges {
            if !remotes.contains_key(&merge.remote) {
                bail!("Remote '{}' is not defined", merge.remote);
            }
        }

        let branch = match value.get(&["target"]).map(ConfigValue::render) {
            Some(target) => target
                .split_whitespace()
                .last()
                .unwrap_or(DEFAULT_BRANCH)
                .to_string(),
            None => DEFAULT_BRANCH.to_string(),
        };

        Ok(Self {
            name: name.to_string(),
            path,
            remotes,
            merges,
            branch,
            shell_command_after: value
                .get(&["shell_command_after"])
                .map(ConfigValue::to_string_list)
                .unwrap_or_default(),
        })
    }
}

/// Repositories under `repos` that have something to merge.
pub fn repos_from_config(config: &Config) -> Result<Vec<RepoSpec>> {
    let Some(repos) = config.get(&["repos"]).and_then(ConfigValue::as_mapping) else {
        return Ok(Vec::new());
    };

    let mut specs = Vec::new();
    for (name, value) in repos {
        let spec = RepoSpec::parse(name, config.paths().resolve(name), value)
            .with_context(|| format!("Invalid repository '{name}'"))?;
        if !spec.merges.is_empty() {
            specs.push(spec);
        }
    }
    Ok(specs)
}

/// Brings one repository to its configured state.
pub trait Aggregator: Sync {
    fn aggregate_repo(&self, repo: &RepoSpec, force: bool) -> Result<()>;
}

#[derive(Debug, Clone, Default)]
pub struct AggregateOptions {
    pub jobs: usize,
    pub force: bool,
    /// Only repositories whose directory matches this pattern.
    pub dirmatch: Option<String>,
}

#[derive(Debug, Default)]
pub struct AggregateReport {
    pub processed: Vec<String>,
    pub errors: Vec<(String, anyhow::Error)>,
}

impl AggregateReport {
    pub fn exit_code(&self) -> i32 {
        if self.errors.is_empty() { 0 } else { 1 }
    }
}

/// Aggregate `repos` with up to `options.jobs` workers.
pub fn aggregate(
    aggregator: &dyn Aggregator,
    repos: &[RepoSpec],
    root: &Path,
    options: &AggregateOptions,
) -> Result<AggregateReport> {
    info!("Bootstrapping repositories");

    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(options.jobs.max(1))
        .thread_name(|i| format!("aggregate-{i}"))
        .build()
        .context("Failed to build the worker pool")?;

    let failed = AtomicBool::new(false);
    let processed = Mutex::new(Vec::new());
    let errors = Mutex::new(Vec::new());

    pool.install(|| {
        repos.par_iter().for_each(|repo| {
            if failed.load(Ordering::SeqCst) {
                return;
            }
            if let Some(pattern) = &options.dirmatch {
                if !match_dir(&repo.path, root, pattern) {
                    return;
                }
            }

            match aggregator.aggregate_repo(repo, options.force) {
                Ok(()) => {
                    if let Ok(mut processed) = processed.lock() {
                        processed.push(repo.name.clone());
                    }
                }
                Err(err) => {
                    failed.store(true, Ordering::SeqCst);
                    if let Ok(mut errors) = errors.lock() {
                        errors.push((repo.name.clone(), err));
                    }
                }
            }
        });
    });

    let report = AggregateReport {
        processed: processed.into_inner().unwrap_or_default(),
        errors: errors.into_inner().unwrap_or_default(),
    };
    for (name, err) in &report.errors {
        error!("Repository {name}: {err:#}");
    }
    Ok(report)
}

/// Whether the repository directory matches `pattern`, either as an
/// absolute path or relative to `root`.
pub fn match_dir(dir: &Path, root: &Path, pattern: &str) -> bool {
    let absolute = dir.to_string_lossy();
    let relative = dir
        .strip_prefix(root)
        .map(|p| p.to_string_lossy().into_owned())
        .unwrap_or_else(|_| absolute.to_string());
    let pattern = pattern.trim_end_matches('/');
    let pattern = pattern.strip_prefix("./").unwrap_or(pattern);

    wildcard_match(pattern, &absolute) || wildcard_match(pattern, &relative)
}

/// Shell-style matching of `*` and `?`.
pub fn wildcard_match(pattern: &str, text: &str) -> bool {
    let pattern: Vec<char> = pattern.chars().collect();
    let text: Vec<char> = text.chars().collect();
    let (mut p, mut t) = (0, 0);
    let mut star: Option<(usize, usize)> = None;

    while t < text.len() {
        match pattern.get(p) {
            Some('*') => {
                star = Some((p, t));
                p += 1;
            }
            Some(&c) if c == '?' || c == text[t] => {
                p += 1;
                t += 1;
            }
            _ => match star {
                Some((sp, st)) => {
                    p = sp + 1;
                    t = st + 1;
                    star = Some((sp, st + 1));
                }
                None => return false,
            },
        }
    }
    pattern[p..].iter().all(|&c| c == '*')
}

#[cfg(test)]
mod tests {
    use super::*;

    fn yaml(src: &str) -> ConfigValue {
        serde_yaml::from_str::<serde_yaml::Value>(src).unwrap().into()
    }

    #[test]
    fn test_wildcard_match() {
        assert!(wildcard_match("odoo", "odoo"));
        assert!(wildcard_match("add*", "addons"));
        assert!(wildcard_match("*ons", "addons"));
        assert!(wildcard_match("a?d*s", "addons"));
        assert!(!wildcard_match("odoo", "addons"));
        assert!(!wildcard_match("a*x", "addons"));
    }

    #[test]
    fn test_match_dir() {
        let root = Path::new("/srv/project");
        let dir = Path::new("/srv/project/addons/oca");
        assert!(match_dir(dir, root, "addons/*"));
        assert!(match_dir(dir, root, "./addons/oca/"));
        assert!(match_dir(dir, root, "/srv/*/oca"));
        assert!(!match_dir(dir, root, "odoo"));
    }

    #[test]
    fn test_parse_repo() {
        let value = yaml(
            "defaults: {depth: 1}\n\
             remotes: {origin: 'https://example.com/odoo.git'}\n\
             merges: ['origin 16.0', {remote: origin, ref: 'refs/pull/1/head', depth: 50}]\n\
             target: origin 16.0-build\n",
        );
        let spec = RepoSpec::parse("odoo", PathBuf::from("/p/odoo"), &value).unwrap();
        assert_eq!(spec.branch, "16.0-build");
        assert_eq!(spec.merges.len(), 2);
        assert_eq!(spec.merges[0].depth, Some(1));
        assert_eq!(spec.merges[1].reference, "refs/pull/1/head");
        assert_eq!(spec.merges[1].depth, Some(50));
    }

    #[test]
    fn test_parse_repo_errors() {
        let undefined = yaml("remotes: {}\nmerges: ['origin 16.0']\n");
        assert!(RepoSpec::parse("x", PathBuf::from("x"), &undefined).is_err());

        let malformed = yaml("remotes: {origin: url}\nmerges: ['origin']\n");
        assert!(RepoSpec::parse("x", PathBuf::from("x"), &malformed).is_err());
    }
}
