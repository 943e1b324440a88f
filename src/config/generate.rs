//! Runtime configuration file generation.
//!
//! Renders `odoo:options` into the INI file the platform reads. Options are
//! written in key order; a dotted key (`queue_job.channels`) goes into the
//! section named by its prefix, everything else into `[options]`.

use super::types::Config;
use super::value::{ConfigValue, Mapping};
use anyhow::{Context, Result};
use std::path::PathBuf;
use tracing::info;

/// Options consumed by the tool itself and kept out of the runtime file.
const SKIPPED_OPTIONS: &[&str] = &["load_language"];

/// Render the option mapping as INI text.
pub fn render_runtime_config(options: &Mapping) -> String {
    let mut sections: Vec<(String, Vec<(String, String)>)> = Vec::new();

    for (key, value) in options {
        if SKIPPED_OPTIONS.contains(&key.as_str()) {
            continue;
        }

        let (section, key) = key.split_once('.').unwrap_or(("options", key.as_str()));
        let value = match value {
            ConfigValue::Sequence(_) | ConfigValue::Set(_) => value.to_string_list().join(","),
            other => other.render(),
        };

        match sections.iter_mut().find(|(name, _)| name == section) {
            Some((_, entries)) => entries.push((key.to_string(), value)),
            None => sections.push((section.to_string(), vec![(key.to_string(), value)])),
        }
    }

    let mut out = String::new();
    for (section, entries) in sections {
        out.push_str(&format!("[{section}]\n"));
        for (key, value) in entries {
            out.push_str(&format!("{key} = {value}\n"));
        }
        out.push('\n');
    }
    out
}

/// Write the runtime configuration file for `config` and return its path.
pub fn generate_runtime_config(config: &Config) -> Result<PathBuf> {
    info!("Generating configuration file");

    let empty = Mapping::new();
    let options = config
        .get(&["odoo", "options"])
        .and_then(ConfigValue::as_mapping)
        .unwrap_or(&empty);

    let path = config.paths().runtime_config();
    if let Some(dir) = path.parent() {
        std::fs::create_dir_all(dir)
            .with_context(|| format!("Failed to create directory {}", dir.display()))?;
    }
    std::fs::write(&path, render_runtime_config(options))
        .with_context(|| format!("Failed to write {}", path.display()))?;
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ProjectPaths;
    use tempfile::TempDir;

    fn options(src: &str) -> Mapping {
        let value: ConfigValue = serde_yaml::from_str::<serde_yaml::Value>(src).unwrap().into();
        value.as_mapping().cloned().unwrap()
    }

    #[test]
    fn test_render_sorted_with_sections() {
        let text = render_runtime_config(&options(
            "{workers: 2, db_name: prod, queue_job.channels: 'root:2', load_language: de_DE, list_db: null}",
        ));
        assert_eq!(
            text,
            "[options]\ndb_name = prod\nlist_db = \nworkers = 2\n\n[queue_job]\nchannels = root:2\n\n"
        );
    }

    #[test]
    fn test_render_collections_comma_joined() {
        let mut opts = options("{server_wide_modules: [base, web]}");
        opts.insert(
            "addons_path".to_string(),
            ConfigValue::Set(["/b".to_string(), "/a".to_string()].into()),
        );
        let text = render_runtime_config(&opts);
        assert!(text.contains("addons_path = /a,/b\n"));
        assert!(text.contains("server_wide_modules = base,web\n"));
    }

    #[test]
    fn test_generate_writes_file() {
        let temp = TempDir::new().unwrap();
        let tree: ConfigValue =
            serde_yaml::from_str::<serde_yaml::Value>("odoo: {options: {db_name: x}}")
                .unwrap()
                .into();
        let config = Config::new(tree, ProjectPaths::new(temp.path()), "odoo.yaml".into());

        let path = generate_runtime_config(&config).unwrap();
        assert!(path.ends_with("etc/odoo.cfg"));
        assert_eq!(
            std::fs::read_to_string(path).unwrap(),
            "[options]\ndb_name = x\n\n"
        );
    }
}
