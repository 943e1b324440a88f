//! `${a:b:c}` variable substitution.
//!
//! Tokens are resolved against the tree as it was before substitution; a
//! resolved value is never scanned again, so one pass is all there is.
//!
//! - A string that is exactly one token is replaced by the referenced value
//!   itself, keeping its type (`"${odoo:workers}"` can become the integer `4`).
//! - Tokens embedded in other text are replaced by the rendered value.
//! - A path that does not exist resolves to null, which renders as an empty
//!   string inside text. Lookups never fail.

use super::value::ConfigValue;
use crate::error::{ConfigError, ConfigResult};
use regex_lite::Regex;
use std::sync::LazyLock;

static TOKEN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\$\{(?P<var>[A-Za-z0-9_:]+)\}").expect("token pattern is valid")
});

/// Substitute every token in `tree`, looking values up in `tree` itself.
pub fn substitute(tree: &ConfigValue) -> ConfigResult<ConfigValue> {
    substitute_value(tree, tree)
}

/// Substitute the tokens of a single value against `root`.
pub fn substitute_value(root: &ConfigValue, value: &ConfigValue) -> ConfigResult<ConfigValue> {
    match value {
        ConfigValue::String(s) => substitute_str(root, s),
        ConfigValue::Sequence(items) => items
            .iter()
            .map(|item| substitute_value(root, item))
            .collect::<ConfigResult<Vec<_>>>()
            .map(ConfigValue::Sequence),
        ConfigValue::Mapping(map) => {
            let mut out = map.clone();
            for (key, item) in map {
                out.insert(key.clone(), substitute_value(root, item)?);
            }
            Ok(ConfigValue::Mapping(out))
        }
        other => Ok(other.clone()),
    }
}

/// Substitute the tokens of one string against `root`.
pub fn substitute_str(root: &ConfigValue, line: &str) -> ConfigResult<ConfigValue> {
    // Whole-value token keeps the native type
    if let Some(caps) = TOKEN.captures(line) {
        let whole = caps.get(0).map(|m| m.start() == 0 && m.end() == line.len());
        if whole == Some(true) {
            return resolve(root, &caps["var"]);
        }
    }

    let mut out = String::with_capacity(line.len());
    let mut last = 0;
    for caps in TOKEN.captures_iter(line) {
        let Some(m) = caps.get(0) else { continue };
        out.push_str(&line[last..m.start()]);
        out.push_str(&resolve(root, &caps["var"])?.render());
        last = m.end();
    }

    if last == 0 {
        return Ok(ConfigValue::String(line.to_string()));
    }
    out.push_str(&line[last..]);
    Ok(ConfigValue::String(out))
}

fn resolve(root: &ConfigValue, var: &str) -> ConfigResult<ConfigValue> {
    let path: Vec<&str> = var.split(':').collect();
    if path.iter().any(|segment| segment.is_empty()) {
        return Err(ConfigError::Substitution {
            token: format!("${{{}}}", var),
        });
    }
    Ok(root.get(&path).cloned().unwrap_or(ConfigValue::Null))
}
