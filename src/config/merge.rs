//! Deep merge for configuration trees.
//!
//! Implements the merge used by `extend` chains, the version-pin overlay and
//! the repository defaults, where the override side (`b`) takes precedence:
//! - Mappings are merged key by key, recursing into shared keys
//! - Sequences are concatenated, sets are unioned
//! - Keys listed in `replace` take the override value verbatim
//! - Anything else (scalars, type mismatches) is replaced by the override

use super::value::{ConfigValue, Mapping};

/// Deep merge two trees, with `b` taking precedence over `a`.
///
/// The `replace` list applies at every mapping level.
///
/// # Example
/// ```
/// use dob::config::{ConfigValue, merge};
///
/// let a: ConfigValue = serde_yaml::from_str::<serde_yaml::Value>(
///     "repo: {merges: [origin 14.0], depth: 1}",
/// ).unwrap().into();
/// let b: ConfigValue = serde_yaml::from_str::<serde_yaml::Value>(
///     "repo: {merges: [origin 15.0]}",
/// ).unwrap().into();
/// let result = merge(&a, &b, &["merges"]);
/// // Result: { repo: { merges: [origin 15.0], depth: 1 } }
/// ```
pub fn merge(a: &ConfigValue, b: &ConfigValue, replace: &[&str]) -> ConfigValue {
    match (a, b) {
        // Both are mappings: merge recursively
        (ConfigValue::Mapping(a_map), ConfigValue::Mapping(b_map)) => {
            let mut result = Mapping::new();
            for (key, a_value) in a_map {
                let merged = match b_map.get(key) {
                    None => a_value.clone(),
                    Some(b_value) if replace.contains(&key.as_str()) => b_value.clone(),
                    Some(b_value) => merge(a_value, b_value, replace),
                };
                result.insert(key.clone(), merged);
            }
            for (key, b_value) in b_map {
                if !a_map.contains_key(key) {
                    result.insert(key.clone(), b_value.clone());
                }
            }
            ConfigValue::Mapping(result)
        }
        (ConfigValue::Sequence(a_items), ConfigValue::Sequence(b_items)) => {
            ConfigValue::Sequence(a_items.iter().chain(b_items).cloned().collect())
        }
        (ConfigValue::Set(a_items), ConfigValue::Set(b_items)) => {
            ConfigValue::Set(a_items.union(b_items).cloned().collect())
        }
        // Any other case: override replaces base entirely
        (_, b) => b.clone(),
    }
}

/// Merge multiple trees in order, with later trees taking precedence.
///
/// Equivalent to folding [`merge`] over the list, starting from an empty mapping.
pub fn merge_all<'a>(
    values: impl IntoIterator<Item = &'a ConfigValue>,
    replace: &[&str],
) -> ConfigValue {
    values
        .into_iter()
        .fold(ConfigValue::mapping(), |acc, v| merge(&acc, v, replace))
}
