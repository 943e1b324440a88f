//! The configuration tree.
//!
//! YAML documents are converted into [`ConfigValue`] right after parsing so
//! the rest of the crate works on one closed set of node kinds. Sets never
//! come from YAML; they are only built programmatically (e.g. the addon path).

use serde::ser::{Serialize, SerializeMap, SerializeSeq, Serializer};
use std::collections::{BTreeMap, BTreeSet};

/// Mapping node. Ordered by key, which is also the order of every generated
/// output (YAML dump, runtime configuration file).
pub type Mapping = BTreeMap<String, ConfigValue>;

/// A node of the configuration tree.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum ConfigValue {
    #[default]
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    String(String),
    Sequence(Vec<ConfigValue>),
    Set(BTreeSet<String>),
    Mapping(Mapping),
}

impl ConfigValue {
    /// An empty mapping.
    pub fn mapping() -> Self {
        ConfigValue::Mapping(Mapping::new())
    }

    pub fn is_null(&self) -> bool {
        matches!(self, ConfigValue::Null)
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            ConfigValue::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            ConfigValue::Int(i) => Some(*i),
            _ => None,
        }
    }

    pub fn as_mapping(&self) -> Option<&Mapping> {
        match self {
            ConfigValue::Mapping(m) => Some(m),
            _ => None,
        }
    }

    pub fn as_mapping_mut(&mut self) -> Option<&mut Mapping> {
        match self {
            ConfigValue::Mapping(m) => Some(m),
            _ => None,
        }
    }

    pub fn as_sequence(&self) -> Option<&[ConfigValue]> {
        match self {
            ConfigValue::Sequence(s) => Some(s),
            _ => None,
        }
    }

    /// Lenient boolean coercion for option values that may arrive as
    /// strings from the environment.
    pub fn to_bool(&self) -> bool {
        match self {
            ConfigValue::Null => false,
            ConfigValue::Bool(b) => *b,
            ConfigValue::Int(i) => *i != 0,
            ConfigValue::Float(f) => *f != 0.0,
            ConfigValue::String(s) => !matches!(
                s.trim().to_ascii_lowercase().as_str(),
                "" | "0" | "false" | "f" | "no" | "n" | "off" | "none"
            ),
            ConfigValue::Sequence(s) => !s.is_empty(),
            ConfigValue::Set(s) => !s.is_empty(),
            ConfigValue::Mapping(m) => !m.is_empty(),
        }
    }

    /// Flatten a string, sequence or set into a list of strings.
    ///
    /// Strings are split on commas, which is how multi-valued options are
    /// written on the command line and in the environment.
    pub fn to_string_list(&self) -> Vec<String> {
        match self {
            ConfigValue::Null => Vec::new(),
            ConfigValue::String(s) => s
                .split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(String::from)
                .collect(),
            ConfigValue::Sequence(items) => items.iter().map(ConfigValue::render).collect(),
            ConfigValue::Set(items) => items.iter().cloned().collect(),
            other => vec![other.render()],
        }
    }

    /// Render the value as text, as used for inline substitution and the
    /// generated runtime configuration file.
    pub fn render(&self) -> String {
        match self {
            ConfigValue::Null => String::new(),
            ConfigValue::Bool(b) => b.to_string(),
            ConfigValue::Int(i) => i.to_string(),
            ConfigValue::Float(f) => format!("{f:?}"),
            ConfigValue::String(s) => s.clone(),
            ConfigValue::Sequence(_) | ConfigValue::Set(_) | ConfigValue::Mapping(_) => {
                serde_json::to_string(self).unwrap_or_default()
            }
        }
    }

    /// Walk a key path. Missing keys and non-mapping intermediates yield `None`.
    pub fn lookup<S: AsRef<str>>(&self, path: &[S]) -> Option<&ConfigValue> {
        let mut node = self;
        for key in path {
            node = node.as_mapping()?.get(key.as_ref())?;
        }
        Some(node)
    }

    /// Like [`lookup`](Self::lookup) but treats explicit nulls as missing.
    pub fn get<S: AsRef<str>>(&self, path: &[S]) -> Option<&ConfigValue> {
        self.lookup(path).filter(|v| !v.is_null())
    }

    /// Set the value at `path`, creating (or replacing non-mapping)
    /// intermediate nodes with mappings.
    pub fn set<S: AsRef<str>>(&mut self, path: &[S], value: ConfigValue) {
        let Some((last, parents)) = path.split_last() else {
            *self = value;
            return;
        };

        let mut node = self;
        for key in parents {
            if !matches!(node, ConfigValue::Mapping(_)) {
                *node = ConfigValue::mapping();
            }
            let ConfigValue::Mapping(map) = node else {
                unreachable!("node was just replaced by a mapping");
            };
            node = map
                .entry(key.as_ref().to_string())
                .or_insert_with(ConfigValue::mapping);
        }

        if !matches!(node, ConfigValue::Mapping(_)) {
            *node = ConfigValue::mapping();
        }
        if let ConfigValue::Mapping(map) = node {
            map.insert(last.as_ref().to_string(), value);
        }
    }
}

/// Split a colon separated path (`odoo:options:db_name`).
pub fn split_path(path: &str) -> Vec<&str> {
    path.split(':').collect()
}

impl From<serde_yaml::Value> for ConfigValue {
    fn from(value: serde_yaml::Value) -> Self {
        use serde_yaml::Value;

        match value {
            Value::Null => ConfigValue::Null,
            Value::Bool(b) => ConfigValue::Bool(b),
            Value::Number(n) => {
                if let Some(i) = n.as_i64() {
                    ConfigValue::Int(i)
                } else {
                    ConfigValue::Float(n.as_f64().unwrap_or_default())
                }
            }
            Value::String(s) => ConfigValue::String(s),
            Value::Sequence(items) => {
                ConfigValue::Sequence(items.into_iter().map(ConfigValue::from).collect())
            }
            Value::Mapping(map) => ConfigValue::Mapping(
                map.into_iter()
                    .map(|(k, v)| (yaml_key(k), ConfigValue::from(v)))
                    .collect(),
            ),
            Value::Tagged(tagged) => ConfigValue::from(tagged.value),
        }
    }
}

/// Mapping keys are strings in the tree; scalar keys keep their textual form.
fn yaml_key(key: serde_yaml::Value) -> String {
    match key {
        serde_yaml::Value::String(s) => s,
        serde_yaml::Value::Bool(b) => b.to_string(),
        serde_yaml::Value::Number(n) => n.to_string(),
        serde_yaml::Value::Null => "null".to_string(),
        other => serde_yaml::to_string(&other)
            .map(|s| s.trim().to_string())
            .unwrap_or_default(),
    }
}

impl From<&str> for ConfigValue {
    fn from(value: &str) -> Self {
        ConfigValue::String(value.to_string())
    }
}

impl From<String> for ConfigValue {
    fn from(value: String) -> Self {
        ConfigValue::String(value)
    }
}

impl From<bool> for ConfigValue {
    fn from(value: bool) -> Self {
        ConfigValue::Bool(value)
    }
}

impl From<i64> for ConfigValue {
    fn from(value: i64) -> Self {
        ConfigValue::Int(value)
    }
}

impl Serialize for ConfigValue {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            ConfigValue::Null => serializer.serialize_unit(),
            ConfigValue::Bool(b) => serializer.serialize_bool(*b),
            ConfigValue::Int(i) => serializer.serialize_i64(*i),
            ConfigValue::Float(f) => serializer.serialize_f64(*f),
            ConfigValue::String(s) => serializer.serialize_str(s),
            ConfigValue::Sequence(items) => {
                let mut seq = serializer.serialize_seq(Some(items.len()))?;
                for item in items {
                    seq.serialize_element(item)?;
                }
                seq.end()
            }
            ConfigValue::Set(items) => {
                let mut seq = serializer.serialize_seq(Some(items.len()))?;
                for item in items {
                    seq.serialize_element(item)?;
                }
                seq.end()
            }
            ConfigValue::Mapping(map) => {
                let mut out = serializer.serialize_map(Some(map.len()))?;
                for (k, v) in map {
                    out.serialize_entry(k, v)?;
                }
                out.end()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn yaml(src: &str) -> ConfigValue {
        serde_yaml::from_str::<serde_yaml::Value>(src).unwrap().into()
    }

    #[test]
    fn test_lookup_and_get() {
        let tree = yaml("a:\n  b: 5\n  c: null\n");
        assert_eq!(tree.lookup(&["a", "b"]), Some(&ConfigValue::Int(5)));
        assert_eq!(tree.lookup(&["a", "c"]), Some(&ConfigValue::Null));
        assert_eq!(tree.get(&["a", "c"]), None);
        assert_eq!(tree.get(&["a", "x"]), None);
        assert_eq!(tree.get(&["a", "b", "deeper"]), None);
    }

    #[test]
    fn test_set_creates_intermediate_mappings() {
        let mut tree = ConfigValue::mapping();
        tree.set(&["odoo", "options", "db_name"], "prod".into());
        assert_eq!(
            tree.get(&["odoo", "options", "db_name"]),
            Some(&ConfigValue::from("prod"))
        );

        // A scalar in the way is replaced
        tree.set(&["odoo", "options", "db_name", "x"], 1.into());
        assert_eq!(
            tree.get(&["odoo", "options", "db_name", "x"]),
            Some(&ConfigValue::Int(1))
        );
    }

    #[test]
    fn test_numeric_keys_become_strings() {
        let tree = yaml("3: three\n");
        assert_eq!(tree.get(&["3"]), Some(&ConfigValue::from("three")));
    }

    #[test]
    fn test_to_bool_is_lenient() {
        assert!(!ConfigValue::from("False").to_bool());
        assert!(!ConfigValue::from("0").to_bool());
        assert!(!ConfigValue::Null.to_bool());
        assert!(ConfigValue::from("True").to_bool());
        assert!(ConfigValue::Int(1).to_bool());
    }

    #[test]
    fn test_render_keeps_integral_float_decimals() {
        assert_eq!(ConfigValue::Float(1.0).render(), "1.0");
        assert_eq!(ConfigValue::Float(15.0).render(), "15.0");
        assert_eq!(ConfigValue::Float(0.25).render(), "0.25");
        assert_eq!(ConfigValue::Int(15).render(), "15");
    }

    #[test]
    fn test_to_string_list() {
        assert_eq!(
            ConfigValue::from("dev, staging").to_string_list(),
            vec!["dev", "staging"]
        );
        assert_eq!(yaml("[a, 1]").to_string_list(), vec!["a", "1"]);
        assert!(ConfigValue::Null.to_string_list().is_empty());
    }

    #[test]
    fn test_set_serializes_as_sorted_sequence() {
        let set = ConfigValue::Set(["b".to_string(), "a".to_string()].into());
        assert_eq!(serde_json::to_string(&set).unwrap(), r#"["a","b"]"#);
    }
}
