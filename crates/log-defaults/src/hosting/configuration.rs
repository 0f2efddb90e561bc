//! Read-only configuration lookup

use std::collections::BTreeMap;

use serde_json::Value;

/// Separator between section names in configuration keys
pub const KEY_DELIMITER: char = ':';

/// Section that holds named connection strings
pub const CONNECTION_STRINGS_SECTION: &str = "ConnectionStrings";

/// Key/value view of already-loaded application configuration
///
/// Keys are `:`-separated paths (`ApplicationInsights:InstrumentationKey`).
/// Implementations are expected to compare keys case-insensitively.
pub trait Configuration: Send + Sync {
    /// Value stored at `key`
    fn get(&self, key: &str) -> Option<String>;

    /// All entries below `section`, with the section prefix stripped
    fn section(&self, section: &str) -> Vec<(String, String)>;

    /// Connection string registered under `ConnectionStrings:<name>`
    fn connection_string(&self, name: &str) -> Option<String> {
        self.get(&format!("{CONNECTION_STRINGS_SECTION}{KEY_DELIMITER}{name}"))
    }
}

/// In-memory configuration with case-insensitive keys
///
/// Later additions override earlier ones, so sources can be layered:
///
/// ```rust
/// use log_defaults::hosting::{Configuration, MemoryConfiguration};
///
/// let config = MemoryConfiguration::new()
///     .with("BuildNumber", "1.0.0")
///     .with("buildnumber", "1.0.1");
/// assert_eq!(config.get("BUILDNUMBER").as_deref(), Some("1.0.1"));
/// ```
#[derive(Debug, Clone, Default)]
pub struct MemoryConfiguration {
    // lower-cased key -> (original key, value)
    entries: BTreeMap<String, (String, String)>,
}

impl MemoryConfiguration {
    /// Create an empty configuration
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Build from key/value pairs
    pub fn from_pairs<I, K, V>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        pairs
            .into_iter()
            .fold(Self::new(), |config, (key, value)| config.with(key, value))
    }

    /// Build from a JSON document, flattening objects and arrays into
    /// `:`-separated keys (`{"A":{"B":[1]}}` becomes `A:B:0 = 1`)
    pub fn from_json(value: &Value) -> Self {
        let mut config = Self::new();
        config.add_json(value);
        config
    }

    /// Add or replace a single entry
    #[must_use]
    pub fn with(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.insert(key, value);
        self
    }

    /// Add or replace a single entry in place
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) {
        let key = key.into();
        self.entries
            .insert(key.to_ascii_lowercase(), (key, value.into()));
    }

    /// Layer a JSON document over the current entries
    pub fn add_json(&mut self, value: &Value) {
        flatten_json(self, None, value);
    }

    /// Layer environment variables starting with `prefix` over the current
    /// entries. The prefix is stripped and `__` becomes `:`, so
    /// `APP_ConnectionStrings__LogsConnection` maps to
    /// `ConnectionStrings:LogsConnection`.
    #[must_use]
    pub fn with_env_vars(mut self, prefix: &str) -> Self {
        self.add_vars(std::env::vars(), prefix);
        self
    }

    fn add_vars(&mut self, vars: impl Iterator<Item = (String, String)>, prefix: &str) {
        for (name, value) in vars {
            if let Some(rest) = name.strip_prefix(prefix) {
                if !rest.is_empty() {
                    self.insert(rest.replace("__", ":"), value);
                }
            }
        }
    }

    /// Number of entries
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether there are no entries
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

fn flatten_json(config: &mut MemoryConfiguration, prefix: Option<&str>, value: &Value) {
    let child = |key: &str| match prefix {
        Some(prefix) => format!("{prefix}{KEY_DELIMITER}{key}"),
        None => key.to_string(),
    };

    match value {
        Value::Object(map) => {
            for (key, value) in map {
                flatten_json(config, Some(&child(key)), value);
            }
        }
        Value::Array(items) => {
            for (index, value) in items.iter().enumerate() {
                flatten_json(config, Some(&child(&index.to_string())), value);
            }
        }
        Value::Null => {
            if let Some(prefix) = prefix {
                config.insert(prefix, "");
            }
        }
        Value::String(s) => {
            if let Some(prefix) = prefix {
                config.insert(prefix, s.clone());
            }
        }
        other => {
            if let Some(prefix) = prefix {
                config.insert(prefix, other.to_string());
            }
        }
    }
}

impl Configuration for MemoryConfiguration {
    fn get(&self, key: &str) -> Option<String> {
        self.entries
            .get(&key.to_ascii_lowercase())
            .map(|(_, value)| value.clone())
    }

    fn section(&self, section: &str) -> Vec<(String, String)> {
        let prefix = format!("{}{KEY_DELIMITER}", section.to_ascii_lowercase());
        self.entries
            .range(prefix.clone()..)
            .take_while(|(lower, _)| lower.starts_with(&prefix))
            .map(|(_, (key, value))| (key[prefix.len()..].to_string(), value.clone()))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn test_keys_are_case_insensitive() {
        let config = MemoryConfiguration::from_pairs([("ApplicationInsights:InstrumentationKey", "abc")]);
        assert_eq!(
            config.get("applicationinsights:instrumentationkey").as_deref(),
            Some("abc")
        );
        assert_eq!(config.get("Missing"), None);
    }

    #[test]
    fn test_connection_string_lookup() {
        let config = MemoryConfiguration::new()
            .with("ConnectionStrings:LogsConnection", "Server=x;Database=y;");
        assert_eq!(
            config.connection_string("LogsConnection").as_deref(),
            Some("Server=x;Database=y;")
        );
        assert_eq!(config.connection_string("Other"), None);
    }

    #[test]
    fn test_from_json_flattens_sections() {
        let config = MemoryConfiguration::from_json(&json!({
            "BuildNumber": "2024.1",
            "ConnectionStrings": { "LogsConnection": "Server=x;" },
            "Logging": { "MinimumLevel": { "Default": "Debug", "Override": { "hyper": "Warning" } } },
            "Hosts": ["a", "b"],
            "Port": 8080,
            "Empty": null
        }));

        assert_eq!(config.get("BuildNumber").as_deref(), Some("2024.1"));
        assert_eq!(config.connection_string("LogsConnection").as_deref(), Some("Server=x;"));
        assert_eq!(config.get("Hosts:1").as_deref(), Some("b"));
        assert_eq!(config.get("Port").as_deref(), Some("8080"));
        assert_eq!(config.get("Empty").as_deref(), Some(""));
        assert_eq!(
            config.section("Logging:MinimumLevel"),
            vec![
                ("Default".to_string(), "Debug".to_string()),
                ("Override:hyper".to_string(), "Warning".to_string()),
            ]
        );
    }

    #[test]
    fn test_section_does_not_match_sibling_prefixes() {
        let config = MemoryConfiguration::from_pairs([
            ("Logging:Properties:Region", "eu"),
            ("LoggingExtra:Properties:Region", "us"),
        ]);
        assert_eq!(
            config.section("logging"),
            vec![("Properties:Region".to_string(), "eu".to_string())]
        );
    }

    #[test]
    fn test_env_vars_map_double_underscore() {
        let mut config = MemoryConfiguration::new();
        config.add_vars(
            [
                ("APP_ConnectionStrings__LogsConnection".to_string(), "Server=env;".to_string()),
                ("APP_".to_string(), "ignored".to_string()),
                ("OTHER_BuildNumber".to_string(), "ignored".to_string()),
            ]
            .into_iter(),
            "APP_",
        );
        assert_eq!(config.len(), 1);
        assert_eq!(config.connection_string("LogsConnection").as_deref(), Some("Server=env;"));
    }
}
