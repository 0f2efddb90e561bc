//! Logger settings declared in application configuration
//!
//! ```text
//! Logging:MinimumLevel                      = Information
//! Logging:MinimumLevel:Default              = Information   (same as above)
//! Logging:MinimumLevel:Override:hyper       = Warning
//! Logging:Properties:Region                 = eu-west
//! ```

use std::collections::BTreeMap;

use crate::event::Level;
use crate::hosting::{Configuration, KEY_DELIMITER};

/// Configuration section holding logger settings
pub const SETTINGS_SECTION: &str = "Logging";

/// Settings read from the [`SETTINGS_SECTION`]
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LoggerSettings {
    /// Default minimum level
    pub minimum_level: Option<Level>,
    /// Minimum level per target prefix
    pub overrides: BTreeMap<String, Level>,
    /// Properties attached to every event
    pub properties: BTreeMap<String, String>,
}

impl LoggerSettings {
    /// Read settings; unknown keys are ignored and unparseable levels are
    /// reported to the self log and skipped
    pub fn from_configuration(configuration: &dyn Configuration) -> Self {
        let mut settings = Self::default();

        for (key, value) in configuration.section(SETTINGS_SECTION) {
            let parts: Vec<&str> = key.split(KEY_DELIMITER).collect();
            match parts.as_slice() {
                [minimum] if minimum.eq_ignore_ascii_case("MinimumLevel") => {
                    settings.minimum_level = parse_level(&key, &value).or(settings.minimum_level);
                }
                [minimum, default]
                    if minimum.eq_ignore_ascii_case("MinimumLevel")
                        && default.eq_ignore_ascii_case("Default") =>
                {
                    settings.minimum_level = parse_level(&key, &value).or(settings.minimum_level);
                }
                [minimum, over, target @ ..]
                    if minimum.eq_ignore_ascii_case("MinimumLevel")
                        && over.eq_ignore_ascii_case("Override")
                        && !target.is_empty() =>
                {
                    // `hyper::client` arrives split as ["hyper", "", "client"]
                    let target = target.join(":");
                    if let Some(level) = parse_level(&key, &value) {
                        settings.overrides.insert(target, level);
                    }
                }
                [properties, name] if properties.eq_ignore_ascii_case("Properties") => {
                    settings.properties.insert((*name).to_string(), value);
                }
                _ => {}
            }
        }

        settings
    }

    /// Whether nothing was configured
    pub fn is_empty(&self) -> bool {
        self.minimum_level.is_none() && self.overrides.is_empty() && self.properties.is_empty()
    }
}

fn parse_level(key: &str, value: &str) -> Option<Level> {
    match value.parse() {
        Ok(level) => Some(level),
        Err(e) => {
            crate::selflog!("ignoring {SETTINGS_SECTION}:{key}: {e}");
            None
        }
    }
}
