//! Logger configuration builder
//!
//! This module is organized into:
//! - `logger`: the finalized pipeline and its global installation
//! - `settings`: logger settings read from application configuration

mod logger;
pub mod settings;

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use serde_json::Value;

pub use logger::{Logger, LoggerGuard};
pub use settings::{LoggerSettings, SETTINGS_SECTION};

use crate::core::LogResult;
use crate::enrich::{ExceptionDetailsEnricher, LogContextEnricher, LogEnricher, PropertyEnricher};
use crate::event::Level;
use crate::hosting::Configuration;
use crate::sink::{LogSink, SinkKind};
use logger::LevelSwitch;

/// Accumulates level settings, enrichers and sinks
///
/// Owned by the caller and threaded through configuration helpers by value:
///
/// ```rust
/// use log_defaults::{Level, LoggerConfiguration};
///
/// let config = LoggerConfiguration::new()
///     .minimum_level(Level::Debug)
///     .enrich_from_log_context()
///     .enrich_with_property("Application", "orders-api");
/// assert_eq!(config.enricher_names(), ["LogContext", "Application"]);
/// ```
pub struct LoggerConfiguration {
    minimum_level: Level,
    overrides: BTreeMap<String, Level>,
    enrichers: Vec<Box<dyn LogEnricher>>,
    sinks: Vec<Box<dyn LogSink>>,
}

impl Default for LoggerConfiguration {
    fn default() -> Self {
        Self {
            minimum_level: Level::Info,
            overrides: BTreeMap::new(),
            enrichers: Vec::new(),
            sinks: Vec::new(),
        }
    }
}

impl LoggerConfiguration {
    /// Create an empty configuration (minimum level `Information`)
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the default minimum level
    pub fn minimum_level(mut self, level: Level) -> Self {
        self.minimum_level = level;
        self
    }

    /// Set the minimum level for a target and everything below it
    pub fn override_level(mut self, target: impl Into<String>, level: Level) -> Self {
        self.overrides.insert(target.into(), level);
        self
    }

    /// Apply settings declared under [`SETTINGS_SECTION`] of `configuration`
    pub fn read_from(self, configuration: &dyn Configuration) -> Self {
        self.apply_settings(&LoggerSettings::from_configuration(configuration))
    }

    /// Apply already-read settings
    pub fn apply_settings(mut self, settings: &LoggerSettings) -> Self {
        if let Some(level) = settings.minimum_level {
            self.minimum_level = level;
        }
        self.overrides.extend(
            settings
                .overrides
                .iter()
                .map(|(target, level)| (target.clone(), *level)),
        );
        for (name, value) in &settings.properties {
            self = self.enrich_with_property(name.clone(), value.clone());
        }
        self
    }

    /// Add an enricher
    pub fn enrich(mut self, enricher: impl LogEnricher + 'static) -> Self {
        self.enrichers.push(Box::new(enricher));
        self
    }

    /// Attach span fields and [`LogContext`](crate::LogContext) properties
    pub fn enrich_from_log_context(self) -> Self {
        self.enrich(LogContextEnricher)
    }

    /// Attach structured details of the event's error
    pub fn enrich_with_exception_details(self) -> Self {
        self.enrich(ExceptionDetailsEnricher)
    }

    /// Attach a fixed property; `None` produces a `null` value
    pub fn enrich_with_property(self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.enrich(PropertyEnricher::new(name, value))
    }

    /// Register a sink
    pub fn write_to(self, sink: impl LogSink + 'static) -> Self {
        self.write_to_boxed(Box::new(sink))
    }

    /// Register an already boxed sink
    pub fn write_to_boxed(mut self, sink: Box<dyn LogSink>) -> Self {
        self.sinks.push(sink);
        self
    }

    /// Default minimum level
    pub fn level(&self) -> Level {
        self.minimum_level
    }

    /// Per-target minimum levels
    pub fn overrides(&self) -> &BTreeMap<String, Level> {
        &self.overrides
    }

    /// Enrichers in registration order
    pub fn enrichers(&self) -> impl Iterator<Item = &dyn LogEnricher> {
        self.enrichers.iter().map(AsRef::as_ref)
    }

    /// Enricher names in registration order
    pub fn enricher_names(&self) -> Vec<&str> {
        self.enrichers().map(LogEnricher::name).collect()
    }

    /// Keys of the properties set by single-property enrichers
    pub fn property_keys(&self) -> BTreeSet<&str> {
        self.enrichers().filter_map(LogEnricher::property_key).collect()
    }

    /// Registered sinks in registration order
    pub fn sinks(&self) -> &[Box<dyn LogSink>] {
        &self.sinks
    }

    /// Kinds of the registered sinks, in registration order
    pub fn sink_kinds(&self) -> Vec<SinkKind> {
        self.sinks.iter().map(|sink| sink.kind()).collect()
    }

    /// Finalize into a [`Logger`]
    pub fn create_logger(self) -> Logger {
        Logger::new(
            LevelSwitch {
                minimum: self.minimum_level,
                overrides: self.overrides,
            },
            self.enrichers,
            self.sinks,
        )
    }

    /// Finalize and install as the global `tracing` subscriber
    ///
    /// # Errors
    ///
    /// See [`Logger::init`]
    pub fn init(self) -> LogResult<LoggerGuard> {
        self.create_logger().init()
    }
}

impl fmt::Debug for LoggerConfiguration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LoggerConfiguration")
            .field("minimum_level", &self.minimum_level)
            .field("overrides", &self.overrides)
            .field("enrichers", &self.enricher_names())
            .field("sinks", &self.sink_kinds())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hosting::MemoryConfiguration;
    use crate::sink::testing::RecordingSink;

    #[test]
    fn test_builder_records_enrichers_in_order() {
        let config = LoggerConfiguration::new()
            .enrich_from_log_context()
            .enrich_with_exception_details()
            .enrich_with_property("Application", "orders-api")
            .enrich_with_property("BuildNumber", None::<String>);

        assert_eq!(
            config.enricher_names(),
            ["LogContext", "ExceptionDetails", "Application", "BuildNumber"]
        );
        assert_eq!(
            config.property_keys(),
            BTreeSet::from(["Application", "BuildNumber", "ExceptionDetail"])
        );
        assert!(config.sinks().is_empty());
    }

    #[test]
    fn test_read_from_applies_levels_and_properties() {
        let config = LoggerConfiguration::new().read_from(&MemoryConfiguration::from_pairs([
            ("Logging:MinimumLevel", "Warning"),
            ("Logging:MinimumLevel:Override:orders::db", "Debug"),
            ("Logging:Properties:Region", "eu-west"),
        ]));

        assert_eq!(config.level(), Level::Warn);
        assert_eq!(config.overrides().get("orders::db"), Some(&Level::Debug));
        assert_eq!(config.enricher_names(), ["Region"]);
    }

    #[test]
    fn test_create_logger_keeps_sinks() {
        let (sink, _events) = RecordingSink::new();
        let logger = LoggerConfiguration::new().write_to(sink).create_logger();
        assert_eq!(logger.sink_kinds(), [SinkKind::Custom]);
    }
}
