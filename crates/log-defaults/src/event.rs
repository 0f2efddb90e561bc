//! Log event model shared by enrichers and sinks

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};
use serde_json::Value;
use time::OffsetDateTime;

/// Log level
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Level {
    /// Trace level (`Verbose`)
    Trace,
    /// Debug level
    Debug,
    /// Info level (`Information`)
    Info,
    /// Warn level (`Warning`)
    Warn,
    /// Error level
    Error,
}

impl Level {
    /// Long name written to the level column and telemetry properties
    pub const fn name(self) -> &'static str {
        match self {
            Self::Trace => "Verbose",
            Self::Debug => "Debug",
            Self::Info => "Information",
            Self::Warn => "Warning",
            Self::Error => "Error",
        }
    }

    /// Three-letter upper-case abbreviation used by `{Level:u3}`
    pub const fn short_name(self) -> &'static str {
        match self {
            Self::Trace => "VRB",
            Self::Debug => "DBG",
            Self::Info => "INF",
            Self::Warn => "WRN",
            Self::Error => "ERR",
        }
    }

    /// Convert from a `tracing` level
    pub fn from_tracing(level: &tracing::Level) -> Self {
        match *level {
            tracing::Level::TRACE => Self::Trace,
            tracing::Level::DEBUG => Self::Debug,
            tracing::Level::INFO => Self::Info,
            tracing::Level::WARN => Self::Warn,
            tracing::Level::ERROR => Self::Error,
        }
    }
}

impl fmt::Display for Level {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Trace => write!(f, "trace"),
            Self::Debug => write!(f, "debug"),
            Self::Info => write!(f, "info"),
            Self::Warn => write!(f, "warn"),
            Self::Error => write!(f, "error"),
        }
    }
}

/// Level name that is neither a `tracing` directive nor a long level name
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown log level '{0}'")]
pub struct UnknownLevel(pub String);

impl FromStr for Level {
    type Err = UnknownLevel;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "verbose" | "trace" => Ok(Self::Trace),
            "debug" => Ok(Self::Debug),
            "information" | "info" => Ok(Self::Info),
            "warning" | "warn" => Ok(Self::Warn),
            // There is no fatal level in `tracing`
            "error" | "fatal" => Ok(Self::Error),
            _ => Err(UnknownLevel(s.to_string())),
        }
    }
}

/// Error captured from an event, flattened with its `source()` chain
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExceptionInfo {
    /// `Display` output of the outermost error
    pub message: String,
    /// `Display` output of each source, outermost first
    pub sources: Vec<String>,
}

impl ExceptionInfo {
    /// Capture an error and walk its source chain
    pub fn from_error(error: &(dyn std::error::Error + 'static)) -> Self {
        let mut sources = Vec::new();
        let mut next = error.source();
        while let Some(source) = next {
            sources.push(source.to_string());
            next = source.source();
        }
        Self {
            message: error.to_string(),
            sources,
        }
    }

    /// Capture a message without a source chain
    pub fn from_message(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            sources: Vec::new(),
        }
    }
}

impl fmt::Display for ExceptionInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)?;
        for source in &self.sources {
            write!(f, "\n ---> {source}")?;
        }
        Ok(())
    }
}

/// A single structured log event
#[derive(Debug, Clone, PartialEq)]
pub struct LogEvent {
    /// Time the event was captured (UTC)
    pub timestamp: OffsetDateTime,
    /// Event level
    pub level: Level,
    /// Module path or `tracing` target
    pub target: String,
    /// Rendered message
    pub message: String,
    /// Error attached to the event, if any
    pub exception: Option<ExceptionInfo>,
    /// Properties attached by the call site and by enrichers
    pub properties: BTreeMap<String, Value>,
    /// Fields of the spans the event was recorded in, outermost first
    pub scope: BTreeMap<String, Value>,
    /// Process-unique id of the emitting thread
    pub thread_id: u64,
    /// Hash identifying the call site (or the message when built by hand)
    pub event_type: u32,
}

impl LogEvent {
    /// Create an event stamped with the current time and thread
    pub fn new(level: Level, message: impl Into<String>) -> Self {
        let message = message.into();
        Self {
            timestamp: OffsetDateTime::now_utc(),
            level,
            target: String::new(),
            event_type: event_type_of(&message),
            message,
            exception: None,
            properties: BTreeMap::new(),
            scope: BTreeMap::new(),
            thread_id: current_thread_id(),
        }
    }

    /// Set the target
    #[must_use]
    pub fn with_target(mut self, target: impl Into<String>) -> Self {
        self.target = target.into();
        self
    }

    /// Add a call-site property
    #[must_use]
    pub fn with_property(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.properties.insert(name.into(), value.into());
        self
    }

    /// Attach an error
    #[must_use]
    pub fn with_exception(mut self, exception: ExceptionInfo) -> Self {
        self.exception = Some(exception);
        self
    }

    /// Override the timestamp
    #[must_use]
    pub fn with_timestamp(mut self, timestamp: OffsetDateTime) -> Self {
        self.timestamp = timestamp;
        self
    }

    /// Look up a property by name
    #[inline]
    pub fn property(&self, name: &str) -> Option<&Value> {
        self.properties.get(name)
    }
}

/// Render a property value the way templates and text columns show it:
/// strings without quotes, everything else as compact JSON.
pub fn render_value(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

/// Process-unique, stable id of the current thread
pub fn current_thread_id() -> u64 {
    static NEXT: AtomicU64 = AtomicU64::new(1);

    thread_local! {
        static ID: u64 = NEXT.fetch_add(1, Ordering::Relaxed);
    }

    ID.with(|id| *id)
}

/// 32-bit FNV-1a hash used as the event type
pub fn event_type_of(text: &str) -> u32 {
    const OFFSET: u32 = 0x811c_9dc5;
    const PRIME: u32 = 0x0100_0193;

    text.bytes()
        .fold(OFFSET, |hash, byte| (hash ^ u32::from(byte)).wrapping_mul(PRIME))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("Verbose", Level::Trace)]
    #[case("trace", Level::Trace)]
    #[case("Information", Level::Info)]
    #[case("WARNING", Level::Warn)]
    #[case("warn", Level::Warn)]
    #[case("Fatal", Level::Error)]
    #[case(" debug ", Level::Debug)]
    fn test_level_from_str(#[case] input: &str, #[case] expected: Level) {
        assert_eq!(input.parse::<Level>().unwrap(), expected);
    }

    #[test]
    fn test_unknown_level() {
        let error = "loud".parse::<Level>().unwrap_err();
        assert_eq!(error.to_string(), "unknown log level 'loud'");
    }

    #[test]
    fn test_level_ordering_matches_severity() {
        assert!(Level::Trace < Level::Debug);
        assert!(Level::Warn < Level::Error);
        assert_eq!(Level::Info.name(), "Information");
        assert_eq!(Level::Warn.short_name(), "WRN");
    }

    #[derive(Debug, thiserror::Error)]
    #[error("query failed")]
    struct QueryError(#[source] std::io::Error);

    #[test]
    fn test_exception_info_walks_source_chain() {
        let error = QueryError(std::io::Error::other("connection reset"));
        let info = ExceptionInfo::from_error(&error);

        assert_eq!(info.message, "query failed");
        assert_eq!(info.sources, vec!["connection reset".to_string()]);
        assert_eq!(info.to_string(), "query failed\n ---> connection reset");
    }

    #[test]
    fn test_thread_id_is_stable_per_thread() {
        let here = current_thread_id();
        assert_eq!(here, current_thread_id());

        let there = std::thread::spawn(current_thread_id).join().unwrap();
        assert_ne!(here, there);
    }

    #[test]
    fn test_event_type_is_deterministic() {
        assert_eq!(event_type_of("hello"), event_type_of("hello"));
        assert_ne!(event_type_of("hello"), event_type_of("world"));
        assert_eq!(event_type_of(""), 0x811c_9dc5);
    }

    #[test]
    fn test_render_value() {
        assert_eq!(render_value(&Value::from("abc")), "abc");
        assert_eq!(render_value(&Value::Null), "");
        assert_eq!(render_value(&Value::from(42)), "42");
    }
}
