//! Error types for log-defaults
//!
//! Configuration problems surfaced by [`load_default_config`](crate::load_default_config)
//! are [`ConfigurationError`]s. Everything that can go wrong after the pipeline
//! is built (installing the subscriber, writing to a sink) is a [`LogError`].

use thiserror::Error;

/// Result type for logging operations
pub type LogResult<T> = Result<T, LogError>;

/// Required configuration could not be resolved from the hosting context
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[non_exhaustive]
pub enum ConfigurationError {
    /// A named connection string is absent or empty
    #[error("Unable to find the connection string {name}.")]
    MissingConnectionString {
        /// Connection string name, e.g. `LogsConnection`
        name: String,
    },

    /// A configuration key is absent or empty
    #[error("Unable to find {key} in configuration.")]
    MissingSetting {
        /// Full `:`-separated configuration key
        key: String,
    },
}

impl ConfigurationError {
    /// Name of the configuration entry that could not be resolved
    pub fn missing_key(&self) -> &str {
        match self {
            Self::MissingConnectionString { name } => name,
            Self::MissingSetting { key } => key,
        }
    }
}

/// Error type for logger operations
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum LogError {
    /// Required configuration is missing
    #[error(transparent)]
    Configuration(#[from] ConfigurationError),

    /// Filter directive could not be parsed
    #[error("Invalid filter '{filter}': {reason}")]
    Filter {
        /// The rejected directive string
        filter: String,
        /// Parser message
        reason: String,
    },

    /// Global subscriber could not be installed
    #[error("Logger initialization failed: {0}")]
    Init(String),

    /// A sink failed to deliver events
    #[error("Sink '{sink}' error: {reason}")]
    Sink {
        /// Sink name (`mssql`, `console`, `insights`)
        sink: String,
        /// Failure description
        reason: String,
    },

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl LogError {
    /// Create a sink error
    pub fn sink(sink: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Sink {
            sink: sink.into(),
            reason: reason.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_configuration_error_messages_name_the_key() {
        let error = ConfigurationError::MissingConnectionString {
            name: "LogsConnection".to_string(),
        };
        assert_eq!(
            error.to_string(),
            "Unable to find the connection string LogsConnection."
        );
        assert_eq!(error.missing_key(), "LogsConnection");

        let error = ConfigurationError::MissingSetting {
            key: "ApplicationInsights:InstrumentationKey".to_string(),
        };
        assert_eq!(
            error.to_string(),
            "Unable to find ApplicationInsights:InstrumentationKey in configuration."
        );
    }

    #[test]
    fn test_configuration_error_is_transparent_in_log_error() {
        let error: LogError = ConfigurationError::MissingConnectionString {
            name: "LogsConnection".to_string(),
        }
        .into();
        assert!(error.to_string().contains("LogsConnection"));
        assert!(matches!(error, LogError::Configuration(_)));
    }
}
