//! Hosting context: configuration values plus the environment name

mod configuration;

use std::fmt;
use std::sync::Arc;

pub use configuration::{
    CONNECTION_STRINGS_SECTION, Configuration, KEY_DELIMITER, MemoryConfiguration,
};

/// Environment name used when nothing else is configured
pub const DEFAULT_ENVIRONMENT: &str = "Production";

/// Ambient environment descriptor supplied by the host application
///
/// Cheap to clone; the configuration is shared.
#[derive(Clone)]
pub struct HostingContext {
    configuration: Arc<dyn Configuration>,
    environment_name: String,
}

impl HostingContext {
    /// Create a context from a configuration and an environment name
    pub fn new(configuration: impl Configuration + 'static, environment_name: impl Into<String>) -> Self {
        Self::from_shared(Arc::new(configuration), environment_name)
    }

    /// Create a context around an already shared configuration
    pub fn from_shared(
        configuration: Arc<dyn Configuration>,
        environment_name: impl Into<String>,
    ) -> Self {
        Self {
            configuration,
            environment_name: environment_name.into(),
        }
    }

    /// Create a context whose environment name is detected from the process
    /// environment (see [`detect_environment`])
    pub fn from_env(configuration: impl Configuration + 'static) -> Self {
        Self::new(configuration, detect_environment())
    }

    /// Configuration lookup
    pub fn configuration(&self) -> &dyn Configuration {
        self.configuration.as_ref()
    }

    /// Hosting environment name (`Development`, `Staging`, `Production`, ...)
    pub fn environment_name(&self) -> &str {
        &self.environment_name
    }

    /// Whether the environment name matches, ignoring case
    pub fn is_environment(&self, name: &str) -> bool {
        self.environment_name.eq_ignore_ascii_case(name)
    }
}

impl fmt::Debug for HostingContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HostingContext")
            .field("environment_name", &self.environment_name)
            .finish_non_exhaustive()
    }
}

/// Detect the environment name from common variables
///
/// Checks `APP_ENVIRONMENT`, `RUST_ENV` and `ENVIRONMENT` in that order and
/// falls back to [`DEFAULT_ENVIRONMENT`].
pub fn detect_environment() -> String {
    detect_environment_from(|name| std::env::var(name).ok())
}

fn detect_environment_from(lookup: impl Fn(&str) -> Option<String>) -> String {
    ["APP_ENVIRONMENT", "RUST_ENV", "ENVIRONMENT"]
        .into_iter()
        .filter_map(lookup)
        .find(|value| !value.trim().is_empty())
        .unwrap_or_else(|| DEFAULT_ENVIRONMENT.to_string())
}
