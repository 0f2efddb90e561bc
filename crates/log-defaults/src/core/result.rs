//! Result extension traits for sink implementations

use crate::core::error::{LogError, LogResult};

/// Extension trait for mapping foreign errors into [`LogError::Sink`]
pub trait LogResultExt<T> {
    /// Attribute the error to a sink
    ///
    /// # Errors
    ///
    /// Returns [`LogError::Sink`] carrying the original error message
    fn with_sink(self, sink: &str) -> LogResult<T>;

    /// Attribute the error to a sink and prepend context
    ///
    /// # Errors
    ///
    /// Returns [`LogError::Sink`] with `"{context}: {error}"` as the reason
    fn with_sink_context<S: Into<String>, F>(self, sink: &str, f: F) -> LogResult<T>
    where
        F: FnOnce() -> S;
}

impl<T, E> LogResultExt<T> for Result<T, E>
where
    E: std::fmt::Display,
{
    fn with_sink(self, sink: &str) -> LogResult<T> {
        self.map_err(|e| LogError::sink(sink, e.to_string()))
    }

    fn with_sink_context<S: Into<String>, F>(self, sink: &str, f: F) -> LogResult<T>
    where
        F: FnOnce() -> S,
    {
        self.map_err(|e| {
            let ctx = f().into();
            LogError::sink(sink, format!("{ctx}: {e}"))
        })
    }
}
