//! Enrichers attach properties to every event that passes through a logger

mod exception;

use serde_json::Value;

pub use exception::{EXCEPTION_DETAIL_PROPERTY, ExceptionDetailsEnricher};

use crate::event::LogEvent;
use crate::layer::context::LogContext;

/// Adds properties to log events
///
/// Enrichers run in registration order. Each one writes straight into
/// [`LogEvent::properties`], so a later enricher overwrites an earlier one
/// that set the same key.
pub trait LogEnricher: Send + Sync {
    /// Name shown when inspecting a configuration
    fn name(&self) -> &str;

    /// Property key this enricher owns, if it sets exactly one
    fn property_key(&self) -> Option<&str> {
        None
    }

    /// Add or overwrite properties on the event
    fn enrich(&self, event: &mut LogEvent);
}

/// Copies the ambient log context onto the event: fields of the enclosing
/// `tracing` spans first, then properties pushed with
/// [`LogContext::push_property`].
#[derive(Debug, Clone, Copy, Default)]
pub struct LogContextEnricher;

impl LogEnricher for LogContextEnricher {
    fn name(&self) -> &str {
        "LogContext"
    }

    fn enrich(&self, event: &mut LogEvent) {
        let scope = std::mem::take(&mut event.scope);
        event.properties.extend(scope);

        let context = LogContext::current();
        event.properties.extend(
            context
                .properties()
                .iter()
                .map(|(name, value)| (name.clone(), value.clone())),
        );
    }
}

/// Sets one fixed property
#[derive(Debug, Clone, PartialEq)]
pub struct PropertyEnricher {
    name: String,
    value: Value,
}

impl PropertyEnricher {
    /// Create an enricher; passing `None` produces a JSON `null` property
    pub fn new(name: impl Into<String>, value: impl Into<Value>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
        }
    }

    /// Value written to every event
    pub fn value(&self) -> &Value {
        &self.value
    }
}

impl LogEnricher for PropertyEnricher {
    fn name(&self) -> &str {
        &self.name
    }

    fn property_key(&self) -> Option<&str> {
        Some(&self.name)
    }

    fn enrich(&self, event: &mut LogEvent) {
        event.properties.insert(self.name.clone(), self.value.clone());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::Level;
    use serde_json::json;

    #[test]
    fn test_property_enricher_overwrites() {
        let mut event = LogEvent::new(Level::Info, "hello").with_property("Application", "old");
        PropertyEnricher::new("Application", "orders-api").enrich(&mut event);
        assert_eq!(event.property("Application"), Some(&json!("orders-api")));
    }

    #[test]
    fn test_property_enricher_with_missing_value_writes_null() {
        let enricher = PropertyEnricher::new("BuildNumber", None::<String>);
        let mut event = LogEvent::new(Level::Info, "hello");
        enricher.enrich(&mut event);

        assert_eq!(enricher.property_key(), Some("BuildNumber"));
        assert_eq!(event.property("BuildNumber"), Some(&Value::Null));
    }

    #[test]
    fn test_log_context_enricher_merges_scope_and_context() {
        let mut event = LogEvent::new(Level::Info, "hello");
        event.scope.insert("span_field".to_string(), json!("from-span"));
        event.scope.insert("RequestPath".to_string(), json!("/span"));

        let _guard = LogContext::push_property("RequestPath", "/context");
        LogContextEnricher.enrich(&mut event);

        assert!(event.scope.is_empty());
        assert_eq!(event.property("span_field"), Some(&json!("from-span")));
        assert_eq!(event.property("RequestPath"), Some(&json!("/context")));
    }
}
