//! Structured exception details

use serde_json::{Map, Value};

use super::LogEnricher;
use crate::event::{ExceptionInfo, LogEvent};

/// Property written by [`ExceptionDetailsEnricher`]
pub const EXCEPTION_DETAIL_PROPERTY: &str = "ExceptionDetail";

/// Destructures the event's error into an `ExceptionDetail` property:
/// `{"Message": .., "InnerException": {"Message": .., ..}}`, one level per
/// `source()` in the chain. Events without an error are left untouched.
#[derive(Debug, Clone, Copy, Default)]
pub struct ExceptionDetailsEnricher;

impl ExceptionDetailsEnricher {
    fn destructure(exception: &ExceptionInfo) -> Value {
        let inner = exception
            .sources
            .iter()
            .rev()
            .fold(None, |inner: Option<Value>, message| {
                Some(Value::Object(detail(message, inner)))
            });
        Value::Object(detail(&exception.message, inner))
    }
}

fn detail(message: &str, inner: Option<Value>) -> Map<String, Value> {
    let mut map = Map::new();
    map.insert("Message".to_string(), Value::from(message));
    if let Some(inner) = inner {
        map.insert("InnerException".to_string(), inner);
    }
    map
}

impl LogEnricher for ExceptionDetailsEnricher {
    fn name(&self) -> &str {
        "ExceptionDetails"
    }

    fn property_key(&self) -> Option<&str> {
        Some(EXCEPTION_DETAIL_PROPERTY)
    }

    fn enrich(&self, event: &mut LogEvent) {
        if let Some(exception) = &event.exception {
            let value = Self::destructure(exception);
            event
                .properties
                .insert(EXCEPTION_DETAIL_PROPERTY.to_string(), value);
        }
    }
}
