//! Telemetry envelopes

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};
use time::format_description::well_known::Rfc3339;

use super::TelemetryConfiguration;
use crate::event::{Level, LogEvent, render_value};

const SDK_VERSION: &str = concat!("log-defaults:", env!("CARGO_PKG_VERSION"));

/// One telemetry item in the ingestion wire format
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Envelope {
    /// `Microsoft.ApplicationInsights.<key>.<Message|Exception|Event>`
    pub name: String,
    /// Event time, RFC 3339
    pub time: String,
    /// Instrumentation key
    #[serde(rename = "iKey")]
    pub instrumentation_key: String,
    /// Context tags (`ai.cloud.role`, `ai.application.ver`, ...)
    pub tags: BTreeMap<String, String>,
    /// Typed payload
    pub data: EnvelopeData,
}

/// Payload of an [`Envelope`]
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EnvelopeData {
    /// `MessageData`, `ExceptionData` or `EventData`
    pub base_type: String,
    /// Type-specific fields
    pub base_data: Value,
}

impl Envelope {
    /// Payload type
    pub fn base_type(&self) -> &str {
        &self.data.base_type
    }
}

/// How events become telemetry items
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TelemetryConverter {
    /// Trace messages (`MessageData`)
    #[default]
    Traces,
    /// Custom events named by their message (`EventData`)
    Events,
}

/// Severity of a trace message
pub const fn severity_level(level: Level) -> u8 {
    match level {
        Level::Trace | Level::Debug => 0,
        Level::Info => 1,
        Level::Warn => 2,
        Level::Error => 3,
    }
}

impl TelemetryConverter {
    /// Convert one event; events carrying an error always become
    /// `ExceptionData`
    pub fn convert(self, event: &LogEvent, configuration: &TelemetryConfiguration) -> Envelope {
        let properties = string_properties(event);

        let (suffix, base_type, base_data) = match (&event.exception, self) {
            (Some(exception), _) => {
                let mut properties = properties;
                properties.insert("RenderedMessage".to_string(), Value::from(event.message.as_str()));

                let messages = std::iter::once(&exception.message).chain(&exception.sources);
                let exceptions: Vec<Value> = messages
                    .enumerate()
                    .map(|(id, message)| {
                        let mut details = json!({
                            "id": id,
                            "typeName": "Error",
                            "message": message,
                            "hasFullStack": false,
                        });
                        if id > 0 {
                            details["outerId"] = json!(id - 1);
                        }
                        details
                    })
                    .collect();

                (
                    "Exception",
                    "ExceptionData",
                    json!({
                        "ver": 2,
                        "exceptions": exceptions,
                        "severityLevel": severity_level(event.level),
                        "properties": properties,
                    }),
                )
            }
            (None, Self::Traces) => (
                "Message",
                "MessageData",
                json!({
                    "ver": 2,
                    "message": event.message,
                    "severityLevel": severity_level(event.level),
                    "properties": properties,
                }),
            ),
            (None, Self::Events) => (
                "Event",
                "EventData",
                json!({
                    "ver": 2,
                    "name": event.message,
                    "properties": properties,
                }),
            ),
        };

        Envelope {
            name: format!(
                "Microsoft.ApplicationInsights.{}.{suffix}",
                configuration.instrumentation_key.replace('-', "")
            ),
            time: event.timestamp.format(&Rfc3339).unwrap_or_default(),
            instrumentation_key: configuration.instrumentation_key.clone(),
            tags: tags(event),
            data: EnvelopeData {
                base_type: base_type.to_string(),
                base_data,
            },
        }
    }
}

/// Custom dimensions are strings; `null` properties are dropped
fn string_properties(event: &LogEvent) -> Map<String, Value> {
    event
        .properties
        .iter()
        .filter(|(_, value)| !value.is_null())
        .map(|(name, value)| (name.clone(), Value::String(render_value(value))))
        .collect()
}

fn tags(event: &LogEvent) -> BTreeMap<String, String> {
    let mut tags = BTreeMap::from([("ai.internal.sdkVersion".to_string(), SDK_VERSION.to_string())]);
    if let Some(Value::String(application)) = event.property("Application") {
        tags.insert("ai.cloud.role".to_string(), application.clone());
    }
    if let Some(Value::String(build)) = event.property("BuildNumber") {
        tags.insert("ai.application.ver".to_string(), build.clone());
    }
    tags
}
