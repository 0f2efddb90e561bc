//! Layer that feeds `tracing` events into a [`Logger`]

use std::collections::BTreeMap;
use std::fmt;

use serde_json::Value;
use tracing::field::{Field, Visit};
use tracing::span::{Attributes, Id, Record};
use tracing::{Event, Subscriber};
use tracing_subscriber::layer::{Context, Layer};
use tracing_subscriber::registry::LookupSpan;

use crate::event::{ExceptionInfo, Level, LogEvent, event_type_of};
use crate::pipeline::Logger;

/// Field that carries the rendered message
const MESSAGE_FIELD: &str = "message";

/// Captures `tracing` events and writes them to a [`Logger`]
///
/// - the `message` field becomes [`LogEvent::message`]
/// - the first field recorded as `&dyn Error` becomes the exception
/// - other event fields become call-site properties
/// - fields of the enclosing spans become [`LogEvent::scope`]
#[derive(Clone)]
pub struct CaptureLayer {
    logger: Logger,
}

impl CaptureLayer {
    pub(crate) fn new(logger: Logger) -> Self {
        Self { logger }
    }
}

impl fmt::Debug for CaptureLayer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CaptureLayer").finish_non_exhaustive()
    }
}

/// Span fields stored in the registry's span extensions
#[derive(Debug, Default)]
struct SpanFields(BTreeMap<String, Value>);

impl<S> Layer<S> for CaptureLayer
where
    S: Subscriber + for<'a> LookupSpan<'a>,
{
    fn on_new_span(&self, attrs: &Attributes<'_>, id: &Id, ctx: Context<'_, S>) {
        let Some(span) = ctx.span(id) else {
            return;
        };
        let mut visitor = FieldVisitor::default();
        attrs.record(&mut visitor);
        span.extensions_mut()
            .insert(SpanFields(visitor.into_span_fields()));
    }

    fn on_record(&self, id: &Id, values: &Record<'_>, ctx: Context<'_, S>) {
        let Some(span) = ctx.span(id) else {
            return;
        };
        let mut visitor = FieldVisitor::default();
        values.record(&mut visitor);
        let recorded = visitor.into_span_fields();

        let mut extensions = span.extensions_mut();
        match extensions.get_mut::<SpanFields>() {
            Some(fields) => fields.0.extend(recorded),
            None => extensions.insert(SpanFields(recorded)),
        }
    }

    fn on_event(&self, event: &Event<'_>, ctx: Context<'_, S>) {
        if super::is_suppressed() {
            return;
        }

        let metadata = event.metadata();
        let level = Level::from_tracing(metadata.level());
        if !self.logger.is_enabled(level, metadata.target()) {
            return;
        }

        let mut visitor = FieldVisitor::default();
        event.record(&mut visitor);

        let mut log_event = LogEvent::new(level, visitor.message.take().unwrap_or_default())
            .with_target(metadata.target());
        log_event.event_type = event_type_of(metadata.name());
        log_event.exception = visitor.exception.take();
        log_event.properties = visitor.properties;

        if let Some(scope) = ctx.event_scope(event) {
            for span in scope.from_root() {
                if let Some(fields) = span.extensions().get::<SpanFields>() {
                    log_event
                        .scope
                        .extend(fields.0.iter().map(|(k, v)| (k.clone(), v.clone())));
                }
            }
        }

        self.logger.write(log_event);
    }
}

#[derive(Default)]
struct FieldVisitor {
    message: Option<String>,
    exception: Option<ExceptionInfo>,
    properties: BTreeMap<String, Value>,
}

impl FieldVisitor {
    fn insert(&mut self, field: &Field, value: Value) {
        self.properties.insert(field.name().to_string(), value);
    }

    /// Spans have no message or exception slot; keep everything as fields
    fn into_span_fields(mut self) -> BTreeMap<String, Value> {
        if let Some(message) = self.message.take() {
            self.properties
                .insert(MESSAGE_FIELD.to_string(), Value::String(message));
        }
        if let Some(exception) = self.exception.take() {
            self.properties
                .entry("error".to_string())
                .or_insert(Value::String(exception.to_string()));
        }
        self.properties
    }
}

impl Visit for FieldVisitor {
    fn record_debug(&mut self, field: &Field, value: &dyn fmt::Debug) {
        if field.name() == MESSAGE_FIELD {
            self.message = Some(format!("{value:?}"));
        } else {
            self.insert(field, Value::String(format!("{value:?}")));
        }
    }

    fn record_str(&mut self, field: &Field, value: &str) {
        if field.name() == MESSAGE_FIELD {
            self.message = Some(value.to_string());
        } else {
            self.insert(field, Value::from(value));
        }
    }

    fn record_i64(&mut self, field: &Field, value: i64) {
        self.insert(field, Value::from(value));
    }

    fn record_u64(&mut self, field: &Field, value: u64) {
        self.insert(field, Value::from(value));
    }

    fn record_f64(&mut self, field: &Field, value: f64) {
        self.insert(field, Value::from(value));
    }

    fn record_bool(&mut self, field: &Field, value: bool) {
        self.insert(field, Value::from(value));
    }

    fn record_error(&mut self, field: &Field, value: &(dyn std::error::Error + 'static)) {
        if self.exception.is_none() {
            self.exception = Some(ExceptionInfo::from_error(value));
        } else {
            self.insert(field, Value::String(value.to_string()));
        }
    }
}
