//! Application Insights sink
//!
//! Events are converted into ingestion envelopes and sent in batches
//! through a [`TelemetryChannel`].

mod channel;
mod envelope;

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};

#[cfg(feature = "http")]
pub use channel::HttpTelemetryChannel;
pub use channel::{TelemetryChannel, UnavailableChannel};
pub use envelope::{Envelope, EnvelopeData, TelemetryConverter, severity_level};

use super::batch::{BatchedSink, BatchingOptions, PeriodicBatcher};
use super::{LogSink, SinkDescriptor};
use crate::core::LogResult;
use crate::event::LogEvent;

const SINK_NAME: &str = "insights";

/// Public ingestion endpoint
pub const DEFAULT_INGESTION_ENDPOINT: &str = "https://dc.services.visualstudio.com/v2/track";

/// Where telemetry goes and under which key
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TelemetryConfiguration {
    /// Instrumentation key of the target resource
    pub instrumentation_key: String,
    /// Ingestion endpoint URL
    pub ingestion_endpoint: String,
    /// Drop telemetry instead of sending it
    pub disable_telemetry: bool,
}

impl Default for TelemetryConfiguration {
    fn default() -> Self {
        Self::create_default()
    }
}

impl TelemetryConfiguration {
    /// Configuration for the public endpoint with no key set
    pub fn create_default() -> Self {
        Self {
            instrumentation_key: String::new(),
            ingestion_endpoint: DEFAULT_INGESTION_ENDPOINT.to_string(),
            disable_telemetry: false,
        }
    }

    /// Set the instrumentation key
    #[must_use]
    pub fn with_instrumentation_key(mut self, key: impl Into<String>) -> Self {
        self.instrumentation_key = key.into();
        self
    }

    /// Send to a different endpoint
    #[must_use]
    pub fn with_ingestion_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.ingestion_endpoint = endpoint.into();
        self
    }
}

/// Batching used by [`ApplicationInsightsSink`]: 500 events or 30 seconds
pub fn default_batching() -> BatchingOptions {
    BatchingOptions::new(500, Duration::from_secs(30))
}

struct InsightsWriter {
    telemetry: TelemetryConfiguration,
    converter: TelemetryConverter,
    channel: Arc<dyn TelemetryChannel>,
}

impl BatchedSink for InsightsWriter {
    fn name(&self) -> &'static str {
        SINK_NAME
    }

    fn emit_batch(&self, events: &[LogEvent]) -> LogResult<()> {
        if self.telemetry.disable_telemetry {
            return Ok(());
        }
        let envelopes: Vec<Envelope> = events
            .iter()
            .map(|event| self.converter.convert(event, &self.telemetry))
            .collect();
        self.channel
            .send(&self.telemetry.ingestion_endpoint, &envelopes)
    }

    fn close(&self) {
        self.channel.close();
    }
}

/// Sends events to Application Insights
pub struct ApplicationInsightsSink {
    batcher: PeriodicBatcher<InsightsWriter>,
}

impl ApplicationInsightsSink {
    /// Create a sink with [`default_batching`]
    pub fn new(
        telemetry: TelemetryConfiguration,
        converter: TelemetryConverter,
        channel: Arc<dyn TelemetryChannel>,
    ) -> Self {
        Self::with_batching(telemetry, converter, channel, default_batching())
    }

    /// Create a sink with custom batching
    pub fn with_batching(
        telemetry: TelemetryConfiguration,
        converter: TelemetryConverter,
        channel: Arc<dyn TelemetryChannel>,
        batching: BatchingOptions,
    ) -> Self {
        let writer = InsightsWriter {
            telemetry,
            converter,
            channel,
        };
        Self {
            batcher: PeriodicBatcher::new(writer, batching),
        }
    }

    /// Target configuration
    pub fn telemetry(&self) -> &TelemetryConfiguration {
        &self.batcher.target().telemetry
    }

    /// Event conversion
    pub fn converter(&self) -> TelemetryConverter {
        self.batcher.target().converter
    }
}

impl LogSink for ApplicationInsightsSink {
    fn descriptor(&self) -> SinkDescriptor {
        SinkDescriptor::ApplicationInsights {
            telemetry: self.telemetry().clone(),
            converter: self.converter(),
        }
    }

    fn emit(&self, event: &LogEvent) {
        self.batcher.enqueue(event.clone());
    }

    fn flush(&self) -> LogResult<()> {
        self.batcher.flush()
    }
}

impl fmt::Debug for ApplicationInsightsSink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ApplicationInsightsSink")
            .field("telemetry", self.telemetry())
            .field("converter", &self.converter())
            .field("batching", self.batcher.options())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::Level;
    use parking_lot::Mutex;

    #[derive(Default)]
    struct RecordingChannel {
        sent: Mutex<Vec<(String, Vec<Envelope>)>>,
        inside_runtime: Mutex<Vec<bool>>,
    }

    impl TelemetryChannel for RecordingChannel {
        fn send(&self, endpoint: &str, envelopes: &[Envelope]) -> LogResult<()> {
            self.sent.lock().push((endpoint.to_string(), envelopes.to_vec()));
            self.inside_runtime
                .lock()
                .push(tokio::runtime::Handle::try_current().is_ok());
            Ok(())
        }
    }

    fn sink(channel: &Arc<RecordingChannel>, telemetry: TelemetryConfiguration) -> ApplicationInsightsSink {
        ApplicationInsightsSink::new(
            telemetry,
            TelemetryConverter::Traces,
            Arc::clone(channel) as Arc<dyn TelemetryChannel>,
        )
    }

    #[test]
    fn test_default_configuration() {
        let telemetry = TelemetryConfiguration::create_default().with_instrumentation_key("key");
        assert_eq!(telemetry.ingestion_endpoint, DEFAULT_INGESTION_ENDPOINT);
        assert_eq!(telemetry.instrumentation_key, "key");
        assert!(!telemetry.disable_telemetry);
    }

    #[test]
    fn test_flush_sends_converted_batch() {
        let channel = Arc::new(RecordingChannel::default());
        let sink = sink(
            &channel,
            TelemetryConfiguration::create_default().with_instrumentation_key("key"),
        );

        sink.emit(&LogEvent::new(Level::Info, "one"));
        sink.emit(&LogEvent::new(Level::Error, "two"));
        sink.flush().unwrap();

        let sent = channel.sent.lock();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].0, DEFAULT_INGESTION_ENDPOINT);
        assert_eq!(sent[0].1.len(), 2);
        assert_eq!(sent[0].1[1].data.base_data["severityLevel"], 3);
    }

    #[test]
    fn test_disabled_telemetry_is_dropped() {
        let channel = Arc::new(RecordingChannel::default());
        let mut telemetry = TelemetryConfiguration::create_default();
        telemetry.disable_telemetry = true;
        let sink = sink(&channel, telemetry);

        sink.emit(&LogEvent::new(Level::Info, "one"));
        sink.flush().unwrap();

        assert!(channel.sent.lock().is_empty());
    }

    #[test]
    fn test_descriptor_and_batching() {
        let channel = Arc::new(RecordingChannel::default());
        let sink = sink(&channel, TelemetryConfiguration::create_default());

        assert_eq!(sink.kind(), crate::sink::SinkKind::ApplicationInsights);
        assert_eq!(sink.batcher.options().batch_size_limit, 500);
        assert_eq!(sink.batcher.options().period, Duration::from_secs(30));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_flush_inside_runtime_sends_from_worker() {
        let channel = Arc::new(RecordingChannel::default());
        let sink = sink(
            &channel,
            TelemetryConfiguration::create_default().with_instrumentation_key("key"),
        );

        sink.emit(&LogEvent::new(Level::Info, "shutting down"));
        sink.flush().unwrap();
        drop(sink);

        assert_eq!(*channel.inside_runtime.lock(), [false]);
    }

    #[cfg(feature = "http")]
    #[tokio::test(flavor = "multi_thread")]
    async fn test_http_channel_flush_inside_runtime_returns_error() {
        let channel: Arc<dyn TelemetryChannel> =
            Arc::new(HttpTelemetryChannel::new(Duration::from_secs(2)));
        let sink = ApplicationInsightsSink::new(
            TelemetryConfiguration::create_default()
                .with_instrumentation_key("key")
                .with_ingestion_endpoint("http://127.0.0.1:9/v2/track"),
            TelemetryConverter::Traces,
            channel,
        );

        sink.emit(&LogEvent::new(Level::Info, "shutting down"));
        let error = sink.flush().unwrap_err();
        drop(sink);

        assert!(error.to_string().contains("posting 1 items"));
    }
}
