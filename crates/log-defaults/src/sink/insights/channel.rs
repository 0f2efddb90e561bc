//! Telemetry transport

use super::Envelope;
use crate::core::{LogError, LogResult};

/// Delivers envelopes to an ingestion endpoint
pub trait TelemetryChannel: Send + Sync {
    /// Send one batch
    fn send(&self, endpoint: &str, envelopes: &[Envelope]) -> LogResult<()>;

    /// Drop any open connections; called from the thread that sent
    fn close(&self) {}
}

/// Channel used when the crate is built without the `http` feature
#[derive(Debug, Clone, Copy, Default)]
pub struct UnavailableChannel;

impl TelemetryChannel for UnavailableChannel {
    fn send(&self, _endpoint: &str, _envelopes: &[Envelope]) -> LogResult<()> {
        Err(LogError::sink(
            super::SINK_NAME,
            "no telemetry channel available (enable the `http` feature)",
        ))
    }
}

#[cfg(feature = "http")]
pub use http::HttpTelemetryChannel;

#[cfg(feature = "http")]
mod http {
    use std::time::Duration;

    use parking_lot::Mutex;
    use reqwest::blocking::Client;

    use super::{Envelope, TelemetryChannel};
    use crate::core::{LogResult, LogResultExt};
    use crate::sink::insights::SINK_NAME;

    const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

    /// Posts batches as a JSON array with a blocking `reqwest` client
    ///
    /// The client is built on the first send. Sends only happen on the sink's
    /// worker thread, never on the thread that flushes.
    #[derive(Debug)]
    pub struct HttpTelemetryChannel {
        timeout: Duration,
        client: Mutex<Option<Client>>,
    }

    impl Default for HttpTelemetryChannel {
        fn default() -> Self {
            Self::new(DEFAULT_TIMEOUT)
        }
    }

    impl HttpTelemetryChannel {
        /// Create a channel with a request timeout
        pub const fn new(timeout: Duration) -> Self {
            Self {
                timeout,
                client: Mutex::new(None),
            }
        }

        fn client(&self) -> LogResult<Client> {
            let mut client = self.client.lock();
            if let Some(client) = client.as_ref() {
                return Ok(client.clone());
            }
            let built = Client::builder()
                .timeout(self.timeout)
                .build()
                .with_sink_context(SINK_NAME, || "building HTTP client")?;
            *client = Some(built.clone());
            Ok(built)
        }
    }

    impl TelemetryChannel for HttpTelemetryChannel {
        fn send(&self, endpoint: &str, envelopes: &[Envelope]) -> LogResult<()> {
            if envelopes.is_empty() {
                return Ok(());
            }
            self.client()?
                .post(endpoint)
                .json(envelopes)
                .send()
                .and_then(reqwest::blocking::Response::error_for_status)
                .with_sink_context(SINK_NAME, || format!("posting {} items", envelopes.len()))?;
            Ok(())
        }

        fn close(&self) {
            self.client.lock().take();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unavailable_channel_fails() {
        let error = UnavailableChannel.send("https://example.invalid", &[]).unwrap_err();
        assert!(error.to_string().contains("no telemetry channel"));
    }
}
