//! Finalized logging pipeline

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use tracing_subscriber::{EnvFilter, Registry, layer::SubscriberExt, util::SubscriberInitExt};

use crate::core::{LogError, LogResult};
use crate::enrich::LogEnricher;
use crate::event::{Level, LogEvent};
use crate::layer::CaptureLayer;
use crate::sink::{LogSink, SinkKind};

/// Minimum level plus per-target overrides
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct LevelSwitch {
    pub(crate) minimum: Level,
    pub(crate) overrides: BTreeMap<String, Level>,
}

impl LevelSwitch {
    /// The most specific override wins: `hyper::client` beats `hyper`
    pub(crate) fn level_for(&self, target: &str) -> Level {
        self.overrides
            .iter()
            .filter(|(prefix, _)| {
                target == prefix.as_str()
                    || target
                        .strip_prefix(prefix.as_str())
                        .is_some_and(|rest| rest.starts_with("::"))
            })
            .max_by_key(|(prefix, _)| prefix.len())
            .map_or(self.minimum, |(_, level)| *level)
    }

    pub(crate) fn is_enabled(&self, level: Level, target: &str) -> bool {
        level >= self.level_for(target)
    }

    /// `EnvFilter` directives equivalent to this switch
    pub(crate) fn directives(&self) -> String {
        std::iter::once(self.minimum.to_string())
            .chain(
                self.overrides
                    .iter()
                    .map(|(target, level)| format!("{target}={level}")),
            )
            .collect::<Vec<_>>()
            .join(",")
    }
}

/// A logger built from a [`LoggerConfiguration`](super::LoggerConfiguration)
///
/// Cheap to clone. Events written here run through the enrichers in
/// registration order and are then handed to every sink.
#[derive(Clone)]
pub struct Logger {
    inner: Arc<Pipeline>,
}

struct Pipeline {
    switch: LevelSwitch,
    enrichers: Vec<Box<dyn LogEnricher>>,
    sinks: Vec<Box<dyn LogSink>>,
}

impl Logger {
    pub(crate) fn new(
        switch: LevelSwitch,
        enrichers: Vec<Box<dyn LogEnricher>>,
        sinks: Vec<Box<dyn LogSink>>,
    ) -> Self {
        Self {
            inner: Arc::new(Pipeline {
                switch,
                enrichers,
                sinks,
            }),
        }
    }

    /// Whether an event at `level` from `target` passes the level settings
    pub fn is_enabled(&self, level: Level, target: &str) -> bool {
        self.inner.switch.is_enabled(level, target)
    }

    /// Enrich an event and hand it to every sink
    ///
    /// Enrichers may overwrite each other; properties set at the call site
    /// take precedence over all of them.
    pub fn write(&self, mut event: LogEvent) {
        if !self.is_enabled(event.level, &event.target) {
            return;
        }

        let call_site = std::mem::take(&mut event.properties);
        for enricher in &self.inner.enrichers {
            enricher.enrich(&mut event);
        }
        event.properties.extend(call_site);

        for sink in &self.inner.sinks {
            sink.emit(&event);
        }
    }

    /// Flush every sink, returning the first failure
    pub fn flush(&self) -> LogResult<()> {
        let mut first_error = None;
        for sink in &self.inner.sinks {
            if let Err(e) = sink.flush() {
                first_error.get_or_insert(e);
            }
        }
        first_error.map_or(Ok(()), Err)
    }

    /// Kinds of the registered sinks, in registration order
    pub fn sink_kinds(&self) -> Vec<SinkKind> {
        self.inner.sinks.iter().map(|sink| sink.kind()).collect()
    }

    /// `tracing` layer that feeds this logger
    pub fn layer(&self) -> CaptureLayer {
        CaptureLayer::new(self.clone())
    }

    /// Install this logger as the global `tracing` subscriber
    ///
    /// # Errors
    ///
    /// Returns error if:
    /// - the level settings do not form a valid filter
    /// - a global subscriber is already installed
    pub fn init(self) -> LogResult<LoggerGuard> {
        let directives = self.inner.switch.directives();
        let filter = EnvFilter::try_new(&directives).map_err(|e| LogError::Filter {
            filter: directives.clone(),
            reason: e.to_string(),
        })?;

        #[cfg(feature = "log-compat")]
        {
            let _ = tracing_log::LogTracer::init();
        }

        Registry::default()
            .with(filter)
            .with(self.layer())
            .try_init()
            .map_err(|e| LogError::Init(e.to_string()))?;

        tracing::debug!(
            filter = %directives,
            sinks = self.inner.sinks.len(),
            "Logger initialized"
        );

        Ok(LoggerGuard { logger: Some(self) })
    }
}

impl fmt::Debug for Logger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Logger")
            .field("switch", &self.inner.switch)
            .field(
                "enrichers",
                &self
                    .inner
                    .enrichers
                    .iter()
                    .map(|enricher| enricher.name())
                    .collect::<Vec<_>>(),
            )
            .field("sinks", &self.sink_kinds())
            .finish()
    }
}

/// Guard that keeps the logger alive
///
/// Dropping the guard flushes every sink. Failures go to the self log.
#[derive(Debug)]
pub struct LoggerGuard {
    logger: Option<Logger>,
}

impl LoggerGuard {
    /// The installed logger
    pub fn logger(&self) -> Option<&Logger> {
        self.logger.as_ref()
    }
}

impl Drop for LoggerGuard {
    fn drop(&mut self) {
        if let Some(logger) = self.logger.take() {
            if let Err(e) = logger.flush() {
                crate::selflog!("flush on shutdown failed: {e}");
            }
        }
    }
}
