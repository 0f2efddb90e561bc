//! Log sinks
//!
//! - [`console`]: template-rendered lines on stdout/stderr
//! - [`mssql`]: batched inserts into a SQL Server table
//! - [`insights`]: batched Application Insights telemetry
//! - [`batch`]: periodic batching shared by the network sinks

pub mod batch;
pub mod console;
pub mod insights;
pub mod mssql;

use std::sync::Arc;

use crate::core::LogResult;
use crate::event::LogEvent;

use console::{ConsoleSink, ConsoleSinkOptions};
use insights::{ApplicationInsightsSink, TelemetryChannel, TelemetryConfiguration, TelemetryConverter};
use mssql::{MsSqlSink, MsSqlSinkOptions, SqlConnector};

/// Destination for log events
pub trait LogSink: Send + Sync {
    /// What this sink is and how it was configured
    fn descriptor(&self) -> SinkDescriptor;

    /// Kind of sink
    fn kind(&self) -> SinkKind {
        self.descriptor().kind()
    }

    /// Accept one event; must not block on I/O for long
    fn emit(&self, event: &LogEvent);

    /// Deliver buffered events
    fn flush(&self) -> LogResult<()> {
        Ok(())
    }
}

/// Kind of a registered sink
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum SinkKind {
    /// SQL Server table
    MsSqlServer,
    /// Console
    Console,
    /// Application Insights
    ApplicationInsights,
    /// Anything else
    Custom,
}

/// A sink's kind together with the settings it was built from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SinkDescriptor {
    /// SQL Server sink
    MsSqlServer(MsSqlSinkOptions),
    /// Console sink
    Console(ConsoleSinkOptions),
    /// Application Insights sink
    ApplicationInsights {
        /// Target configuration
        telemetry: TelemetryConfiguration,
        /// Event conversion
        converter: TelemetryConverter,
    },
    /// Sink defined outside this crate
    Custom {
        /// Display name
        name: String,
    },
}

impl SinkDescriptor {
    /// Kind of the described sink
    pub const fn kind(&self) -> SinkKind {
        match self {
            Self::MsSqlServer(_) => SinkKind::MsSqlServer,
            Self::Console(_) => SinkKind::Console,
            Self::ApplicationInsights { .. } => SinkKind::ApplicationInsights,
            Self::Custom { .. } => SinkKind::Custom,
        }
    }
}

/// Builds the sinks registered by
/// [`load_default_config_with`](crate::load_default_config_with)
pub trait SinkFactory {
    /// SQL Server sink
    fn mssql(&self, options: MsSqlSinkOptions) -> Box<dyn LogSink>;

    /// Console sink
    fn console(&self, options: ConsoleSinkOptions) -> Box<dyn LogSink>;

    /// Application Insights sink
    fn application_insights(
        &self,
        telemetry: TelemetryConfiguration,
        converter: TelemetryConverter,
    ) -> Box<dyn LogSink>;

    /// Whether SQL Server sinks from this factory can reach a database
    fn sql_driver_available(&self) -> bool {
        true
    }
}

/// The sinks shipped with this crate
///
/// SQL Server uses [`TiberiusConnector`](mssql::TiberiusConnector) when the
/// `mssql` feature is on. Without that feature a [`SqlConnector`] must be
/// supplied, or every batch fails and is reported to the self log. Telemetry
/// uses the HTTP channel unless another one is supplied.
#[derive(Clone, Default)]
pub struct StandardSinks {
    sql_connector: Option<Arc<dyn SqlConnector>>,
    telemetry_channel: Option<Arc<dyn TelemetryChannel>>,
}

impl StandardSinks {
    /// Factory with the default SQL connector and telemetry channel
    pub fn new() -> Self {
        Self::default()
    }

    /// Use a SQL Server driver
    #[must_use]
    pub fn with_sql_connector(mut self, connector: Arc<dyn SqlConnector>) -> Self {
        self.sql_connector = Some(connector);
        self
    }

    /// Use a custom telemetry transport
    #[must_use]
    pub fn with_telemetry_channel(mut self, channel: Arc<dyn TelemetryChannel>) -> Self {
        self.telemetry_channel = Some(channel);
        self
    }

    fn sql_connector(&self) -> Option<Arc<dyn SqlConnector>> {
        #[cfg(feature = "mssql")]
        {
            Some(
                self.sql_connector
                    .clone()
                    .unwrap_or_else(|| Arc::new(mssql::TiberiusConnector)),
            )
        }
        #[cfg(not(feature = "mssql"))]
        {
            self.sql_connector.clone()
        }
    }

    fn default_channel() -> Arc<dyn TelemetryChannel> {
        #[cfg(feature = "http")]
        {
            Arc::new(insights::HttpTelemetryChannel::default())
        }
        #[cfg(not(feature = "http"))]
        {
            Arc::new(insights::UnavailableChannel)
        }
    }
}

impl SinkFactory for StandardSinks {
    fn mssql(&self, options: MsSqlSinkOptions) -> Box<dyn LogSink> {
        Box::new(MsSqlSink::new(options, self.sql_connector()))
    }

    fn console(&self, options: ConsoleSinkOptions) -> Box<dyn LogSink> {
        Box::new(ConsoleSink::new(options))
    }

    fn application_insights(
        &self,
        telemetry: TelemetryConfiguration,
        converter: TelemetryConverter,
    ) -> Box<dyn LogSink> {
        let channel = self
            .telemetry_channel
            .clone()
            .unwrap_or_else(Self::default_channel);
        Box::new(ApplicationInsightsSink::new(telemetry, converter, channel))
    }

    fn sql_driver_available(&self) -> bool {
        self.sql_connector().is_some()
    }
}

impl std::fmt::Debug for StandardSinks {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StandardSinks")
            .field("sql_connector", &self.sql_connector.is_some())
            .field("telemetry_channel", &self.telemetry_channel.is_some())
            .finish()
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use std::sync::Arc;

    use parking_lot::Mutex;

    use super::{LogSink, SinkDescriptor};
    use crate::event::LogEvent;

    /// Keeps every event it receives
    pub(crate) struct RecordingSink {
        events: Arc<Mutex<Vec<LogEvent>>>,
    }

    impl RecordingSink {
        pub(crate) fn new() -> (Self, Arc<Mutex<Vec<LogEvent>>>) {
            let events = Arc::new(Mutex::new(Vec::new()));
            (
                Self {
                    events: Arc::clone(&events),
                },
                events,
            )
        }
    }

    impl LogSink for RecordingSink {
        fn descriptor(&self) -> SinkDescriptor {
            SinkDescriptor::Custom {
                name: "recording".to_string(),
            }
        }

        fn emit(&self, event: &LogEvent) {
            self.events.lock().push(event.clone());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_standard_sinks_build_each_kind() {
        let factory = StandardSinks::new();

        let mssql = factory.mssql(MsSqlSinkOptions::new("Server=x;", "Logs"));
        let console = factory.console(ConsoleSinkOptions::default());
        let insights = factory.application_insights(
            TelemetryConfiguration::create_default(),
            TelemetryConverter::Traces,
        );

        assert_eq!(mssql.kind(), SinkKind::MsSqlServer);
        assert_eq!(console.kind(), SinkKind::Console);
        assert_eq!(insights.kind(), SinkKind::ApplicationInsights);
    }

    struct RefusingConnector;

    impl SqlConnector for RefusingConnector {
        fn connect(&self, _connection_string: &str) -> LogResult<Box<dyn mssql::SqlExecutor>> {
            Err(crate::core::LogError::sink("mssql", "refused"))
        }
    }

    #[test]
    fn test_sql_driver_available() {
        assert_eq!(
            StandardSinks::new().sql_driver_available(),
            cfg!(feature = "mssql")
        );
        let sinks = StandardSinks::new().with_sql_connector(Arc::new(RefusingConnector));
        assert!(sinks.sql_driver_available());
    }

    #[test]
    fn test_descriptor_kind() {
        let descriptor = SinkDescriptor::Custom {
            name: "file".to_string(),
        };
        assert_eq!(descriptor.kind(), SinkKind::Custom);
    }
}
