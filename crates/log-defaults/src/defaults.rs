//! Default logging configuration for web applications
//!
//! [`load_default_config`] turns an empty [`LoggerConfiguration`] into the
//! standard pipeline: settings from the `Logging` section, the context and
//! exception enrichers, `Application`/`Environment`/`BuildNumber`
//! properties, and any of the SQL Server, console and Application Insights
//! sinks.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::core::ConfigurationError;
use crate::hosting::HostingContext;
use crate::pipeline::LoggerConfiguration;
use crate::sink::batch::BatchingOptions;
use crate::sink::console::{ConsoleSinkOptions, ConsoleTheme};
use crate::sink::insights::{TelemetryConfiguration, TelemetryConverter};
use crate::sink::mssql::{ColumnOptions, MsSqlSinkOptions, SqlColumn, SqlDataType, StandardColumn};
use crate::sink::{SinkFactory, StandardSinks};

/// Connection string holding the log database
pub const LOGS_CONNECTION: &str = "LogsConnection";

/// Configuration key read into the `BuildNumber` property
pub const BUILD_NUMBER_KEY: &str = "BuildNumber";

/// Configuration key holding the Application Insights instrumentation key
pub const INSTRUMENTATION_KEY: &str = "ApplicationInsights:InstrumentationKey";

/// Log table name
pub const LOGS_TABLE: &str = "Logs";

/// Console output template
pub const CONSOLE_OUTPUT_TEMPLATE: &str =
    "[{Timestamp:HH:mm:ss.fff} {ThreadId} {EventType:x8} {Level:u3}] {Message}{NewLine}{Exception}";

/// Events per SQL Server batch
pub const SQL_BATCH_POSTING_LIMIT: usize = 50;

/// Longest wait between SQL Server batches
pub const SQL_BATCH_PERIOD: Duration = Duration::from_secs(5);

/// What [`load_default_config`] sets up
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DefaultLogOptions {
    /// Value of the `Application` property
    pub application_name: String,
    /// Attach the `BuildNumber` configuration value
    pub enrich_with_build_number: bool,
    /// Write to SQL Server (needs the `LogsConnection` connection string)
    pub use_sql_server: bool,
    /// Write to the console
    pub use_console: bool,
    /// Send to Application Insights (needs
    /// `ApplicationInsights:InstrumentationKey`)
    pub use_application_insights: bool,
}

impl Default for DefaultLogOptions {
    fn default() -> Self {
        Self {
            application_name: String::new(),
            enrich_with_build_number: true,
            use_sql_server: true,
            use_console: true,
            use_application_insights: false,
        }
    }
}

impl DefaultLogOptions {
    /// Defaults for the named application
    pub fn new(application_name: impl Into<String>) -> Self {
        Self {
            application_name: application_name.into(),
            ..Self::default()
        }
    }

    /// Set whether `BuildNumber` is attached
    #[must_use]
    pub const fn with_build_number(mut self, enabled: bool) -> Self {
        self.enrich_with_build_number = enabled;
        self
    }

    /// Set whether the SQL Server sink is registered
    #[must_use]
    pub const fn with_sql_server(mut self, enabled: bool) -> Self {
        self.use_sql_server = enabled;
        self
    }

    /// Set whether the console sink is registered
    #[must_use]
    pub const fn with_console(mut self, enabled: bool) -> Self {
        self.use_console = enabled;
        self
    }

    /// Set whether the Application Insights sink is registered
    #[must_use]
    pub const fn with_application_insights(mut self, enabled: bool) -> Self {
        self.use_application_insights = enabled;
        self
    }
}

/// Table layout of the SQL Server sink
///
/// Standard columns plus `Application` (indexed), `Environment`,
/// `BuildNumber` and `RequestPath`; the event is stored as JSON instead of
/// XML properties, the level column is `Severity`, and `Id` is a
/// non-clustered primary key.
pub fn default_column_options() -> ColumnOptions {
    let mut columns = ColumnOptions {
        clustered_columnstore_index: false,
        disable_triggers: true,
        additional_columns: vec![
            SqlColumn::new("Application", SqlDataType::VarChar, true, Some(50))
                .with_non_clustered_index(),
            SqlColumn::new("Environment", SqlDataType::VarChar, true, Some(50)),
            SqlColumn::new("BuildNumber", SqlDataType::VarChar, true, Some(50)),
            SqlColumn::new("RequestPath", SqlDataType::VarChar, true, Some(255)),
        ],
        ..ColumnOptions::default()
    };
    columns.store(StandardColumn::LogEvent);
    columns.remove(StandardColumn::Properties);
    columns.primary_key = Some(columns.id.column_name.clone());
    columns.id.non_clustered_index = true;
    columns.level.column_name = "Severity".to_string();
    columns.level.data_length = Some(15);
    columns
}

/// Apply the default configuration using the sinks shipped with this crate
///
/// ```rust
/// use log_defaults::hosting::{HostingContext, MemoryConfiguration};
/// use log_defaults::{DefaultLogOptions, LoggerConfiguration, load_default_config};
///
/// let hosting = HostingContext::new(MemoryConfiguration::new(), "Development");
/// let options = DefaultLogOptions::new("orders-api").with_sql_server(false);
///
/// let config = load_default_config(LoggerConfiguration::new(), &hosting, &options)?;
/// assert_eq!(
///     config.enricher_names(),
///     ["LogContext", "ExceptionDetails", "Application", "Environment", "BuildNumber"]
/// );
/// # Ok::<(), log_defaults::ConfigurationError>(())
/// ```
///
/// # Errors
///
/// See [`load_default_config_with`]
pub fn load_default_config(
    config: LoggerConfiguration,
    hosting: &HostingContext,
    options: &DefaultLogOptions,
) -> Result<LoggerConfiguration, ConfigurationError> {
    load_default_config_with(config, hosting, options, &StandardSinks::new())
}

/// Apply the default configuration, building sinks with `sinks`
///
/// # Errors
///
/// - [`ConfigurationError::MissingConnectionString`] when `use_sql_server` is
///   set and `LogsConnection` is absent or empty
/// - [`ConfigurationError::MissingSetting`] when `use_application_insights`
///   is set and `ApplicationInsights:InstrumentationKey` is absent or empty
pub fn load_default_config_with(
    config: LoggerConfiguration,
    hosting: &HostingContext,
    options: &DefaultLogOptions,
    sinks: &dyn SinkFactory,
) -> Result<LoggerConfiguration, ConfigurationError> {
    let configuration = hosting.configuration();

    let mut config = config
        .read_from(configuration)
        .enrich_from_log_context()
        .enrich_with_exception_details()
        .enrich_with_property("Application", options.application_name.as_str())
        .enrich_with_property("Environment", hosting.environment_name());

    if options.enrich_with_build_number {
        // A missing build number is tolerated and shows up as null
        let build_number = configuration.get(BUILD_NUMBER_KEY);
        config = config.enrich_with_property("BuildNumber", build_number);
    }

    if options.use_sql_server {
        let connection_string = configuration
            .connection_string(LOGS_CONNECTION)
            .filter(|value| !value.is_empty())
            .ok_or_else(|| ConfigurationError::MissingConnectionString {
                name: LOGS_CONNECTION.to_string(),
            })?;

        let sink_options = MsSqlSinkOptions::new(connection_string, LOGS_TABLE)
            .with_column_options(default_column_options())
            .with_auto_create_sql_table(true)
            .with_batching(BatchingOptions::new(SQL_BATCH_POSTING_LIMIT, SQL_BATCH_PERIOD));

        if !sinks.sql_driver_available() {
            tracing::warn!(
                table = LOGS_TABLE,
                "SQL Server sink registered without a driver, events will not be stored"
            );
        }
        tracing::debug!(
            table = LOGS_TABLE,
            batch_posting_limit = SQL_BATCH_POSTING_LIMIT,
            "SQL Server sink registered"
        );
        config = config.write_to_boxed(sinks.mssql(sink_options));
    }

    if options.use_console {
        let sink_options = ConsoleSinkOptions::default()
            .with_output_template(CONSOLE_OUTPUT_TEMPLATE)
            .with_theme(ConsoleTheme::Code);

        tracing::debug!("console sink registered");
        config = config.write_to_boxed(sinks.console(sink_options));
    }

    if options.use_application_insights {
        let instrumentation_key = configuration
            .get(INSTRUMENTATION_KEY)
            .filter(|value| !value.is_empty())
            .ok_or_else(|| ConfigurationError::MissingSetting {
                key: INSTRUMENTATION_KEY.to_string(),
            })?;

        let telemetry =
            TelemetryConfiguration::create_default().with_instrumentation_key(instrumentation_key);

        tracing::debug!(
            endpoint = %telemetry.ingestion_endpoint,
            "Application Insights sink registered"
        );
        config = config.write_to_boxed(
            sinks.application_insights(telemetry, TelemetryConverter::Traces),
        );
    }

    Ok(config)
}

/// Method form of [`load_default_config`] and [`load_default_config_with`]
pub trait DefaultConfigExt: Sized {
    /// See [`load_default_config`]
    ///
    /// # Errors
    ///
    /// See [`load_default_config_with`]
    fn load_default_config(
        self,
        hosting: &HostingContext,
        options: &DefaultLogOptions,
    ) -> Result<LoggerConfiguration, ConfigurationError>;

    /// See [`load_default_config_with`]
    ///
    /// # Errors
    ///
    /// See [`load_default_config_with`]
    fn load_default_config_with(
        self,
        hosting: &HostingContext,
        options: &DefaultLogOptions,
        sinks: &dyn SinkFactory,
    ) -> Result<LoggerConfiguration, ConfigurationError>;
}

impl DefaultConfigExt for LoggerConfiguration {
    fn load_default_config(
        self,
        hosting: &HostingContext,
        options: &DefaultLogOptions,
    ) -> Result<LoggerConfiguration, ConfigurationError> {
        load_default_config(self, hosting, options)
    }

    fn load_default_config_with(
        self,
        hosting: &HostingContext,
        options: &DefaultLogOptions,
        sinks: &dyn SinkFactory,
    ) -> Result<LoggerConfiguration, ConfigurationError> {
        load_default_config_with(self, hosting, options, sinks)
    }
}
