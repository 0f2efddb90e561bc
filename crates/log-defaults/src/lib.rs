//! # log-defaults
//!
//! The logging setup shared by our web applications, in one call.
//!
//! [`load_default_config`] takes a [`LoggerConfiguration`] and a
//! [`HostingContext`](hosting::HostingContext) and adds:
//!
//! - level settings from the `Logging` configuration section
//! - the log context and exception detail enrichers
//! - `Application`, `Environment` and (optionally) `BuildNumber` properties
//! - a SQL Server sink writing to the `Logs` table, a colourised console
//!   sink, and an Application Insights sink, each behind a switch in
//!   [`DefaultLogOptions`]
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use log_defaults::prelude::*;
//!
//! fn main() -> LogResult<()> {
//!     let hosting = HostingContext::from_env(
//!         MemoryConfiguration::new().with_env_vars("APP_"),
//!     );
//!     let options = DefaultLogOptions::new("orders-api").with_sql_server(false);
//!
//!     let _guard = LoggerConfiguration::new()
//!         .load_default_config(&hosting, &options)?
//!         .init()?;
//!
//!     info!(port = 8080, "Server starting");
//!     Ok(())
//! }
//! ```
//!
//! ## Features
//!
//! - `mssql` (default): SQL Server driver on `tiberius`. Without it, pass a
//!   [`SqlConnector`](sink::mssql::SqlConnector) through
//!   [`StandardSinks::with_sql_connector`] and use
//!   [`load_default_config_with`]; otherwise the SQL Server sink cannot store
//!   events and a warning is logged when it is registered.
//! - `http` (default): Application Insights transport on `reqwest`.
//! - `log-compat`: forward `log` records into the pipeline.
//!
//! Sinks deliver batches on their own worker threads, so flushing (and
//! dropping the [`LoggerGuard`]) is fine inside an async runtime.
//!
//! Failures inside sinks never reach the application. Turn on the
//! [`selflog`] to see them.

#![forbid(unsafe_code)]
#![warn(missing_docs, rust_2018_idioms)]

pub mod core;
mod defaults;
mod enrich;
pub mod event;
pub mod hosting;
mod layer;
mod macros;
pub mod pipeline;
pub mod selflog;
pub mod sink;

// Public API
pub use crate::core::{ConfigurationError, LogError, LogResult, LogResultExt};
pub use defaults::{
    BUILD_NUMBER_KEY, CONSOLE_OUTPUT_TEMPLATE, DefaultConfigExt, DefaultLogOptions,
    INSTRUMENTATION_KEY, LOGS_CONNECTION, LOGS_TABLE, SQL_BATCH_PERIOD, SQL_BATCH_POSTING_LIMIT,
    default_column_options, load_default_config, load_default_config_with,
};
pub use enrich::{
    EXCEPTION_DETAIL_PROPERTY, ExceptionDetailsEnricher, LogContextEnricher, LogEnricher,
    PropertyEnricher,
};
pub use event::{ExceptionInfo, Level, LogEvent};
pub use layer::CaptureLayer;
pub use layer::context::{LogContext, LogContextGuard};
pub use pipeline::{Logger, LoggerConfiguration, LoggerGuard};
pub use sink::{LogSink, SinkDescriptor, SinkFactory, SinkKind, StandardSinks};

// Re-export tracing macros
pub use tracing::{debug, error, info, trace, warn};

/// Prelude for common imports
pub mod prelude {
    pub use crate::hosting::{Configuration, HostingContext, MemoryConfiguration};
    pub use crate::{
        ConfigurationError, DefaultConfigExt, DefaultLogOptions, Level, LogContext, LogResult,
        LoggerConfiguration, debug, error, info, log_context, trace, warn,
    };

    pub use tracing::{Span, field};
}
