//! SQL Server sink
//!
//! Events are queued by a [`PeriodicBatcher`] and bulk inserted into a log
//! table. The driver sits behind [`SqlConnector`] and [`SqlExecutor`]; the
//! connection is opened on the first batch and reopened after a failure.
//! With the `mssql` feature (on by default) `TiberiusConnector` is the
//! driver.

mod columns;
#[cfg(feature = "mssql")]
mod driver;
mod table;

use std::fmt;
use std::sync::Arc;

use parking_lot::Mutex;

pub use columns::{ColumnOptions, SqlColumn, SqlDataType, StandardColumn};
#[cfg(feature = "mssql")]
pub use driver::TiberiusConnector;
pub use table::{
    SqlValue, create_table_sql, insert_columns, log_event_json, map_event, properties_xml,
    quote_identifier,
};

use super::batch::{BatchedSink, BatchingOptions, PeriodicBatcher};
use super::{LogSink, SinkDescriptor};
use crate::core::{LogError, LogResult, LogResultExt};
use crate::event::LogEvent;

const SINK_NAME: &str = "mssql";

/// Schema used when none is configured
pub const DEFAULT_SCHEMA: &str = "dbo";

/// One bulk insert request
#[derive(Debug)]
pub struct BulkInsert<'a> {
    /// Target schema
    pub schema: &'a str,
    /// Target table
    pub table: &'a str,
    /// Column names, matching the order of every row
    pub columns: Vec<&'a str>,
    /// Row values
    pub rows: Vec<Vec<SqlValue>>,
    /// Whether insert triggers fire
    pub fire_triggers: bool,
}

/// An open connection
pub trait SqlExecutor: Send {
    /// Run a statement that returns no rows
    fn execute(&mut self, sql: &str) -> LogResult<()>;

    /// Insert many rows at once
    fn bulk_insert(&mut self, insert: &BulkInsert<'_>) -> LogResult<()>;
}

/// Opens connections from a connection string
pub trait SqlConnector: Send + Sync {
    /// Open a connection
    fn connect(&self, connection_string: &str) -> LogResult<Box<dyn SqlExecutor>>;
}

/// SQL Server sink settings
#[derive(Clone, PartialEq, Eq)]
pub struct MsSqlSinkOptions {
    /// Connection string passed to the [`SqlConnector`]
    pub connection_string: String,
    /// Log table name
    pub table_name: String,
    /// Log table schema
    pub schema_name: String,
    /// Create the table on the first batch if it is missing
    pub auto_create_sql_table: bool,
    /// Batch size and period
    pub batching: BatchingOptions,
    /// Table layout
    pub column_options: ColumnOptions,
}

impl MsSqlSinkOptions {
    /// Create options for a table in the default schema
    pub fn new(connection_string: impl Into<String>, table_name: impl Into<String>) -> Self {
        Self {
            connection_string: connection_string.into(),
            table_name: table_name.into(),
            schema_name: DEFAULT_SCHEMA.to_string(),
            auto_create_sql_table: false,
            batching: BatchingOptions::default(),
            column_options: ColumnOptions::default(),
        }
    }

    /// Create the table if it is missing
    #[must_use]
    pub const fn with_auto_create_sql_table(mut self, enabled: bool) -> Self {
        self.auto_create_sql_table = enabled;
        self
    }

    /// Set batch size and period
    #[must_use]
    pub const fn with_batching(mut self, batching: BatchingOptions) -> Self {
        self.batching = batching;
        self
    }

    /// Set the table layout
    #[must_use]
    pub fn with_column_options(mut self, column_options: ColumnOptions) -> Self {
        self.column_options = column_options;
        self
    }

    /// Set the schema
    #[must_use]
    pub fn with_schema_name(mut self, schema_name: impl Into<String>) -> Self {
        self.schema_name = schema_name.into();
        self
    }
}

impl fmt::Debug for MsSqlSinkOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MsSqlSinkOptions")
            .field("connection_string", &"<redacted>")
            .field("table_name", &self.table_name)
            .field("schema_name", &self.schema_name)
            .field("auto_create_sql_table", &self.auto_create_sql_table)
            .field("batching", &self.batching)
            .field("column_options", &self.column_options)
            .finish()
    }
}

struct MsSqlWriter {
    options: MsSqlSinkOptions,
    connector: Option<Arc<dyn SqlConnector>>,
    state: Mutex<WriterState>,
}

#[derive(Default)]
struct WriterState {
    executor: Option<Box<dyn SqlExecutor>>,
    table_ready: bool,
}

impl MsSqlWriter {
    fn write_batch(
        &self,
        executor: &mut dyn SqlExecutor,
        table_ready: &mut bool,
        events: &[LogEvent],
    ) -> LogResult<()> {
        let options = &self.options;
        let columns = &options.column_options;

        if options.auto_create_sql_table && !*table_ready {
            let ddl = create_table_sql(&options.schema_name, &options.table_name, columns);
            executor.execute(&ddl).with_sink_context(SINK_NAME, || {
                format!("creating table {}", quote_identifier(&options.table_name))
            })?;
            *table_ready = true;
        }

        let insert = BulkInsert {
            schema: &options.schema_name,
            table: &options.table_name,
            columns: insert_columns(columns)
                .into_iter()
                .map(|column| column.column_name.as_str())
                .collect(),
            rows: events.iter().map(|event| map_event(event, columns)).collect(),
            fire_triggers: !columns.disable_triggers,
        };
        executor.bulk_insert(&insert)
    }
}

impl BatchedSink for MsSqlWriter {
    fn name(&self) -> &'static str {
        SINK_NAME
    }

    fn emit_batch(&self, events: &[LogEvent]) -> LogResult<()> {
        let connector = self
            .connector
            .as_ref()
            .ok_or_else(|| LogError::sink(SINK_NAME, "no SQL Server connector configured"))?;

        let mut state = self.state.lock();
        let mut executor = match state.executor.take() {
            Some(executor) => executor,
            None => connector.connect(&self.options.connection_string)?,
        };

        let result = self.write_batch(executor.as_mut(), &mut state.table_ready, events);
        // Reconnect on the next batch after a failure
        if result.is_ok() {
            state.executor = Some(executor);
        }
        result
    }

    fn close(&self) {
        self.state.lock().executor.take();
    }
}

/// Writes events to a SQL Server table in batches
pub struct MsSqlSink {
    batcher: PeriodicBatcher<MsSqlWriter>,
}

impl MsSqlSink {
    /// Create a sink; without a connector every batch fails and is reported
    /// to the self log
    pub fn new(options: MsSqlSinkOptions, connector: Option<Arc<dyn SqlConnector>>) -> Self {
        let batching = options.batching;
        let writer = MsSqlWriter {
            options,
            connector,
            state: Mutex::new(WriterState::default()),
        };
        Self {
            batcher: PeriodicBatcher::new(writer, batching),
        }
    }

    /// Sink settings
    pub fn options(&self) -> &MsSqlSinkOptions {
        &self.batcher.target().options
    }
}

impl LogSink for MsSqlSink {
    fn descriptor(&self) -> SinkDescriptor {
        SinkDescriptor::MsSqlServer(self.options().clone())
    }

    fn emit(&self, event: &LogEvent) {
        self.batcher.enqueue(event.clone());
    }

    fn flush(&self) -> LogResult<()> {
        self.batcher.flush()
    }
}

impl fmt::Debug for MsSqlSink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MsSqlSink")
            .field("options", self.options())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::Level;
    use std::time::Duration;

    #[derive(Debug, Default)]
    struct Recorded {
        connects: usize,
        statements: Vec<String>,
        inserts: Vec<(Vec<String>, usize, bool)>,
        fail_inserts: bool,
    }

    #[derive(Clone, Default)]
    struct FakeConnector(Arc<Mutex<Recorded>>);

    struct FakeExecutor(Arc<Mutex<Recorded>>);

    impl SqlConnector for FakeConnector {
        fn connect(&self, connection_string: &str) -> LogResult<Box<dyn SqlExecutor>> {
            assert_eq!(connection_string, "Server=x;Database=y;");
            self.0.lock().connects += 1;
            Ok(Box::new(FakeExecutor(Arc::clone(&self.0))))
        }
    }

    impl SqlExecutor for FakeExecutor {
        fn execute(&mut self, sql: &str) -> LogResult<()> {
            self.0.lock().statements.push(sql.to_string());
            Ok(())
        }

        fn bulk_insert(&mut self, insert: &BulkInsert<'_>) -> LogResult<()> {
            let mut recorded = self.0.lock();
            if recorded.fail_inserts {
                return Err(LogError::sink(SINK_NAME, "deadlock victim"));
            }
            recorded.inserts.push((
                insert.columns.iter().map(ToString::to_string).collect(),
                insert.rows.len(),
                insert.fire_triggers,
            ));
            Ok(())
        }
    }

    fn options() -> MsSqlSinkOptions {
        MsSqlSinkOptions::new("Server=x;Database=y;", "Logs")
            .with_auto_create_sql_table(true)
            .with_batching(BatchingOptions::new(50, Duration::from_secs(3600)))
    }

    #[test]
    fn test_flush_creates_table_once_and_inserts() {
        let connector = FakeConnector::default();
        let sink = MsSqlSink::new(options(), Some(Arc::new(connector.clone())));

        sink.emit(&LogEvent::new(Level::Info, "one"));
        sink.emit(&LogEvent::new(Level::Info, "two"));
        sink.flush().unwrap();
        sink.emit(&LogEvent::new(Level::Info, "three"));
        sink.flush().unwrap();

        let recorded = connector.0.lock();
        assert_eq!(recorded.connects, 1);
        assert_eq!(recorded.statements.len(), 1);
        assert!(recorded.statements[0].contains("CREATE TABLE [dbo].[Logs]"));
        let rows: usize = recorded.inserts.iter().map(|(_, rows, _)| rows).sum();
        assert_eq!(rows, 3);
        assert_eq!(recorded.inserts[0].0[0], "Message");
        assert!(recorded.inserts[0].2);
    }

    #[test]
    fn test_failed_insert_reconnects() {
        let connector = FakeConnector::default();
        connector.0.lock().fail_inserts = true;
        let sink = MsSqlSink::new(options(), Some(Arc::new(connector.clone())));

        sink.emit(&LogEvent::new(Level::Info, "one"));
        assert!(sink.flush().is_err());

        connector.0.lock().fail_inserts = false;
        sink.emit(&LogEvent::new(Level::Info, "two"));
        sink.flush().unwrap();

        assert_eq!(connector.0.lock().connects, 2);
    }

    #[test]
    fn test_missing_connector_fails_batches() {
        let sink = MsSqlSink::new(options(), None);
        sink.emit(&LogEvent::new(Level::Info, "one"));
        let error = sink.flush().unwrap_err();
        assert!(error.to_string().contains("no SQL Server connector"));
    }

    #[test]
    fn test_debug_redacts_connection_string() {
        let rendered = format!("{:?}", options());
        assert!(!rendered.contains("Server=x"));
        assert!(rendered.contains("<redacted>"));
    }
}
