//! SQL Server driver on `tiberius`
//!
//! Each connection owns a single-threaded tokio runtime and blocks on it.
//! Connections are opened and closed on the sink's worker thread, which never
//! runs inside another runtime.

use std::fmt;

use tiberius::{Client, Config, Query};
use tokio::net::TcpStream;
use tokio::runtime::{Builder, Runtime};
use tokio_util::compat::{Compat, TokioAsyncWriteCompatExt};

use super::{BulkInsert, SINK_NAME, SqlConnector, SqlExecutor, SqlValue, quote_identifier};
use crate::core::{LogResult, LogResultExt};

/// SQL Server rejects requests with more than 2100 parameters
const MAX_PARAMETERS: usize = 2000;

/// Opens `tiberius` connections from ADO.NET-style connection strings
///
/// `Server=tcp:db,1433;Database=logs;User Id=app;Password=...;TrustServerCertificate=true`
#[derive(Debug, Clone, Copy, Default)]
pub struct TiberiusConnector;

impl SqlConnector for TiberiusConnector {
    fn connect(&self, connection_string: &str) -> LogResult<Box<dyn SqlExecutor>> {
        let config = Config::from_ado_string(connection_string)
            .with_sink_context(SINK_NAME, || "parsing connection string")?;
        let runtime = Builder::new_current_thread()
            .enable_all()
            .build()
            .with_sink_context(SINK_NAME, || "starting driver runtime")?;

        let client = runtime
            .block_on(async {
                let tcp = TcpStream::connect(config.get_addr()).await?;
                tcp.set_nodelay(true)?;
                Client::connect(config, tcp.compat_write()).await
            })
            .with_sink_context(SINK_NAME, || "connecting")?;

        Ok(Box::new(TiberiusExecutor { client, runtime }))
    }
}

// Field order matters: the client must go before its runtime
struct TiberiusExecutor {
    client: Client<Compat<TcpStream>>,
    runtime: Runtime,
}

impl SqlExecutor for TiberiusExecutor {
    fn execute(&mut self, sql: &str) -> LogResult<()> {
        let Self { client, runtime } = self;
        runtime
            .block_on(async { client.simple_query(sql).await?.into_results().await })
            .with_sink_context(SINK_NAME, || "executing statement")?;
        Ok(())
    }

    fn bulk_insert(&mut self, insert: &BulkInsert<'_>) -> LogResult<()> {
        let Self { client, runtime } = self;
        let target = format!(
            "{}.{}",
            quote_identifier(insert.schema),
            quote_identifier(insert.table)
        );

        for rows in insert.rows.chunks(rows_per_statement(insert.columns.len())) {
            let mut query = Query::new(insert_statement(&target, &insert.columns, rows.len()));
            for value in rows.iter().flatten() {
                bind(&mut query, value);
            }
            runtime
                .block_on(query.execute(client))
                .with_sink_context(SINK_NAME, || {
                    format!("inserting {} rows into {target}", rows.len())
                })?;
        }
        Ok(())
    }
}

impl fmt::Debug for TiberiusExecutor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TiberiusExecutor").finish_non_exhaustive()
    }
}

fn rows_per_statement(columns: usize) -> usize {
    (MAX_PARAMETERS / columns.max(1)).max(1)
}

/// `INSERT INTO t ([a], [b]) VALUES (@P1, @P2), (@P3, @P4)`
fn insert_statement(target: &str, columns: &[&str], rows: usize) -> String {
    let column_list: Vec<String> = columns.iter().map(|name| quote_identifier(name)).collect();
    let values: Vec<String> = (0..rows)
        .map(|row| {
            let params: Vec<String> = (1..=columns.len())
                .map(|column| format!("@P{}", row * columns.len() + column))
                .collect();
            format!("({})", params.join(", "))
        })
        .collect();

    format!(
        "INSERT INTO {target} ({}) VALUES {}",
        column_list.join(", "),
        values.join(", ")
    )
}

fn bind(query: &mut Query<'_>, value: &SqlValue) {
    match value {
        SqlValue::Null => query.bind(Option::<String>::None),
        SqlValue::Int(value) => query.bind(*value),
        SqlValue::Text(value) | SqlValue::Xml(value) => query.bind(value.clone()),
        SqlValue::DateTime(value) => query.bind(*value),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use rstest::rstest;

    #[test]
    fn test_insert_statement_numbers_parameters_row_by_row() {
        let sql = insert_statement("[dbo].[Logs]", &["Message", "Severity"], 2);
        assert_eq!(
            sql,
            "INSERT INTO [dbo].[Logs] ([Message], [Severity]) VALUES (@P1, @P2), (@P3, @P4)"
        );
    }

    #[rstest]
    #[case(10, 200)]
    #[case(11, 181)]
    #[case(0, 2000)]
    #[case(5000, 1)]
    fn test_rows_per_statement_stays_under_parameter_limit(
        #[case] columns: usize,
        #[case] expected: usize,
    ) {
        assert_eq!(rows_per_statement(columns), expected);
    }

    #[test]
    fn test_unreachable_server_is_a_sink_error() {
        let Err(error) = TiberiusConnector
            .connect("Server=tcp:127.0.0.1,1;Database=logs;User Id=app;Password=secret")
        else {
            panic!("nothing listens on port 1");
        };
        assert!(error.to_string().starts_with("Sink 'mssql' error:"));
    }
}
