//! Table DDL and row mapping

use std::fmt::Write as _;

use serde_json::{Map, Value};
use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;

use super::columns::{ColumnOptions, SqlColumn, StandardColumn};
use crate::event::{LogEvent, render_value};

/// A value bound to one cell of an inserted row
#[derive(Debug, Clone, PartialEq)]
pub enum SqlValue {
    /// `NULL`
    Null,
    /// Integer cell
    Int(i64),
    /// Text cell
    Text(String),
    /// Timestamp cell
    DateTime(OffsetDateTime),
    /// XML document cell
    Xml(String),
}

/// `[name]` with closing brackets escaped
pub fn quote_identifier(name: &str) -> String {
    format!("[{}]", name.replace(']', "]]"))
}

fn quote_literal(text: &str) -> String {
    format!("'{}'", text.replace('\'', "''"))
}

/// Statement that creates the log table and its indexes when it does not
/// exist yet
pub fn create_table_sql(schema: &str, table: &str, columns: &ColumnOptions) -> String {
    let qualified = format!("{}.{}", quote_identifier(schema), quote_identifier(table));
    let primary_key = columns.primary_key_column();

    let mut definitions: Vec<String> = columns
        .stored_columns()
        .into_iter()
        .map(|column| {
            let identity = if column.column_name == columns.id.column_name
                && columns.is_stored(StandardColumn::Id)
            {
                " IDENTITY(1,1)"
            } else {
                ""
            };
            let nullability = if column.allow_null { "NULL" } else { "NOT NULL" };
            format!(
                "{} {}{identity} {nullability}",
                quote_identifier(&column.column_name),
                column.type_definition()
            )
        })
        .collect();

    if let Some(key) = primary_key {
        let clustering = if key.non_clustered_index || columns.clustered_columnstore_index {
            "NONCLUSTERED"
        } else {
            "CLUSTERED"
        };
        definitions.push(format!(
            "CONSTRAINT {} PRIMARY KEY {clustering} ({})",
            quote_identifier(&format!("PK_{table}")),
            quote_identifier(&key.column_name)
        ));
    }

    let mut sql = String::new();
    let _ = writeln!(
        sql,
        "IF NOT EXISTS (SELECT s.name, t.name FROM sys.tables t \
         JOIN sys.schemas s ON s.schema_id = t.schema_id \
         WHERE s.name = {} AND t.name = {})",
        quote_literal(schema),
        quote_literal(table)
    );
    sql.push_str("BEGIN\n");
    let _ = writeln!(sql, "CREATE TABLE {qualified} (\n{}\n);", definitions.join(",\n"));

    if columns.clustered_columnstore_index {
        let _ = writeln!(
            sql,
            "CREATE CLUSTERED COLUMNSTORE INDEX {} ON {qualified};",
            quote_identifier(&format!("CCI_{table}"))
        );
    }

    let indexed = columns
        .stored_columns()
        .into_iter()
        .filter(|column| column.non_clustered_index)
        .filter(|column| primary_key.is_none_or(|key| key.column_name != column.column_name));
    for (n, column) in indexed.enumerate() {
        let _ = writeln!(
            sql,
            "CREATE NONCLUSTERED INDEX {} ON {qualified} ({});",
            quote_identifier(&format!("IX{}_{table}", n + 1)),
            quote_identifier(&column.column_name)
        );
    }

    sql.push_str("END");
    sql
}

/// Columns filled on insert (everything but the identity column)
pub fn insert_columns(columns: &ColumnOptions) -> Vec<&SqlColumn> {
    columns
        .stored_standard_columns()
        .filter(|column| *column != StandardColumn::Id)
        .map(|column| columns.column(column))
        .chain(&columns.additional_columns)
        .collect()
}

/// Cells of one inserted row, in [`insert_columns`] order
pub fn map_event(event: &LogEvent, columns: &ColumnOptions) -> Vec<SqlValue> {
    let standard = columns
        .stored_standard_columns()
        .filter(|column| *column != StandardColumn::Id)
        .map(|column| standard_value(event, column, columns.column(column)));
    let additional = columns
        .additional_columns
        .iter()
        .map(|column| property_value(event, column));
    standard.chain(additional).collect()
}

fn standard_value(event: &LogEvent, column: StandardColumn, definition: &SqlColumn) -> SqlValue {
    match column {
        StandardColumn::Id => SqlValue::Null,
        StandardColumn::Message | StandardColumn::MessageTemplate => {
            text(&event.message, definition)
        }
        StandardColumn::Level => text(event.level.name(), definition),
        StandardColumn::TimeStamp => SqlValue::DateTime(event.timestamp),
        StandardColumn::Exception => event
            .exception
            .as_ref()
            .map_or(SqlValue::Null, |exception| text(&exception.to_string(), definition)),
        StandardColumn::Properties => SqlValue::Xml(properties_xml(event)),
        StandardColumn::LogEvent => text(&log_event_json(event).to_string(), definition),
    }
}

fn property_value(event: &LogEvent, column: &SqlColumn) -> SqlValue {
    match event.property(column.property_name()) {
        None | Some(Value::Null) => SqlValue::Null,
        Some(value) if column.data_type.is_integer() => {
            value.as_i64().map_or(SqlValue::Null, SqlValue::Int)
        }
        Some(value) => text(&render_value(value), column),
    }
}

/// Text cell cut to the column's length
fn text(value: &str, column: &SqlColumn) -> SqlValue {
    match column.data_length {
        Some(length) if column.data_type.is_text() => {
            SqlValue::Text(value.chars().take(length as usize).collect())
        }
        _ => SqlValue::Text(value.to_string()),
    }
}

/// `<properties><property key='Name'>value</property>...</properties>`
pub fn properties_xml(event: &LogEvent) -> String {
    let mut xml = String::from("<properties>");
    for (name, value) in &event.properties {
        let _ = write!(
            xml,
            "<property key='{}'>{}</property>",
            escape_xml(name),
            escape_xml(&render_value(value))
        );
    }
    xml.push_str("</properties>");
    xml
}

fn escape_xml(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '\'' => escaped.push_str("&apos;"),
            '"' => escaped.push_str("&quot;"),
            c => escaped.push(c),
        }
    }
    escaped
}

/// The whole event as a JSON document
pub fn log_event_json(event: &LogEvent) -> Value {
    let mut document = Map::new();
    document.insert(
        "TimeStamp".to_string(),
        event
            .timestamp
            .format(&Rfc3339)
            .map_or(Value::Null, Value::String),
    );
    document.insert("Level".to_string(), Value::from(event.level.name()));
    document.insert("Message".to_string(), Value::from(event.message.as_str()));
    if let Some(exception) = &event.exception {
        document.insert("Exception".to_string(), Value::from(exception.to_string()));
    }
    document.insert(
        "Properties".to_string(),
        Value::Object(
            event
                .properties
                .iter()
                .map(|(name, value)| (name.clone(), value.clone()))
                .collect(),
        ),
    );
    Value::Object(document)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::{ExceptionInfo, Level};
    use crate::sink::mssql::columns::SqlDataType;
    use pretty_assertions::assert_eq;
    use serde_json::json;
    use time::macros::datetime;

    fn columns() -> ColumnOptions {
        let mut columns = ColumnOptions {
            disable_triggers: true,
            primary_key: Some("Id".to_string()),
            additional_columns: vec![
                SqlColumn::new("Application", SqlDataType::VarChar, true, Some(50))
                    .with_non_clustered_index(),
                SqlColumn::new("RequestPath", SqlDataType::VarChar, true, Some(8)),
            ],
            ..ColumnOptions::default()
        };
        columns.store(StandardColumn::LogEvent);
        columns.remove(StandardColumn::Properties);
        columns.id.non_clustered_index = true;
        columns.level.column_name = "Severity".to_string();
        columns.level.data_length = Some(15);
        columns
    }

    #[test]
    fn test_create_table_sql() {
        let sql = create_table_sql("dbo", "Logs", &columns());

        assert_eq!(
            sql,
            "IF NOT EXISTS (SELECT s.name, t.name FROM sys.tables t JOIN sys.schemas s \
             ON s.schema_id = t.schema_id WHERE s.name = 'dbo' AND t.name = 'Logs')\n\
             BEGIN\n\
             CREATE TABLE [dbo].[Logs] (\n\
             [Id] INT IDENTITY(1,1) NOT NULL,\n\
             [Message] NVARCHAR(MAX) NULL,\n\
             [MessageTemplate] NVARCHAR(MAX) NULL,\n\
             [Severity] NVARCHAR(15) NULL,\n\
             [TimeStamp] DATETIME NOT NULL,\n\
             [Exception] NVARCHAR(MAX) NULL,\n\
             [LogEvent] NVARCHAR(MAX) NULL,\n\
             [Application] VARCHAR(50) NULL,\n\
             [RequestPath] VARCHAR(8) NULL,\n\
             CONSTRAINT [PK_Logs] PRIMARY KEY NONCLUSTERED ([Id])\n\
             );\n\
             CREATE NONCLUSTERED INDEX [IX1_Logs] ON [dbo].[Logs] ([Application]);\n\
             END"
        );
    }

    #[test]
    fn test_default_key_is_clustered() {
        let sql = create_table_sql("dbo", "Logs", &ColumnOptions::default());
        assert!(sql.contains("CONSTRAINT [PK_Logs] PRIMARY KEY CLUSTERED ([Id])"));
        assert!(!sql.contains("COLUMNSTORE"));
    }

    #[test]
    fn test_identifiers_are_escaped() {
        assert_eq!(quote_identifier("we]ird"), "[we]]ird]");
        let sql = create_table_sql("o'brien", "Logs", &ColumnOptions::default());
        assert!(sql.contains("s.name = 'o''brien'"));
    }

    #[test]
    fn test_map_event_follows_insert_columns() {
        let columns = columns();
        let event = LogEvent::new(Level::Warn, "slow request")
            .with_timestamp(datetime!(2024-03-05 14:07:09 UTC))
            .with_property("Application", "orders-api")
            .with_property("RequestPath", "/orders/12345")
            .with_exception(ExceptionInfo::from_message("timeout"));

        let names: Vec<&str> = insert_columns(&columns)
            .iter()
            .map(|column| column.column_name.as_str())
            .collect();
        let row = map_event(&event, &columns);

        assert_eq!(
            names,
            ["Message", "MessageTemplate", "Severity", "TimeStamp", "Exception", "LogEvent", "Application", "RequestPath"]
        );
        assert_eq!(row.len(), names.len());
        assert_eq!(row[2], SqlValue::Text("Warning".to_string()));
        assert_eq!(row[3], SqlValue::DateTime(datetime!(2024-03-05 14:07:09 UTC)));
        assert_eq!(row[4], SqlValue::Text("timeout".to_string()));
        assert_eq!(row[6], SqlValue::Text("orders-api".to_string()));
        // Cut to VARCHAR(8)
        assert_eq!(row[7], SqlValue::Text("/orders/".to_string()));
    }

    #[test]
    fn test_missing_and_null_properties_map_to_null() {
        let columns = columns();
        let event = LogEvent::new(Level::Info, "x").with_property("Application", Value::Null);
        let row = map_event(&event, &columns);
        assert_eq!(row[6], SqlValue::Null);
        assert_eq!(row[7], SqlValue::Null);
    }

    #[test]
    fn test_log_event_json() {
        let event = LogEvent::new(Level::Info, "hello")
            .with_timestamp(datetime!(2024-03-05 14:07:09 UTC))
            .with_property("BuildNumber", Value::Null);

        assert_eq!(
            log_event_json(&event),
            json!({
                "TimeStamp": "2024-03-05T14:07:09Z",
                "Level": "Information",
                "Message": "hello",
                "Properties": { "BuildNumber": null }
            })
        );
    }

    #[test]
    fn test_properties_xml_escapes() {
        let event = LogEvent::new(Level::Info, "x").with_property("Path", "/a?b=1&c=<2>");
        assert_eq!(
            properties_xml(&event),
            "<properties><property key='Path'>/a?b=1&amp;c=&lt;2&gt;</property></properties>"
        );
    }
}
