//! Table column model

use serde::{Deserialize, Serialize};

/// Column types the sink knows how to create and fill
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SqlDataType {
    /// 32-bit integer
    Int,
    /// 64-bit integer
    BigInt,
    /// Single-byte character string
    VarChar,
    /// Unicode character string
    NVarChar,
    /// Date and time without offset
    DateTime,
    /// Date and time with offset
    DateTimeOffset,
    /// XML document
    Xml,
}

impl SqlDataType {
    /// Type name used in DDL
    pub const fn sql_name(self) -> &'static str {
        match self {
            Self::Int => "INT",
            Self::BigInt => "BIGINT",
            Self::VarChar => "VARCHAR",
            Self::NVarChar => "NVARCHAR",
            Self::DateTime => "DATETIME",
            Self::DateTimeOffset => "DATETIMEOFFSET",
            Self::Xml => "XML",
        }
    }

    /// Whether the type takes a length
    pub const fn is_text(self) -> bool {
        matches!(self, Self::VarChar | Self::NVarChar)
    }

    /// Whether the type holds whole numbers
    pub const fn is_integer(self) -> bool {
        matches!(self, Self::Int | Self::BigInt)
    }
}

/// A table column
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SqlColumn {
    /// Column name
    pub column_name: String,
    /// Column type
    pub data_type: SqlDataType,
    /// Whether the column accepts `NULL`
    pub allow_null: bool,
    /// Maximum length of text columns; `None` means `MAX`
    pub data_length: Option<u32>,
    /// Create a non-clustered index on this column
    pub non_clustered_index: bool,
    /// Event property that fills the column, when it differs from the name
    pub property_name: Option<String>,
}

impl SqlColumn {
    /// Create a column
    pub fn new(
        column_name: impl Into<String>,
        data_type: SqlDataType,
        allow_null: bool,
        data_length: Option<u32>,
    ) -> Self {
        Self {
            column_name: column_name.into(),
            data_type,
            allow_null,
            data_length,
            non_clustered_index: false,
            property_name: None,
        }
    }

    /// Request a non-clustered index
    #[must_use]
    pub const fn with_non_clustered_index(mut self) -> Self {
        self.non_clustered_index = true;
        self
    }

    /// Fill the column from a differently named property
    #[must_use]
    pub fn with_property_name(mut self, name: impl Into<String>) -> Self {
        self.property_name = Some(name.into());
        self
    }

    /// Event property that fills the column
    pub fn property_name(&self) -> &str {
        self.property_name.as_deref().unwrap_or(&self.column_name)
    }

    /// `VARCHAR(50)`, `NVARCHAR(MAX)`, `INT`, ...
    pub fn type_definition(&self) -> String {
        let name = self.data_type.sql_name();
        if !self.data_type.is_text() {
            return name.to_string();
        }
        match self.data_length {
            Some(length) => format!("{name}({length})"),
            None => format!("{name}(MAX)"),
        }
    }
}

/// Columns every log table can carry
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum StandardColumn {
    /// Identity key
    Id,
    /// Rendered message
    Message,
    /// Message before rendering
    MessageTemplate,
    /// Level name
    Level,
    /// Event time
    TimeStamp,
    /// Error and its sources
    Exception,
    /// All properties as XML
    Properties,
    /// The whole event as JSON
    LogEvent,
}

impl StandardColumn {
    /// Every standard column in table order
    pub const ALL: [Self; 8] = [
        Self::Id,
        Self::Message,
        Self::MessageTemplate,
        Self::Level,
        Self::TimeStamp,
        Self::Exception,
        Self::Properties,
        Self::LogEvent,
    ];
}

/// Which columns the log table has and how they are defined
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnOptions {
    /// Identity key column
    pub id: SqlColumn,
    /// Rendered message column
    pub message: SqlColumn,
    /// Message template column
    pub message_template: SqlColumn,
    /// Level column
    pub level: SqlColumn,
    /// Timestamp column
    pub time_stamp: SqlColumn,
    /// Exception column
    pub exception: SqlColumn,
    /// XML properties column
    pub properties: SqlColumn,
    /// JSON event column
    pub log_event: SqlColumn,
    /// Standard columns written to the table
    pub store: Vec<StandardColumn>,
    /// Columns filled from event properties, after the standard ones
    pub additional_columns: Vec<SqlColumn>,
    /// Name of the primary key column; the identity column when `None`
    pub primary_key: Option<String>,
    /// Store the table as a clustered columnstore
    pub clustered_columnstore_index: bool,
    /// Do not fire insert triggers during bulk inserts
    pub disable_triggers: bool,
}

impl Default for ColumnOptions {
    fn default() -> Self {
        Self {
            id: SqlColumn::new("Id", SqlDataType::Int, false, None),
            message: SqlColumn::new("Message", SqlDataType::NVarChar, true, None),
            message_template: SqlColumn::new("MessageTemplate", SqlDataType::NVarChar, true, None),
            level: SqlColumn::new("Level", SqlDataType::NVarChar, true, Some(128)),
            time_stamp: SqlColumn::new("TimeStamp", SqlDataType::DateTime, false, None),
            exception: SqlColumn::new("Exception", SqlDataType::NVarChar, true, None),
            properties: SqlColumn::new("Properties", SqlDataType::Xml, true, None),
            log_event: SqlColumn::new("LogEvent", SqlDataType::NVarChar, true, None),
            store: vec![
                StandardColumn::Id,
                StandardColumn::Message,
                StandardColumn::MessageTemplate,
                StandardColumn::Level,
                StandardColumn::TimeStamp,
                StandardColumn::Exception,
                StandardColumn::Properties,
            ],
            additional_columns: Vec::new(),
            primary_key: None,
            clustered_columnstore_index: false,
            disable_triggers: false,
        }
    }
}

impl ColumnOptions {
    /// Definition of a standard column
    pub const fn column(&self, column: StandardColumn) -> &SqlColumn {
        match column {
            StandardColumn::Id => &self.id,
            StandardColumn::Message => &self.message,
            StandardColumn::MessageTemplate => &self.message_template,
            StandardColumn::Level => &self.level,
            StandardColumn::TimeStamp => &self.time_stamp,
            StandardColumn::Exception => &self.exception,
            StandardColumn::Properties => &self.properties,
            StandardColumn::LogEvent => &self.log_event,
        }
    }

    /// Start writing a standard column
    pub fn store(&mut self, column: StandardColumn) {
        if !self.is_stored(column) {
            self.store.push(column);
        }
    }

    /// Stop writing a standard column
    pub fn remove(&mut self, column: StandardColumn) {
        self.store.retain(|stored| *stored != column);
    }

    /// Whether a standard column is written
    pub fn is_stored(&self, column: StandardColumn) -> bool {
        self.store.contains(&column)
    }

    /// Stored standard columns in table order
    pub fn stored_standard_columns(&self) -> impl Iterator<Item = StandardColumn> + '_ {
        StandardColumn::ALL
            .into_iter()
            .filter(|column| self.is_stored(*column))
    }

    /// Every column of the table in table order
    pub fn stored_columns(&self) -> Vec<&SqlColumn> {
        self.stored_standard_columns()
            .map(|column| self.column(column))
            .chain(&self.additional_columns)
            .collect()
    }

    /// Look up a stored column by name, ignoring case
    pub fn find(&self, name: &str) -> Option<&SqlColumn> {
        self.stored_columns()
            .into_iter()
            .find(|column| column.column_name.eq_ignore_ascii_case(name))
    }

    /// The primary key column
    pub fn primary_key_column(&self) -> Option<&SqlColumn> {
        match &self.primary_key {
            Some(name) => self.find(name),
            None => self.is_stored(StandardColumn::Id).then_some(&self.id),
        }
    }
}
