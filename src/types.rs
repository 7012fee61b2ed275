use std::collections::{BTreeMap, HashMap};
use std::fmt;

/// Owned dynamic value of a single store cell, mirroring SQLite's typing.
#[derive(Clone, Debug, PartialEq)]
pub enum Value {
    Null,
    Integer(i64),
    Real(f64),
    Text(String),
    Blob(Vec<u8>),
}

impl Value {
    /// String form used for codelist matching and identifier normalization.
    ///
    /// `NULL` and blobs have no string form.
    pub fn to_key_string(&self) -> Option<String> {
        match self {
            Value::Null | Value::Blob(_) => None,
            Value::Integer(v) => Some(v.to_string()),
            Value::Real(v) => Some(v.to_string()),
            Value::Text(v) => Some(v.clone()),
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }
}

impl From<rusqlite::types::ValueRef<'_>> for Value {
    fn from(value: rusqlite::types::ValueRef<'_>) -> Self {
        use rusqlite::types::ValueRef;
        match value {
            ValueRef::Null => Value::Null,
            ValueRef::Integer(v) => Value::Integer(v),
            ValueRef::Real(v) => Value::Real(v),
            ValueRef::Text(v) => Value::Text(String::from_utf8_lossy(v).into_owned()),
            ValueRef::Blob(v) => Value::Blob(v.to_vec()),
        }
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Value::Text(value.to_string())
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Value::Text(value)
    }
}

impl From<i64> for Value {
    fn from(value: i64) -> Self {
        Value::Integer(value)
    }
}

impl From<f64> for Value {
    fn from(value: f64) -> Self {
        Value::Real(value)
    }
}

impl From<Vec<u8>> for Value {
    fn from(value: Vec<u8>) -> Self {
        Value::Blob(value)
    }
}

impl rusqlite::ToSql for Value {
    fn to_sql(&self) -> rusqlite::Result<rusqlite::types::ToSqlOutput<'_>> {
        use rusqlite::types::{ToSqlOutput, ValueRef};
        Ok(ToSqlOutput::Borrowed(match self {
            Value::Null => ValueRef::Null,
            Value::Integer(v) => ValueRef::Integer(*v),
            Value::Real(v) => ValueRef::Real(*v),
            Value::Text(v) => ValueRef::Text(v.as_bytes()),
            Value::Blob(v) => ValueRef::Blob(v),
        }))
    }
}

/// One store row, keyed by column name.
pub type RawRecord = BTreeMap<String, Value>;

#[derive(Clone, Copy, Debug, PartialEq)]
pub enum ColumnType {
    Boolean,
    Varchar,
    Double,
    Integer,
    Geometry,
}

#[derive(Clone, Debug, PartialEq)]
pub struct ColumnSpec {
    pub name: String,
    pub column_type: ColumnType,
    pub primary_key: bool,
}

/// Typed column descriptors of a table, resolved once when the source opens.
#[derive(Clone, Debug)]
pub struct ColumnSet {
    columns: Vec<ColumnSpec>,
    index_by_name: HashMap<String, usize>,
    primary_key: String,
    geometry: Option<String>,
}

impl ColumnSet {
    pub fn new(
        columns: Vec<ColumnSpec>,
        primary_key: String,
        geometry: Option<String>,
    ) -> Self {
        let index_by_name = columns
            .iter()
            .enumerate()
            .map(|(idx, column)| (column.name.clone(), idx))
            .collect();
        Self {
            columns,
            index_by_name,
            primary_key,
            geometry,
        }
    }

    pub fn get(&self, name: &str) -> Option<&ColumnSpec> {
        self.index_by_name.get(name).map(|idx| &self.columns[*idx])
    }

    pub fn contains(&self, name: &str) -> bool {
        self.index_by_name.contains_key(name)
    }

    pub fn iter(&self) -> impl Iterator<Item = &ColumnSpec> {
        self.columns.iter()
    }

    pub fn primary_key(&self) -> &str {
        &self.primary_key
    }

    pub fn geometry(&self) -> Option<&str> {
        self.geometry.as_deref()
    }

    /// Columns that are neither the primary key nor the geometry.
    pub fn property_columns(&self) -> impl Iterator<Item = &ColumnSpec> {
        self.columns.iter().filter(|column| {
            column.name != self.primary_key && Some(column.name.as_str()) != self.geometry()
        })
    }
}

/// Fully qualified identity of a table: store, schema and table name.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct TableIdentity {
    pub database: String,
    pub schema: String,
    pub table: String,
}

impl TableIdentity {
    pub fn new(
        database: impl Into<String>,
        schema: impl Into<String>,
        table: impl Into<String>,
    ) -> Self {
        Self {
            database: database.into(),
            schema: schema.into(),
            table: table.into(),
        }
    }
}

impl fmt::Display for TableIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.database, self.schema, self.table)
    }
}
