use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use rusqlite::{Connection, OpenFlags, params_from_iter};
use tracing::debug;

use crate::config::ProviderConfig;
use crate::conversions::column_type_from_str;
use crate::error::{FeatureError, Result};
use crate::mapping::ReferenceTable;
use crate::source::{FeatureQuery, RowSource};
use crate::sql::{
    SQL_TABLE_COLUMNS, sql_bbox_intersects, sql_count_rows, sql_equals, sql_order_term,
    sql_select_code_pairs, sql_select_ids, sql_select_row_by_id, sql_select_rows,
};
use crate::sql_functions::register_spatial_functions;
use crate::types::{ColumnSet, ColumnSpec, ColumnType, RawRecord, TableIdentity, Value};

/// A [`RowSource`] over one table of a SQLite database.
///
/// The connection is used by one caller at a time.
#[derive(Debug)]
pub struct SqliteRowSource {
    conn: Mutex<Connection>,
    identity: TableIdentity,
    columns: ColumnSet,
}

impl SqliteRowSource {
    /// Open a database file read-only and resolve the configured table.
    ///
    /// Example:
    /// ```no_run
    /// use rusqlite_features::{ProviderConfig, RowSource, SqliteRowSource};
    ///
    /// let config = ProviderConfig::from_json_str(r#"{"table": "parcels"}"#)?;
    /// let source = SqliteRowSource::open_read_only("data/parcels.sqlite", &config)?;
    /// println!("{}", source.identity());
    /// # Ok::<(), rusqlite_features::FeatureError>(())
    /// ```
    pub fn open_read_only<P: AsRef<Path>>(path: P, config: &ProviderConfig) -> Result<Self> {
        let conn = Connection::open_with_flags(
            path,
            OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )?;
        Self::from_connection(conn, config)
    }

    /// Wrap an existing connection. Spatial SQL functions are registered on it.
    pub fn from_connection(conn: Connection, config: &ProviderConfig) -> Result<Self> {
        register_spatial_functions(&conn)?;
        let columns = load_column_set(&conn, config)?;
        debug!(
            table = %config.identity(),
            columns = columns.iter().count(),
            primary_key = columns.primary_key(),
            "opened sqlite row source"
        );
        Ok(Self {
            conn: Mutex::new(conn),
            identity: config.identity(),
            columns,
        })
    }

    fn connection(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn.lock().map_err(|_| FeatureError::ConnectionPoisoned)
    }

    fn column_names(&self) -> impl Iterator<Item = &str> {
        self.columns.iter().map(|column| column.name.as_str())
    }

    fn primary_key_is_integer(&self) -> bool {
        self.columns
            .get(self.columns.primary_key())
            .is_some_and(|column| column.column_type == ColumnType::Integer)
    }

    /// Conditions and their bound values for the filters of `query`.
    fn conditions(&self, query: &FeatureQuery) -> Result<(Vec<String>, Vec<Value>)> {
        let mut conditions = Vec::new();
        let mut params = Vec::new();

        for (property, value) in &query.properties {
            if !self.columns.contains(property) {
                return Err(FeatureError::UnknownProperty {
                    property: property.clone(),
                });
            }
            conditions.push(sql_equals(property));
            params.push(value.clone());
        }

        if let Some([minx, miny, maxx, maxy]) = query.bbox {
            let geometry = self.columns.geometry().ok_or_else(|| {
                FeatureError::InvalidConfig(format!(
                    "bbox filter on table without geometry: {}",
                    self.identity
                ))
            })?;
            conditions.push(sql_bbox_intersects(geometry));
            params.extend([minx, maxx, miny, maxy].map(Value::Real));
        }

        Ok((conditions, params))
    }

    fn order_by(&self, query: &FeatureQuery) -> Result<Vec<String>> {
        let mut order_by = Vec::with_capacity(query.sortby.len() + 1);
        for key in &query.sortby {
            if !self.columns.contains(&key.property) {
                return Err(FeatureError::UnknownProperty {
                    property: key.property.clone(),
                });
            }
            order_by.push(sql_order_term(&key.property, key.ascending));
        }
        // Ties, and unsorted queries, fall back to key order.
        order_by.push(sql_order_term(self.columns.primary_key(), true));
        Ok(order_by)
    }

    fn record_from_row(&self, row: &rusqlite::Row<'_>) -> rusqlite::Result<RawRecord> {
        let mut record = RawRecord::new();
        for (idx, name) in self.column_names().enumerate() {
            record.insert(name.to_string(), Value::from(row.get_ref(idx)?));
        }
        Ok(record)
    }
}

impl RowSource for SqliteRowSource {
    fn identity(&self) -> &TableIdentity {
        &self.identity
    }

    fn columns(&self) -> &ColumnSet {
        &self.columns
    }

    fn count(&self, query: &FeatureQuery) -> Result<u64> {
        let (conditions, params) = self.conditions(query)?;
        let sql = sql_count_rows(&self.identity.schema, &self.identity.table, &conditions);
        let conn = self.connection()?;
        let count: i64 = conn.query_row(&sql, params_from_iter(params.iter()), |row| row.get(0))?;
        Ok(count.max(0) as u64)
    }

    fn rows(&self, query: &FeatureQuery) -> Result<Vec<RawRecord>> {
        let (conditions, mut params) = self.conditions(query)?;
        let order_by = self.order_by(query)?;
        let sql = sql_select_rows(
            &self.identity.schema,
            &self.identity.table,
            self.column_names(),
            &conditions,
            &order_by,
        );
        params.push(Value::Integer(clamp_to_i64(query.limit)));
        params.push(Value::Integer(clamp_to_i64(query.offset)));

        let conn = self.connection()?;
        let mut stmt = conn.prepare_cached(&sql)?;
        let records = stmt
            .query_map(params_from_iter(params.iter()), |row| self.record_from_row(row))?
            .collect::<std::result::Result<Vec<RawRecord>, _>>()?;
        Ok(records)
    }

    fn get(&self, id: &str) -> Result<Option<RawRecord>> {
        let key = if self.primary_key_is_integer() {
            match id.parse::<i64>() {
                Ok(v) => Value::Integer(v),
                Err(_) => return Ok(None),
            }
        } else {
            Value::from(id)
        };

        let sql = sql_select_row_by_id(
            &self.identity.schema,
            &self.identity.table,
            self.column_names(),
            self.columns.primary_key(),
        );
        let conn = self.connection()?;
        let mut stmt = conn.prepare_cached(&sql)?;
        let mut rows = stmt.query([key])?;
        match rows.next()? {
            Some(row) => Ok(Some(self.record_from_row(row)?)),
            None => Ok(None),
        }
    }

    fn ordered_ids(&self) -> Result<Vec<String>> {
        let sql = sql_select_ids(
            &self.identity.schema,
            &self.identity.table,
            self.columns.primary_key(),
        );
        let conn = self.connection()?;
        let mut stmt = conn.prepare_cached(&sql)?;
        let ids = stmt
            .query_map([], |row| Ok(Value::from(row.get_ref(0)?).to_key_string()))?
            .filter_map(|id| id.transpose())
            .collect::<std::result::Result<Vec<String>, _>>()?;
        Ok(ids)
    }
}

impl ReferenceTable for SqliteRowSource {
    fn code_pairs(
        &self,
        schema: &str,
        table: &str,
        id_column: &str,
        value_column: &str,
    ) -> Result<Vec<(String, String)>> {
        let sql = sql_select_code_pairs(schema, table, id_column, value_column);
        let conn = self.connection()?;
        let mut stmt = conn.prepare(&sql)?;
        let pairs = stmt
            .query_map([], |row| {
                let code = Value::from(row.get_ref(0)?).to_key_string();
                let label = Value::from(row.get_ref(1)?).to_key_string();
                Ok(code.zip(label))
            })?
            .filter_map(|pair| pair.transpose())
            .collect::<std::result::Result<Vec<(String, String)>, _>>()?;
        Ok(pairs)
    }
}

fn clamp_to_i64(n: usize) -> i64 {
    i64::try_from(n).unwrap_or(i64::MAX)
}

/// Read column metadata and resolve the key and geometry columns.
fn load_column_set(conn: &Connection, config: &ProviderConfig) -> Result<ColumnSet> {
    let table_name = config.identity().to_string();
    let mut stmt = conn.prepare(SQL_TABLE_COLUMNS)?;
    let rows = stmt
        .query_map([config.table.as_str(), config.schema.as_str()], |row| {
            let name: String = row.get(0)?;
            let declared_type: String = row.get(1)?;
            let primary_key: i32 = row.get(2)?;
            Ok((name, declared_type, primary_key != 0))
        })?
        .collect::<std::result::Result<Vec<(String, String, bool)>, _>>()?;

    if rows.is_empty() {
        return Err(FeatureError::InvalidConfig(format!(
            "table not found: {table_name}"
        )));
    }

    let mut declared_key: Option<String> = None;
    let mut columns = Vec::with_capacity(rows.len());
    for (name, declared_type, is_primary_key) in rows {
        let column_type = column_type_from_str(&declared_type);
        if is_primary_key && config.id_field.is_none() {
            if declared_key.is_some() {
                return Err(FeatureError::CompositePrimaryKeyUnsupported { table_name });
            }
            declared_key = Some(name.clone());
        }
        columns.push(ColumnSpec {
            name,
            column_type,
            primary_key: false,
        });
    }

    let primary_key = match &config.id_field {
        Some(id_field) if columns.iter().any(|c| &c.name == id_field) => id_field.clone(),
        Some(id_field) => {
            return Err(FeatureError::InvalidConfig(format!(
                "id_field '{id_field}' is not a column of {table_name}"
            )));
        }
        None => declared_key.ok_or_else(|| FeatureError::MissingPrimaryKeyColumn {
            table_name: table_name.clone(),
        })?,
    };

    let geometry = match &config.geom_field {
        Some(geom_field) if columns.iter().any(|c| &c.name == geom_field) => {
            Some(geom_field.clone())
        }
        Some(geom_field) => {
            return Err(FeatureError::MissingGeometryColumn {
                table_name,
                column: geom_field.clone(),
            });
        }
        None => columns
            .iter()
            .find(|c| c.column_type == ColumnType::Geometry)
            .map(|c| c.name.clone()),
    };

    for column in columns.iter_mut() {
        column.primary_key = column.name == primary_key;
    }

    Ok(ColumnSet::new(columns, primary_key, geometry))
}
