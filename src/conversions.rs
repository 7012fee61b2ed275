use crate::types::{ColumnType, Value};

const GEOMETRY_TYPES: [&str; 15] = [
    "BLOB",
    "GEOMETRY",
    "POINT",
    "LINESTRING",
    "POLYGON",
    "MULTIPOINT",
    "MULTILINESTRING",
    "MULTIPOLYGON",
    "GEOMETRYCOLLECTION",
    "CIRCULARSTRING",
    "COMPOUNDCURVE",
    "CURVEPOLYGON",
    "MULTICURVE",
    "MULTISURFACE",
    "CURVE",
];

/// Column type of a declared SQL type.
///
/// Geometry type names and `BOOLEAN` are matched exactly. Everything else
/// follows SQLite's affinity rules; typeless and unrecognized declarations
/// are treated as text.
pub(crate) fn column_type_from_str(column_type_str: &str) -> ColumnType {
    // Declared types may carry a length, e.g. VARCHAR(32).
    let s = column_type_str
        .split('(')
        .next()
        .unwrap_or(column_type_str)
        .trim()
        .to_ascii_uppercase();

    if GEOMETRY_TYPES.contains(&s.as_str()) {
        ColumnType::Geometry
    } else if s == "BOOLEAN" || s == "BOOL" {
        ColumnType::Boolean
    } else if s.contains("INT") {
        ColumnType::Integer
    } else if ["CHAR", "CLOB", "TEXT"].iter().any(|t| s.contains(t)) {
        ColumnType::Varchar
    } else if ["REAL", "FLOA", "DOUB", "NUMERIC", "DECIMAL"]
        .iter()
        .any(|t| s.contains(t))
    {
        ColumnType::Double
    } else {
        ColumnType::Varchar
    }
}

/// JSON schema type name published for a column.
#[inline]
pub(crate) fn column_type_to_json_type(column_type: ColumnType) -> &'static str {
    match column_type {
        ColumnType::Integer => "integer",
        ColumnType::Double => "number",
        ColumnType::Varchar => "string",
        ColumnType::Boolean => "boolean",
        ColumnType::Geometry => "geometry",
    }
}

/// Convert a store value into its JSON property form.
///
/// Booleans are stored as integers in SQLite, so the declared column type is
/// consulted for them.
pub(crate) fn value_to_json(value: Value, column_type: Option<ColumnType>) -> serde_json::Value {
    match value {
        Value::Null => serde_json::Value::Null,
        Value::Integer(v) if column_type == Some(ColumnType::Boolean) => {
            serde_json::Value::Bool(v != 0)
        }
        Value::Integer(v) => serde_json::Value::from(v),
        Value::Real(v) => serde_json::Number::from_f64(v)
            .map(serde_json::Value::Number)
            .unwrap_or(serde_json::Value::Null),
        Value::Text(v) => serde_json::Value::String(v),
        Value::Blob(v) => serde_json::Value::String(hex(&v)),
    }
}

fn hex(bytes: &[u8]) -> String {
    const DIGITS: &[u8; 16] = b"0123456789abcdef";
    let mut out = String::with_capacity(bytes.len() * 2);
    for b in bytes {
        out.push(DIGITS[(b >> 4) as usize] as char);
        out.push(DIGITS[(b & 0x0f) as usize] as char);
    }
    out
}
