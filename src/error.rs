use std::error::Error;
use std::fmt;
use std::sync::Arc;

/// Crate error type for feature materialization.
#[derive(Debug)]
pub enum FeatureError {
    /// Wraps errors returned by `rusqlite`.
    Sql(rusqlite::Error),
    /// Wraps errors returned by the HTTP client while fetching codelists.
    Http(reqwest::Error),
    /// Wraps errors returned by the XML reader while parsing codelists.
    Xml(quick_xml::Error),
    /// Wraps errors returned by `serde_json`.
    Json(serde_json::Error),
    /// Wraps errors returned by `proj4rs`.
    Projection(proj4rs::errors::Error),
    /// The requested identifier does not exist in the row source.
    NotFound { identifier: String },
    /// A geometry blob could not be decoded.
    InvalidGeometry(String),
    /// A WKB geometry type code is not supported.
    UnsupportedGeometryType(u32),
    /// The geometry contains circular arcs but linearization is disabled.
    CurvedGeometry,
    /// A CRS identifier or definition could not be interpreted.
    InvalidCrs(String),
    /// The provider configuration is inconsistent.
    InvalidConfig(String),
    /// A query referenced a property that is not a column of the table.
    UnknownProperty { property: String },
    /// Table schema has multiple primary key columns, which is unsupported.
    CompositePrimaryKeyUnsupported { table_name: String },
    /// Table schema has no primary key column.
    MissingPrimaryKeyColumn { table_name: String },
    /// The configured geometry column does not exist.
    MissingGeometryColumn { table_name: String, column: String },
    /// The connection mutex was poisoned by a panicking holder.
    ConnectionPoisoned,
    /// An error produced once inside a cache initializer and shared by every waiter.
    Shared(Arc<FeatureError>),
}

impl fmt::Display for FeatureError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Sql(err) => write!(f, "{err}"),
            Self::Http(err) => write!(f, "{err}"),
            Self::Xml(err) => write!(f, "{err}"),
            Self::Json(err) => write!(f, "{err}"),
            Self::Projection(err) => write!(f, "projection failed: {err}"),
            Self::NotFound { identifier } => write!(f, "no such item: {identifier}"),
            Self::InvalidGeometry(reason) => write!(f, "invalid geometry: {reason}"),
            Self::UnsupportedGeometryType(code) => {
                write!(f, "unsupported geometry type code: {code}")
            }
            Self::CurvedGeometry => write!(
                f,
                "geometry contains curved segments but linearization is disabled"
            ),
            Self::InvalidCrs(crs) => write!(f, "invalid crs: {crs}"),
            Self::InvalidConfig(reason) => write!(f, "invalid provider configuration: {reason}"),
            Self::UnknownProperty { property } => write!(f, "unknown property: {property}"),
            Self::CompositePrimaryKeyUnsupported { table_name } => write!(
                f,
                "composite primary keys are not supported yet for table: {table_name}"
            ),
            Self::MissingPrimaryKeyColumn { table_name } => {
                write!(f, "no primary key column found for table: {table_name}")
            }
            Self::MissingGeometryColumn { table_name, column } => {
                write!(f, "geometry column '{column}' not found in table: {table_name}")
            }
            Self::ConnectionPoisoned => write!(f, "connection lock poisoned"),
            Self::Shared(err) => write!(f, "{err}"),
        }
    }
}

impl Error for FeatureError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Sql(err) => Some(err),
            Self::Http(err) => Some(err),
            Self::Xml(err) => Some(err),
            Self::Json(err) => Some(err),
            Self::Projection(err) => Some(err),
            Self::Shared(err) => err.source(),
            _ => None,
        }
    }
}

impl FeatureError {
    /// Whether the error comes from an unreachable store or remote service.
    pub fn is_connection_failure(&self) -> bool {
        match self {
            Self::Sql(_) | Self::Http(_) | Self::ConnectionPoisoned => true,
            Self::Shared(err) => err.is_connection_failure(),
            _ => false,
        }
    }

    /// Whether the error is a geometry decode or reprojection failure.
    pub fn is_geometry_failure(&self) -> bool {
        match self {
            Self::InvalidGeometry(_)
            | Self::UnsupportedGeometryType(_)
            | Self::CurvedGeometry
            | Self::Projection(_) => true,
            Self::Shared(err) => err.is_geometry_failure(),
            _ => false,
        }
    }
}

impl From<rusqlite::Error> for FeatureError {
    fn from(err: rusqlite::Error) -> Self {
        Self::Sql(err)
    }
}

impl From<reqwest::Error> for FeatureError {
    fn from(err: reqwest::Error) -> Self {
        Self::Http(err)
    }
}

impl From<quick_xml::Error> for FeatureError {
    fn from(err: quick_xml::Error) -> Self {
        Self::Xml(err)
    }
}

impl From<serde_json::Error> for FeatureError {
    fn from(err: serde_json::Error) -> Self {
        Self::Json(err)
    }
}

impl From<proj4rs::errors::Error> for FeatureError {
    fn from(err: proj4rs::errors::Error) -> Self {
        Self::Projection(err)
    }
}

impl From<Arc<FeatureError>> for FeatureError {
    fn from(err: Arc<FeatureError>) -> Self {
        Self::Shared(err)
    }
}

pub type Result<T> = std::result::Result<T, FeatureError>;
