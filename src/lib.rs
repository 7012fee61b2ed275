//! GeoJSON features materialized from relational geospatial tables.
//!
//! ## Overview
//!
//! - `FeatureAssembler` turns rows of one table into GeoJSON features and
//!   feature collections.
//! - `RowSource` is the seam to the store. `SqliteRowSource` implements it on
//!   top of rusqlite.
//! - `ProviderConfig` describes the table: key and geometry columns, storage
//!   CRS, property selection, value mappings and link templates.
//! - `Value` represents a single cell value as read from the store.
//!
//! Every feature goes through the same steps: the geometry blob is decoded,
//! curves are linearized, coordinates are reprojected when the request asks
//! for another CRS and rounded. Coded property values are replaced with
//! labels from a codelist document or a reference table, and configured link
//! templates are rendered against the finished properties.
//!
//! ## Short usage
//!
//! ```no_run
//! use rusqlite_features::{FeatureAssembler, FeatureQuery, ProviderConfig, SqliteRowSource};
//!
//! let config = ProviderConfig::from_json_str(r#"{"table": "parcels"}"#)?;
//! let source = SqliteRowSource::open_read_only("data/parcels.sqlite", &config)?;
//! let assembler = FeatureAssembler::new(source, config)?;
//!
//! let page = assembler.query(&FeatureQuery::default(), None, None)?;
//! println!("{page}");
//!
//! let feature = assembler.get("42", None, None)?;
//! println!("{} -> {}", feature["prev"], feature["next"]);
//! # Ok::<(), rusqlite_features::FeatureError>(())
//! ```
//!
//! ## Reprojection
//!
//! A `CrsTransformSpec` carries PROJ.4 definitions of the storage and target
//! CRS together with the URI of the target. Geometries are returned in the
//! target CRS and the documents carry the legacy GeoJSON `crs` member unless
//! the target is CRS84.
//!
//! ```no_run
//! # use rusqlite_features::{FeatureAssembler, FeatureQuery, ProviderConfig, SqliteRowSource};
//! use rusqlite_features::CrsTransformSpec;
//!
//! # let config = ProviderConfig::from_json_str(r#"{"table": "parcels"}"#)?;
//! # let source = SqliteRowSource::open_read_only("data/parcels.sqlite", &config)?;
//! # let assembler = FeatureAssembler::new(source, config)?;
//! let directive = CrsTransformSpec {
//!     source_crs: "+proj=longlat +datum=WGS84 +no_defs".to_string(),
//!     target_crs: "+proj=merc +a=6378137 +b=6378137 +units=m +no_defs".to_string(),
//!     target_crs_uri: "http://www.opengis.net/def/crs/EPSG/0/3857".to_string(),
//! };
//! let page = assembler.query(&FeatureQuery::default(), Some(&directive), None)?;
//! # Ok::<(), rusqlite_features::FeatureError>(())
//! ```
//!
//! ## Links
//!
//! Link descriptors are templates such as `{"rel": "owner", "href":
//! "/owners/{owner.id}"}`. Relative hrefs are resolved against the base URL of
//! the request, passed in as a `RequestContext`:
//!
//! ```no_run
//! # use rusqlite_features::{FeatureAssembler, ProviderConfig, SqliteRowSource};
//! use rusqlite_features::RequestContext;
//!
//! # let config = ProviderConfig::from_json_str(r#"{"table": "parcels"}"#)?;
//! # let source = SqliteRowSource::open_read_only("data/parcels.sqlite", &config)?;
//! # let assembler = FeatureAssembler::new(source, config)?;
//! let request = RequestContext::new()
//!     .with_header("X-Forwarded-Proto", "https")
//!     .with_header("X-Forwarded-Host", "maps.example.org")
//!     .with_header("X-Forwarded-Prefix", "/geoapi");
//! let feature = assembler.get("42", None, Some(&request))?;
//! # Ok::<(), rusqlite_features::FeatureError>(())
//! ```
mod assembler;
mod cache;
mod config;
mod conversions;
mod crs;
mod error;
mod geometry;
mod links;
mod mapping;
mod request;
mod sequence;
mod source;
mod sql;
mod sql_functions;
mod sqlite;
mod types;

pub use assembler::FeatureAssembler;
pub use cache::{DEFAULT_TTL, TtlCache};
pub use config::{FieldMappingSource, ProviderConfig};
pub use crs::{CRS84_URI, CrsId, CrsTransform, CrsTransformSpec};
pub use error::{FeatureError, Result};
pub use geometry::{Coord, GEOGRAPHIC_PRECISION, Geometry, PROJECTED_PRECISION, Reprojector};
pub use links::{LinkDescriptor, LinkRenderer, TemplateError, normalize_navigation};
pub use mapping::{
    CodelistFetcher, FieldMappingResolver, FieldMappingTable, HttpCodelistFetcher,
    ReferenceTable, parse_gml_dictionary,
};
pub use request::RequestContext;
pub use sequence::{IdentifierSequenceCache, Neighbors};
pub use source::{DEFAULT_LIMIT, FeatureQuery, ResultType, RowSource, SortKey};
pub use sql_functions::register_spatial_functions;
pub use sqlite::SqliteRowSource;
pub use types::{ColumnSet, ColumnSpec, ColumnType, RawRecord, TableIdentity, Value};
