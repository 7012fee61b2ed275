//! Provider configuration.
//!
//! Loading configuration files is the host's job; this module only defines
//! the shape and defaults, deserialized with serde.
//!
//! ```
//! use rusqlite_features::ProviderConfig;
//!
//! let config = ProviderConfig::from_json_str(r#"{
//!     "table": "parcels",
//!     "field_mappings": {
//!         "status": {"table": "status_codes", "id_field": "code", "value_field": "label"}
//!     },
//!     "links": [{"rel": "alternate", "href": "/collections/parcels/items/{id}"}]
//! }"#)?;
//! assert_eq!(config.table, "parcels");
//! # Ok::<(), rusqlite_features::FeatureError>(())
//! ```

use std::collections::BTreeMap;
use std::time::Duration;

use serde::Deserialize;
use serde_json::{Map, Value as JsonValue};

use crate::cache::DEFAULT_TTL;
use crate::crs::CRS84_URI;
use crate::error::{FeatureError, Result};
use crate::types::TableIdentity;

/// Where the labels of a mapped field come from.
#[derive(Clone, Debug, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum FieldMappingSource {
    /// A GML dictionary published at a URL.
    Codelist { codelist: String },
    /// A reference table projected onto (code, label).
    Table {
        table: String,
        id_field: String,
        value_field: String,
    },
}

#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct ProviderConfig {
    /// Store identity used in cache namespaces.
    pub database: String,
    /// Schema holding the table and its reference tables.
    pub schema: String,
    pub table: String,
    /// Primary key column; detected from the table when absent.
    pub id_field: Option<String>,
    /// Geometry column; detected from the table when absent.
    pub geom_field: Option<String>,
    pub storage_crs: String,
    /// Properties returned by default. Empty means every column.
    pub properties: Vec<String>,
    pub excluded_properties: Vec<String>,
    pub field_mappings: BTreeMap<String, FieldMappingSource>,
    /// Link template descriptors.
    pub links: Vec<Map<String, JsonValue>>,
    /// Legacy navigation templates, either `{tag: template}` or a list of
    /// `{tag, template}` objects.
    pub navigation: Option<JsonValue>,
    pub base_url: Option<String>,
    pub linearize_curves: bool,
    /// Turn `a.b.c` property names into nested objects.
    pub nest_dotted_properties: bool,
    pub cache_ttl_secs: u64,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            database: "main".to_string(),
            schema: "main".to_string(),
            table: String::new(),
            id_field: None,
            geom_field: None,
            storage_crs: CRS84_URI.to_string(),
            properties: Vec::new(),
            excluded_properties: Vec::new(),
            field_mappings: BTreeMap::new(),
            links: Vec::new(),
            navigation: None,
            base_url: None,
            linearize_curves: true,
            nest_dotted_properties: false,
            cache_ttl_secs: DEFAULT_TTL.as_secs(),
        }
    }
}

impl ProviderConfig {
    pub fn from_json_str(s: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(s)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.table.is_empty() {
            return Err(FeatureError::InvalidConfig("table must be set".to_string()));
        }
        if self.cache_ttl_secs == 0 {
            return Err(FeatureError::InvalidConfig(
                "cache_ttl_secs must be positive".to_string(),
            ));
        }
        Ok(())
    }

    pub fn identity(&self) -> TableIdentity {
        TableIdentity::new(&self.database, &self.schema, &self.table)
    }

    pub fn cache_ttl(&self) -> Duration {
        Duration::from_secs(self.cache_ttl_secs)
    }
}
