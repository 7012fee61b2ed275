//! The row source consumed by the feature assembler.

use crate::error::Result;
use crate::types::{ColumnSet, RawRecord, TableIdentity, Value};

/// Page size used when a query does not set one.
pub const DEFAULT_LIMIT: usize = 10;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum ResultType {
    /// Return the matching features.
    #[default]
    Results,
    /// Return only the number of matching features.
    Hits,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SortKey {
    pub property: String,
    pub ascending: bool,
}

impl SortKey {
    /// Parse `name`, `+name` or `-name`.
    pub fn parse(s: &str) -> Self {
        match s.strip_prefix('-') {
            Some(property) => Self {
                property: property.to_string(),
                ascending: false,
            },
            None => Self {
                property: s.trim_start_matches('+').to_string(),
                ascending: true,
            },
        }
    }
}

/// A paged query against a row source.
#[derive(Clone, Debug, PartialEq)]
pub struct FeatureQuery {
    pub offset: usize,
    pub limit: usize,
    pub result_type: ResultType,
    /// `[minx, miny, maxx, maxy]` in the storage CRS.
    pub bbox: Option<[f64; 4]>,
    /// Property equality filters, combined with AND.
    pub properties: Vec<(String, Value)>,
    pub sortby: Vec<SortKey>,
    /// Restrict output properties. Empty means the configured default.
    pub select_properties: Vec<String>,
    pub skip_geometry: bool,
}

impl Default for FeatureQuery {
    fn default() -> Self {
        Self {
            offset: 0,
            limit: DEFAULT_LIMIT,
            result_type: ResultType::Results,
            bbox: None,
            properties: Vec::new(),
            sortby: Vec::new(),
            select_properties: Vec::new(),
            skip_geometry: false,
        }
    }
}

/// Read access to one table of a relational store.
///
/// Records returned by a source contain every column of [`RowSource::columns`]
/// and may carry additional bookkeeping entries, which the assembler strips.
pub trait RowSource {
    fn identity(&self) -> &TableIdentity;

    fn columns(&self) -> &ColumnSet;

    /// Number of rows matching the filters of `query`; paging is ignored.
    fn count(&self, query: &FeatureQuery) -> Result<u64>;

    /// One page of rows matching `query`.
    fn rows(&self, query: &FeatureQuery) -> Result<Vec<RawRecord>>;

    /// The row whose primary key equals `id`, if any.
    fn get(&self, id: &str) -> Result<Option<RawRecord>>;

    /// Every primary key in ascending key order, stringified.
    fn ordered_ids(&self) -> Result<Vec<String>>;
}
