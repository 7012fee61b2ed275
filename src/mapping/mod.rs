//! Field value mappings: raw codes replaced by human-readable labels.
//!
//! Labels come from remote GML codelists or from reference tables. All
//! mapped fields of one table are built together into a [`FieldMappingTable`]
//! that is cached per namespace. A field whose source fails is logged and
//! left unmapped, without affecting the other fields.

mod codelist;

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use serde_json::{Value as JsonValue, json};
use tracing::{debug, warn};

use crate::cache::TtlCache;
use crate::config::FieldMappingSource;
use crate::error::Result;
use crate::types::{RawRecord, Value};

pub use codelist::{CodelistFetcher, HttpCodelistFetcher, parse_gml_dictionary};

/// Store access needed to build mappings from reference tables.
pub trait ReferenceTable {
    /// Return `(id_column, value_column)` of every row of `schema.table`,
    /// both stringified.
    fn code_pairs(
        &self,
        schema: &str,
        table: &str,
        id_column: &str,
        value_column: &str,
    ) -> Result<Vec<(String, String)>>;
}

/// Ordered `(code, label)` pairs for every successfully mapped field.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct FieldMappingTable {
    fields: BTreeMap<String, Vec<(String, String)>>,
}

impl FieldMappingTable {
    pub fn new(fields: BTreeMap<String, Vec<(String, String)>>) -> Self {
        Self { fields }
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn contains_field(&self, field: &str) -> bool {
        self.fields.contains_key(field)
    }

    pub fn entries(&self, field: &str) -> Option<&[(String, String)]> {
        self.fields.get(field).map(Vec::as_slice)
    }

    /// First label whose code equals `code` exactly.
    pub fn lookup(&self, field: &str, code: &str) -> Option<&str> {
        self.fields
            .get(field)?
            .iter()
            .find(|(c, _)| c == code)
            .map(|(_, label)| label.as_str())
    }

    /// Replace mapped values in `record` with their labels.
    ///
    /// Values without a matching code, and `NULL`s, are left as they are.
    pub fn apply(&self, record: &mut RawRecord) {
        for (field, value) in record.iter_mut() {
            if !self.fields.contains_key(field) {
                continue;
            }
            let Some(code) = value.to_key_string() else {
                continue;
            };
            if let Some(label) = self.lookup(field, &code) {
                *value = Value::Text(label.to_string());
            }
        }
    }

    /// Enumerated-value schema for a mapped field.
    pub fn enum_schema(&self, field: &str) -> Option<JsonValue> {
        let entries = self.fields.get(field)?;
        let labels: Vec<&str> = entries.iter().map(|(_, label)| label.as_str()).collect();
        let codes: Vec<&str> = entries.iter().map(|(code, _)| code.as_str()).collect();
        Some(json!({
            "type": "string",
            "enum": labels,
            "x-codes": codes,
        }))
    }
}

/// Builds and caches the mapping table of one provider.
pub struct FieldMappingResolver {
    declarations: BTreeMap<String, FieldMappingSource>,
    namespace: String,
    schema: String,
    fetcher: Arc<dyn CodelistFetcher>,
    cache: TtlCache<String, FieldMappingTable>,
}

impl std::fmt::Debug for FieldMappingResolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FieldMappingResolver")
            .field("namespace", &self.namespace)
            .field("fields", &self.declarations.keys().collect::<Vec<_>>())
            .field("cache", &self.cache)
            .finish()
    }
}

impl FieldMappingResolver {
    pub fn new(
        declarations: BTreeMap<String, FieldMappingSource>,
        namespace: impl Into<String>,
        schema: impl Into<String>,
        fetcher: Arc<dyn CodelistFetcher>,
        ttl: Duration,
    ) -> Self {
        Self {
            declarations,
            namespace: namespace.into(),
            schema: schema.into(),
            fetcher,
            cache: TtlCache::new(ttl),
        }
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    /// The mapping table for this namespace, built on first use and after expiry.
    pub fn table(&self, reference: &dyn ReferenceTable) -> Arc<FieldMappingTable> {
        if self.declarations.is_empty() {
            return Arc::new(FieldMappingTable::default());
        }
        self.cache
            .get_or_insert_with(self.namespace.clone(), || self.build(reference))
    }

    fn build(&self, reference: &dyn ReferenceTable) -> FieldMappingTable {
        let mut fields = BTreeMap::new();

        for (field, source) in &self.declarations {
            let result = match source {
                FieldMappingSource::Codelist { codelist } => self
                    .fetcher
                    .fetch(codelist)
                    .and_then(|doc| parse_gml_dictionary(&doc)),
                FieldMappingSource::Table {
                    table,
                    id_field,
                    value_field,
                } => reference.code_pairs(&self.schema, table, id_field, value_field),
            };

            match result {
                Ok(entries) => {
                    fields.insert(field.clone(), entries);
                }
                Err(err) => warn!(
                    namespace = %self.namespace,
                    field = %field,
                    "could not build field mapping: {err}"
                ),
            }
        }

        debug!(
            namespace = %self.namespace,
            fields = fields.len(),
            "built field mapping table"
        );
        FieldMappingTable::new(fields)
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::{CodelistFetcher, FieldMappingResolver, FieldMappingTable, ReferenceTable};
    use crate::Result;
    use crate::config::FieldMappingSource;
    use crate::error::FeatureError;
    use crate::types::{RawRecord, Value};
    use serde_json::json;
    use std::collections::{BTreeMap, HashMap};
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    /// Serves canned documents and counts requests.
    #[derive(Default)]
    pub(crate) struct StubFetcher {
        pub documents: HashMap<String, String>,
        pub calls: AtomicUsize,
    }

    impl CodelistFetcher for StubFetcher {
        fn fetch(&self, url: &str) -> Result<String> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.documents
                .get(url)
                .cloned()
                .ok_or(FeatureError::ConnectionPoisoned)
        }
    }

    struct StubReference;

    impl ReferenceTable for StubReference {
        fn code_pairs(
            &self,
            schema: &str,
            table: &str,
            _id_column: &str,
            _value_column: &str,
        ) -> Result<Vec<(String, String)>> {
            assert_eq!(schema, "main");
            match table {
                "status_codes" => Ok(vec![
                    ("3".to_string(), "Active".to_string()),
                    ("4".to_string(), "Retired".to_string()),
                ]),
                _ => Err(FeatureError::Sql(rusqlite::Error::InvalidQuery)),
            }
        }
    }

    pub(crate) fn kinds_dictionary() -> String {
        r#"<gml:Dictionary xmlns:gml="http://www.opengis.net/gml/3.2">
  <gml:dictionaryEntry><gml:Definition>
    <gml:identifier>b</gml:identifier><gml:name>Building</gml:name>
  </gml:Definition></gml:dictionaryEntry>
</gml:Dictionary>"#
            .to_string()
    }

    fn table_source(table: &str) -> FieldMappingSource {
        FieldMappingSource::Table {
            table: table.to_string(),
            id_field: "code".to_string(),
            value_field: "label".to_string(),
        }
    }

    #[test]
    fn applies_labels_and_passes_unmatched_values() {
        let table = FieldMappingTable::new(BTreeMap::from([(
            "status".to_string(),
            vec![("3".to_string(), "Active".to_string())],
        )]));

        let mut record = RawRecord::from([
            ("status".to_string(), Value::Integer(3)),
            ("name".to_string(), Value::from("3")),
        ]);
        table.apply(&mut record);
        assert_eq!(record["status"], Value::from("Active"));
        assert_eq!(record["name"], Value::from("3"));

        let mut record = RawRecord::from([("status".to_string(), Value::from("9"))]);
        table.apply(&mut record);
        assert_eq!(record["status"], Value::from("9"));

        let mut record = RawRecord::from([("status".to_string(), Value::Null)]);
        table.apply(&mut record);
        assert_eq!(record["status"], Value::Null);
    }

    #[test]
    fn failing_sources_are_omitted() {
        let fetcher = Arc::new(StubFetcher {
            documents: HashMap::from([("https://example.org/kinds".to_string(), kinds_dictionary())]),
            ..Default::default()
        });
        let declarations = BTreeMap::from([
            (
                "kind".to_string(),
                FieldMappingSource::Codelist {
                    codelist: "https://example.org/kinds".to_string(),
                },
            ),
            (
                "missing".to_string(),
                FieldMappingSource::Codelist {
                    codelist: "https://example.org/unreachable".to_string(),
                },
            ),
            ("status".to_string(), table_source("status_codes")),
            ("broken".to_string(), table_source("no_such_table")),
        ]);
        let resolver = FieldMappingResolver::new(
            declarations,
            "main.main.parcels",
            "main",
            fetcher,
            Duration::from_secs(60),
        );

        let table = resolver.table(&StubReference);
        assert_eq!(table.lookup("kind", "b"), Some("Building"));
        assert_eq!(table.lookup("status", "4"), Some("Retired"));
        assert!(!table.contains_field("missing"));
        assert!(!table.contains_field("broken"));
    }

    #[test]
    fn table_is_cached_per_namespace() {
        let fetcher = Arc::new(StubFetcher {
            documents: HashMap::from([("https://example.org/kinds".to_string(), kinds_dictionary())]),
            ..Default::default()
        });
        let declarations = BTreeMap::from([(
            "kind".to_string(),
            FieldMappingSource::Codelist {
                codelist: "https://example.org/kinds".to_string(),
            },
        )]);
        let resolver = FieldMappingResolver::new(
            declarations,
            "main.main.parcels",
            "main",
            Arc::clone(&fetcher) as Arc<dyn CodelistFetcher>,
            Duration::from_secs(60),
        );

        let first = resolver.table(&StubReference);
        let second = resolver.table(&StubReference);
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(fetcher.calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn publishes_enum_schema() {
        let table = FieldMappingTable::new(BTreeMap::from([(
            "status".to_string(),
            vec![
                ("3".to_string(), "Active".to_string()),
                ("4".to_string(), "Retired".to_string()),
            ],
        )]));
        assert_eq!(
            table.enum_schema("status"),
            Some(json!({"type": "string", "enum": ["Active", "Retired"], "x-codes": ["3", "4"]}))
        );
        assert_eq!(table.enum_schema("other"), None);
    }
}
