//! Feature and collection documents built from raw store rows.

use std::collections::HashSet;
use std::sync::Arc;

use serde_json::{Map, Value as JsonValue, json};
use tracing::{debug, warn};

use crate::config::ProviderConfig;
use crate::conversions::{column_type_to_json_type, value_to_json};
use crate::crs::{CrsId, CrsTransform, CrsTransformSpec};
use crate::error::{FeatureError, Result};
use crate::geometry::Reprojector;
use crate::links::LinkRenderer;
use crate::mapping::{CodelistFetcher, FieldMappingResolver, FieldMappingTable, HttpCodelistFetcher, ReferenceTable};
use crate::request::RequestContext;
use crate::sequence::IdentifierSequenceCache;
use crate::source::{FeatureQuery, ResultType, RowSource};
use crate::types::{ColumnType, RawRecord, Value};

/// Per-request rendering state shared by every feature of a response.
struct RenderContext<'a> {
    transform: Option<CrsTransform>,
    target: CrsId,
    mapping: Arc<FieldMappingTable>,
    select_properties: &'a [String],
    skip_geometry: bool,
}

/// Turns rows of a [`RowSource`] into GeoJSON features.
///
/// The assembler owns the mapping and identifier caches of its table, so one
/// instance should serve every request for that table.
pub struct FeatureAssembler<S> {
    source: S,
    config: ProviderConfig,
    storage_crs: CrsId,
    reprojector: Reprojector,
    mappings: FieldMappingResolver,
    sequences: IdentifierSequenceCache,
    links: LinkRenderer,
}

impl<S> std::fmt::Debug for FeatureAssembler<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FeatureAssembler")
            .field("table", &self.config.identity())
            .field("storage_crs", &self.storage_crs)
            .field("mappings", &self.mappings)
            .field("sequences", &self.sequences)
            .finish()
    }
}

impl<S: RowSource + ReferenceTable> FeatureAssembler<S> {
    /// Build an assembler that fetches codelists over HTTP.
    pub fn new(source: S, config: ProviderConfig) -> Result<Self> {
        let fetcher = Arc::new(HttpCodelistFetcher::new()?);
        Self::with_fetcher(source, config, fetcher)
    }

    pub fn with_fetcher(
        source: S,
        config: ProviderConfig,
        fetcher: Arc<dyn CodelistFetcher>,
    ) -> Result<Self> {
        config.validate()?;
        let storage_crs = CrsId::parse(&config.storage_crs)?;
        let mappings = FieldMappingResolver::new(
            config.field_mappings.clone(),
            source.identity().to_string(),
            config.schema.clone(),
            fetcher,
            config.cache_ttl(),
        );
        let links = LinkRenderer::new(
            &config.links,
            config.navigation.as_ref(),
            config.base_url.clone(),
        );
        Ok(Self {
            reprojector: Reprojector::new(config.linearize_curves),
            sequences: IdentifierSequenceCache::new(config.cache_ttl()),
            source,
            config,
            storage_crs,
            mappings,
            links,
        })
    }

    pub fn source(&self) -> &S {
        &self.source
    }

    pub fn config(&self) -> &ProviderConfig {
        &self.config
    }

    pub fn sequences(&self) -> &IdentifierSequenceCache {
        &self.sequences
    }

    /// A page of features as a `FeatureCollection`.
    pub fn query(
        &self,
        query: &FeatureQuery,
        directive: Option<&CrsTransformSpec>,
        request: Option<&RequestContext>,
    ) -> Result<JsonValue> {
        let ctx = self.render_context(directive, &query.select_properties, query.skip_geometry)?;
        let matched = self.source.count(query)?;

        let features = match query.result_type {
            ResultType::Hits => Vec::new(),
            ResultType::Results => self
                .source
                .rows(query)?
                .into_iter()
                .map(|record| self.assemble(record, &ctx, request, false))
                .collect::<Result<Vec<_>>>()?,
        };
        debug!(
            table = %self.source.identity(),
            matched,
            returned = features.len(),
            "assembled feature collection"
        );

        let mut collection = Map::new();
        collection.insert("type".to_string(), json!("FeatureCollection"));
        if let Some(crs) = ctx.target.geojson_crs_member() {
            collection.insert("crs".to_string(), crs);
        }
        let returned = features.len();
        collection.insert("features".to_string(), JsonValue::Array(features));
        collection.insert("numberMatched".to_string(), json!(matched));
        collection.insert("numberReturned".to_string(), json!(returned));
        Ok(JsonValue::Object(collection))
    }

    /// One feature with circular `prev`/`next` identifiers.
    pub fn get(
        &self,
        id: &str,
        directive: Option<&CrsTransformSpec>,
        request: Option<&RequestContext>,
    ) -> Result<JsonValue> {
        let record = self
            .source
            .get(id)?
            .ok_or_else(|| FeatureError::NotFound {
                identifier: id.to_string(),
            })?;
        let ctx = self.render_context(directive, &[], false)?;
        self.assemble(record, &ctx, request, true)
    }

    /// Field schema: a JSON type per property column, with enumerations for
    /// mapped fields.
    pub fn fields(&self) -> Map<String, JsonValue> {
        let mapping = self.mappings.table(&self.source);
        let excluded: HashSet<&str> = self
            .config
            .excluded_properties
            .iter()
            .map(String::as_str)
            .collect();

        self.source
            .columns()
            .property_columns()
            .filter(|column| !excluded.contains(column.name.as_str()))
            .map(|column| {
                let schema = mapping.enum_schema(&column.name).unwrap_or_else(|| {
                    json!({"type": column_type_to_json_type(column.column_type)})
                });
                (column.name.clone(), schema)
            })
            .collect()
    }

    fn render_context<'a>(
        &self,
        directive: Option<&CrsTransformSpec>,
        select_properties: &'a [String],
        skip_geometry: bool,
    ) -> Result<RenderContext<'a>> {
        let transform = directive.map(CrsTransform::from_spec).transpose()?;
        let target = match &transform {
            Some(transform) => transform.target_crs().clone(),
            None => self.storage_crs.clone(),
        };
        Ok(RenderContext {
            transform,
            target,
            mapping: self.mappings.table(&self.source),
            select_properties,
            skip_geometry,
        })
    }

    fn assemble(
        &self,
        mut record: RawRecord,
        ctx: &RenderContext<'_>,
        request: Option<&RequestContext>,
        navigate: bool,
    ) -> Result<JsonValue> {
        let columns = self.source.columns();
        record.retain(|name, _| columns.contains(name));

        let geometry = match columns.geometry().and_then(|name| record.remove(name)) {
            _ if ctx.skip_geometry => JsonValue::Null,
            None | Some(Value::Null) => JsonValue::Null,
            Some(Value::Blob(blob)) => {
                self.reprojector
                    .render(Some(blob.as_slice()), ctx.transform.as_ref(), &ctx.target)?
            }
            Some(other) => {
                return Err(FeatureError::InvalidGeometry(format!(
                    "geometry column holds a non-binary value: {other:?}"
                )));
            }
        };

        let id_value = record.remove(columns.primary_key()).unwrap_or(Value::Null);
        let id_key = id_value.to_key_string();
        let id = id_to_json(id_value);

        ctx.mapping.apply(&mut record);

        let mut properties = Map::new();
        for column in columns.property_columns() {
            if !self.is_selected(&column.name, ctx.select_properties) {
                continue;
            }
            let Some(value) = record.remove(&column.name) else {
                continue;
            };
            let column_type = if ctx.mapping.contains_field(&column.name) {
                None
            } else {
                Some(column.column_type)
            };
            properties.insert(column.name.clone(), value_to_json(value, column_type));
        }
        if self.config.nest_dotted_properties {
            properties = nest_dotted(properties);
        }

        let rendered_links = if self.links.is_empty() {
            Vec::new()
        } else {
            self.links.render(&id, &properties)
        };

        let mut feature = Map::new();
        feature.insert("type".to_string(), json!("Feature"));
        feature.insert("geometry".to_string(), geometry);
        feature.insert("id".to_string(), id);
        feature.insert("properties".to_string(), JsonValue::Object(properties));
        if let Some(crs) = ctx.target.geojson_crs_member() {
            feature.insert("crs".to_string(), crs);
        }

        if navigate {
            match &id_key {
                Some(key) => match self.sequences.neighbors(&self.source, key)? {
                    Some(neighbors) => {
                        feature.insert("prev".to_string(), self.key_to_json(neighbors.prev));
                        feature.insert("next".to_string(), self.key_to_json(neighbors.next));
                    }
                    None => warn!(
                        table = %self.source.identity(),
                        id = %key,
                        "navigation lookup missed; prev/next omitted"
                    ),
                },
                None => warn!(table = %self.source.identity(), "feature has no identifier"),
            }
        }

        self.links.attach(&mut feature, rendered_links, request);
        Ok(JsonValue::Object(feature))
    }

    fn is_selected(&self, name: &str, select_properties: &[String]) -> bool {
        let wanted = if !select_properties.is_empty() {
            select_properties.iter().any(|p| p == name)
        } else if !self.config.properties.is_empty() {
            self.config.properties.iter().any(|p| p == name)
        } else {
            true
        };
        wanted && !self.config.excluded_properties.iter().any(|p| p == name)
    }

    /// Navigation identifiers take the JSON type of the key column.
    fn key_to_json(&self, key: String) -> JsonValue {
        let columns = self.source.columns();
        let integer_key = columns
            .get(columns.primary_key())
            .is_some_and(|column| column.column_type == ColumnType::Integer);
        match key.parse::<i64>() {
            Ok(v) if integer_key => JsonValue::from(v),
            _ => JsonValue::String(key),
        }
    }
}

fn id_to_json(value: Value) -> JsonValue {
    match value {
        Value::Integer(v) => JsonValue::from(v),
        Value::Text(v) => JsonValue::String(v),
        other => other
            .to_key_string()
            .map(JsonValue::String)
            .unwrap_or(JsonValue::Null),
    }
}

/// Turn `a.b.c` keys into nested objects.
///
/// Keys that would collide with an existing non-object value stay flat.
fn nest_dotted(flat: Map<String, JsonValue>) -> Map<String, JsonValue> {
    fn insert_path(
        map: &mut Map<String, JsonValue>,
        parts: &[&str],
        value: JsonValue,
    ) -> std::result::Result<(), JsonValue> {
        match parts {
            [] => Err(value),
            [last] => {
                if map.contains_key(*last) {
                    return Err(value);
                }
                map.insert(last.to_string(), value);
                Ok(())
            }
            [first, rest @ ..] => {
                let child = map
                    .entry(first.to_string())
                    .or_insert_with(|| JsonValue::Object(Map::new()));
                match child.as_object_mut() {
                    Some(child) => insert_path(child, rest, value),
                    None => Err(value),
                }
            }
        }
    }

    let (dotted, plain): (Vec<_>, Vec<_>) = flat.into_iter().partition(|(key, _)| {
        key.contains('.') && key.split('.').all(|part| !part.is_empty())
    });

    let mut nested: Map<String, JsonValue> = plain.into_iter().collect();
    for (key, value) in dotted {
        let parts: Vec<&str> = key.split('.').collect();
        if let Err(value) = insert_path(&mut nested, &parts, value) {
            nested.insert(key, value);
        }
    }
    nested
}
