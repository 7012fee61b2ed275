//! Templated feature links.
//!
//! Descriptors are rendered against the feature id and its properties, then
//! resolved to absolute URLs against a base derived from the request. A
//! descriptor that cannot be rendered or resolved is dropped with a warning;
//! link failures never fail the feature.

mod base_url;
mod template;

use std::collections::HashSet;

use serde_json::{Map, Value as JsonValue};
use tracing::warn;
use url::Url;

use crate::request::RequestContext;

pub use template::TemplateError;

pub(crate) use base_url::{absolute_href, normalize_base, resolve_base, resolve_href};

const DEFAULT_REL: &str = "related";
const DEFAULT_TYPE: &str = "application/json";
const TEMPLATE_KEYS: [&str; 3] = ["template", "href", "path"];
const TAG_KEYS: [&str; 3] = ["tag", "rel", "name"];

/// One link object: `href`, `rel`, `type` and any extra members.
pub type LinkDescriptor = Map<String, JsonValue>;

/// Turn legacy `navigation` settings into link descriptors with `rel` = tag.
///
/// Accepts `{tag: template}`, `{tag: {template|href|path}}` and
/// `[{tag|rel|name, template|href|path}]`. Malformed entries are skipped.
pub fn normalize_navigation(navigation: &JsonValue) -> Vec<LinkDescriptor> {
    fn template_in(map: &Map<String, JsonValue>) -> Option<&str> {
        TEMPLATE_KEYS
            .iter()
            .find_map(|key| map.get(*key).and_then(JsonValue::as_str))
            .filter(|s| !s.is_empty())
    }

    fn template_of(value: &JsonValue) -> Option<&str> {
        match value {
            JsonValue::String(s) => Some(s.as_str()),
            JsonValue::Object(map) => template_in(map),
            _ => None,
        }
    }

    fn descriptor(tag: &str, template: &str) -> LinkDescriptor {
        let mut map = Map::new();
        map.insert("rel".to_string(), JsonValue::from(tag));
        map.insert("href".to_string(), JsonValue::from(template));
        map
    }

    match navigation {
        JsonValue::Object(map) => map
            .iter()
            .filter(|(tag, _)| !tag.is_empty())
            .filter_map(|(tag, value)| template_of(value).map(|t| descriptor(tag, t)))
            .collect(),
        JsonValue::Array(items) => items
            .iter()
            .filter_map(JsonValue::as_object)
            .filter_map(|item| {
                let tag = TAG_KEYS
                    .iter()
                    .find_map(|key| item.get(*key).and_then(JsonValue::as_str))
                    .filter(|s| !s.is_empty())?;
                let template = template_in(item)?;
                Some(descriptor(tag, template))
            })
            .collect(),
        _ => Vec::new(),
    }
}

/// Renders the configured link descriptors of one provider.
#[derive(Clone, Debug, Default)]
pub struct LinkRenderer {
    descriptors: Vec<LinkDescriptor>,
    configured_base: Option<String>,
}

impl LinkRenderer {
    pub fn new(
        links: &[LinkDescriptor],
        navigation: Option<&JsonValue>,
        configured_base: Option<String>,
    ) -> Self {
        let mut descriptors = links.to_vec();
        if let Some(navigation) = navigation {
            descriptors.extend(normalize_navigation(navigation));
        }
        Self {
            descriptors,
            configured_base,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.descriptors.is_empty()
    }

    /// Render every descriptor for the feature `id` with `properties`.
    ///
    /// Properties shadow `id` when they define it. Hrefs are still unresolved.
    pub fn render(&self, id: &JsonValue, properties: &Map<String, JsonValue>) -> Vec<LinkDescriptor> {
        let mut context = Map::with_capacity(properties.len() + 1);
        context.insert("id".to_string(), id.clone());
        for (key, value) in properties {
            context.insert(key.clone(), value.clone());
        }

        let mut rendered = Vec::with_capacity(self.descriptors.len());
        for descriptor in &self.descriptors {
            let rel = descriptor
                .get("rel")
                .and_then(JsonValue::as_str)
                .unwrap_or(DEFAULT_REL);
            let mut link = match template::render_value(&JsonValue::Object(descriptor.clone()), &context) {
                Ok(JsonValue::Object(link)) => link,
                Ok(_) => continue,
                Err(err) => {
                    warn!(rel, id = %id, "link template could not be rendered: {err}");
                    continue;
                }
            };
            if !link.get("href").is_some_and(JsonValue::is_string) {
                warn!(rel, id = %id, "link template has no href");
                continue;
            }
            link.entry("rel")
                .or_insert_with(|| JsonValue::from(DEFAULT_REL));
            link.entry("type")
                .or_insert_with(|| JsonValue::from(DEFAULT_TYPE));
            rendered.push(link);
        }
        rendered
    }

    /// Resolve rendered links against the request base and append them to
    /// `feature["links"]`, skipping `(rel, href)` pairs already present.
    pub fn attach(
        &self,
        feature: &mut Map<String, JsonValue>,
        rendered: Vec<LinkDescriptor>,
        request: Option<&RequestContext>,
    ) {
        if rendered.is_empty() {
            return;
        }

        let base = resolve_base(request, self.configured_base.as_deref())
            .or_else(|| fallback_base(feature));

        let mut resolved = Vec::with_capacity(rendered.len());
        for mut link in rendered {
            let href = link
                .get("href")
                .and_then(JsonValue::as_str)
                .unwrap_or_default()
                .to_string();
            let absolute = match &base {
                Some(base) => resolve_href(&href, base),
                None => absolute_href(&href),
            };
            match absolute {
                Some(url) => {
                    link.insert("href".to_string(), JsonValue::from(String::from(url)));
                    resolved.push(link);
                }
                None => warn!(href = %href, "link href has no absolute form; dropped"),
            }
        }

        merge_links(feature, resolved);
    }
}

/// An existing `self` or `collection` link of the feature, as a base.
fn fallback_base(feature: &Map<String, JsonValue>) -> Option<Url> {
    let links = feature.get("links")?.as_array()?;
    ["self", "collection"].iter().find_map(|wanted| {
        links
            .iter()
            .filter_map(JsonValue::as_object)
            .filter(|link| link.get("rel").and_then(JsonValue::as_str) == Some(*wanted))
            .find_map(|link| link.get("href").and_then(JsonValue::as_str).and_then(normalize_base))
    })
}

fn link_key(link: &Map<String, JsonValue>) -> (String, String) {
    let field = |name: &str| {
        link.get(name)
            .and_then(JsonValue::as_str)
            .unwrap_or_default()
            .to_string()
    };
    (field("rel"), field("href"))
}

/// Append `links` to `feature["links"]`, one entry per `(rel, href)`.
pub(crate) fn merge_links(feature: &mut Map<String, JsonValue>, links: Vec<LinkDescriptor>) {
    if links.is_empty() {
        return;
    }

    let existing = feature
        .entry("links")
        .or_insert_with(|| JsonValue::Array(Vec::new()));
    if !existing.is_array() {
        *existing = JsonValue::Array(Vec::new());
    }
    let Some(existing) = existing.as_array_mut() else {
        return;
    };

    let mut seen: HashSet<(String, String)> = existing
        .iter()
        .filter_map(JsonValue::as_object)
        .map(link_key)
        .collect();
    for link in links {
        if seen.insert(link_key(&link)) {
            existing.push(JsonValue::Object(link));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{LinkRenderer, normalize_navigation};
    use crate::request::RequestContext;
    use serde_json::{Map, Value as JsonValue, json};

    fn object(value: JsonValue) -> Map<String, JsonValue> {
        match value {
            JsonValue::Object(map) => map,
            _ => Map::new(),
        }
    }

    fn geoapi_request() -> RequestContext {
        RequestContext::new().with_attribute("base_url", "https://example.org/geoapi/")
    }

    #[test]
    fn rooted_href_keeps_mount_prefix() {
        let renderer = LinkRenderer::new(&[object(json!({"href": "/items/{id}"}))], None, None);
        let mut feature = object(json!({"type": "Feature"}));

        let rendered = renderer.render(&json!(42), &Map::new());
        renderer.attach(&mut feature, rendered, Some(&geoapi_request()));

        let links = feature["links"].as_array().expect("links");
        assert_eq!(links.len(), 1);
        assert!(links[0]["href"].as_str().is_some_and(|h| h.ends_with("/geoapi/items/42")));
        assert_eq!(links[0]["rel"], json!("related"));
        assert_eq!(links[0]["type"], json!("application/json"));
    }

    #[test]
    fn unresolved_placeholder_drops_the_link() {
        let renderer = LinkRenderer::new(
            &[
                object(json!({"href": "/x/{missing_field}"})),
                object(json!({"href": "/owners/{owner}", "rel": "owner"})),
                object(json!({"title": "no href"})),
            ],
            None,
            None,
        );
        let rendered = renderer.render(&json!(1), &object(json!({"owner": "ada"})));
        assert_eq!(rendered.len(), 1);
        assert_eq!(rendered[0]["href"], json!("/owners/ada"));
    }

    #[test]
    fn merging_twice_keeps_one_entry_per_pair() {
        let renderer = LinkRenderer::new(
            &[object(json!({"href": "/items/{id}", "rel": "alternate"}))],
            None,
            None,
        );
        let mut feature = object(json!({"type": "Feature"}));
        for _ in 0..2 {
            let rendered = renderer.render(&json!(7), &Map::new());
            renderer.attach(&mut feature, rendered, Some(&geoapi_request()));
        }
        assert_eq!(feature["links"].as_array().map(Vec::len), Some(1));
    }

    #[test]
    fn existing_self_link_serves_as_base() {
        let renderer = LinkRenderer::new(&[object(json!({"href": "/items/{id}"}))], None, None);
        let mut feature = object(json!({
            "links": [{"rel": "self", "href": "https://host.example/api/collections/p/items/3"}]
        }));
        let rendered = renderer.render(&json!(3), &Map::new());
        renderer.attach(&mut feature, rendered, None);
        assert_eq!(
            feature["links"][1]["href"],
            json!("https://host.example/api/items/3")
        );
    }

    #[test]
    fn links_without_any_base_are_dropped() {
        let renderer = LinkRenderer::new(
            &[
                object(json!({"href": "/items/{id}"})),
                object(json!({"href": "https://elsewhere.example/{id}"})),
                object(json!({"href": "urn:item:{id}"})),
            ],
            None,
            None,
        );
        let mut feature = object(json!({"type": "Feature"}));
        let rendered = renderer.render(&json!(5), &Map::new());
        renderer.attach(&mut feature, rendered, None);
        assert_eq!(
            feature["links"],
            json!([{"href": "https://elsewhere.example/5", "rel": "related", "type": "application/json"}])
        );
    }

    #[test]
    fn normalizes_legacy_navigation() {
        let from_map = normalize_navigation(&json!({
            "parent": "/collections/p/items/{parent_id}",
            "owner": {"path": "/owners/{owner}"},
            "broken": {"title": "x"},
        }));
        assert_eq!(
            from_map,
            vec![
                object(json!({"rel": "parent", "href": "/collections/p/items/{parent_id}"})),
                object(json!({"rel": "owner", "href": "/owners/{owner}"})),
            ]
        );

        let from_list = normalize_navigation(&json!([
            {"name": "up", "template": "/up/{id}"},
            {"template": "/no-tag"},
            "not an object",
        ]));
        assert_eq!(from_list, vec![object(json!({"rel": "up", "href": "/up/{id}"}))]);
    }
}
