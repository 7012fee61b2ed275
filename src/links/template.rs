use std::fmt;

use serde_json::{Map, Value as JsonValue};

/// Why a template could not be rendered.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TemplateError {
    /// The placeholder has no value in the context, or its value is null.
    Unresolved(String),
    /// A lone `{` or `}`.
    UnbalancedBrace(usize),
}

impl fmt::Display for TemplateError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unresolved(name) => write!(f, "missing property \"{name}\""),
            Self::UnbalancedBrace(pos) => write!(f, "unbalanced brace at offset {pos}"),
        }
    }
}

impl std::error::Error for TemplateError {}

/// Look up a placeholder in the context.
///
/// An exact top-level key wins; otherwise the dotted path walks nested
/// objects. Null counts as absent.
pub(crate) fn lookup<'a>(context: &'a Map<String, JsonValue>, name: &str) -> Option<&'a JsonValue> {
    if let Some(value) = context.get(name) {
        return (!value.is_null()).then_some(value);
    }

    let mut segments = name.split('.');
    let mut current = context.get(segments.next()?)?;
    for segment in segments {
        current = current.as_object()?.get(segment)?;
    }
    (!current.is_null()).then_some(current)
}

fn stringify(value: &JsonValue) -> String {
    match value {
        JsonValue::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Substitute `{name}` placeholders. `{{` and `}}` are literal braces.
pub(crate) fn render_str(
    template: &str,
    context: &Map<String, JsonValue>,
) -> Result<String, TemplateError> {
    let mut out = String::with_capacity(template.len());
    let mut chars = template.char_indices().peekable();

    while let Some((pos, c)) = chars.next() {
        match c {
            '{' if chars.peek().is_some_and(|(_, next)| *next == '{') => {
                chars.next();
                out.push('{');
            }
            '}' if chars.peek().is_some_and(|(_, next)| *next == '}') => {
                chars.next();
                out.push('}');
            }
            '{' => {
                let mut name = String::new();
                let mut closed = false;
                for (_, c) in chars.by_ref() {
                    match c {
                        '}' => {
                            closed = true;
                            break;
                        }
                        '{' => return Err(TemplateError::UnbalancedBrace(pos)),
                        c => name.push(c),
                    }
                }
                if !closed {
                    return Err(TemplateError::UnbalancedBrace(pos));
                }
                let name = name.trim();
                let value = lookup(context, name)
                    .ok_or_else(|| TemplateError::Unresolved(name.to_string()))?;
                out.push_str(&stringify(value));
            }
            '}' => return Err(TemplateError::UnbalancedBrace(pos)),
            c => out.push(c),
        }
    }

    Ok(out)
}

/// Render every string inside `value`, recursing into arrays and objects.
///
/// The first failure anywhere aborts the whole value.
pub(crate) fn render_value(
    value: &JsonValue,
    context: &Map<String, JsonValue>,
) -> Result<JsonValue, TemplateError> {
    Ok(match value {
        JsonValue::String(s) => JsonValue::String(render_str(s, context)?),
        JsonValue::Array(items) => JsonValue::Array(
            items
                .iter()
                .map(|item| render_value(item, context))
                .collect::<Result<Vec<_>, _>>()?,
        ),
        JsonValue::Object(map) => {
            let mut rendered = Map::with_capacity(map.len());
            for (key, item) in map {
                rendered.insert(key.clone(), render_value(item, context)?);
            }
            JsonValue::Object(rendered)
        }
        other => other.clone(),
    })
}

#[cfg(test)]
mod tests {
    use super::{TemplateError, render_str, render_value};
    use serde_json::{Map, Value as JsonValue, json};

    fn context() -> Map<String, JsonValue> {
        let JsonValue::Object(map) = json!({
            "id": 42,
            "name": "Plot A",
            "owner": {"city": "Bonn", "zip": null},
            "address.street": "Main",
            "empty": null,
        }) else {
            unreachable!()
        };
        map
    }

    #[test]
    fn substitutes_flat_and_dotted_placeholders() {
        let ctx = context();
        assert_eq!(render_str("/items/{id}", &ctx).as_deref(), Ok("/items/42"));
        assert_eq!(render_str("{owner.city}/{name}", &ctx).as_deref(), Ok("Bonn/Plot A"));
        assert_eq!(render_str("{address.street}", &ctx).as_deref(), Ok("Main"));
    }

    #[test]
    fn doubled_braces_are_literal() {
        let ctx = context();
        assert_eq!(render_str("{{id}}={id}", &ctx).as_deref(), Ok("{id}=42"));
    }

    #[test]
    fn missing_and_null_values_are_unresolved() {
        let ctx = context();
        assert_eq!(
            render_str("{missing_field}", &ctx),
            Err(TemplateError::Unresolved("missing_field".to_string()))
        );
        assert!(render_str("{empty}", &ctx).is_err());
        assert!(render_str("{owner.zip}", &ctx).is_err());
        assert!(render_str("{name.first}", &ctx).is_err());
    }

    #[test]
    fn unbalanced_braces_fail() {
        let ctx = context();
        assert_eq!(render_str("/items/{id", &ctx), Err(TemplateError::UnbalancedBrace(7)));
        assert!(render_str("/items/id}", &ctx).is_err());
    }

    #[test]
    fn nested_values_fail_as_a_whole() {
        let ctx = context();
        let rendered = render_value(&json!({"href": "/{id}", "meta": ["{name}", 1]}), &ctx);
        assert_eq!(rendered, Ok(json!({"href": "/42", "meta": ["Plot A", 1]})));

        let broken = render_value(&json!({"href": "/{id}", "meta": {"x": "{nope}"}}), &ctx);
        assert!(broken.is_err());
    }
}
