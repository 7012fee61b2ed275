use std::collections::BTreeMap;

/// What the hosting API knows about the current request.
///
/// Attributes are URLs the host computed itself (`root_url`, `host_url`,
/// `base_url`). Values are explicit keys passed along by the host. Header
/// names are matched case-insensitively.
#[derive(Clone, Debug, Default)]
pub struct RequestContext {
    attributes: BTreeMap<String, String>,
    values: BTreeMap<String, String>,
    headers: BTreeMap<String, String>,
}

impl RequestContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_attribute(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.attributes.insert(name.into(), value.into());
        self
    }

    pub fn with_value(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.values.insert(name.into(), value.into());
        self
    }

    pub fn with_header(mut self, name: &str, value: impl Into<String>) -> Self {
        self.headers.insert(name.to_ascii_lowercase(), value.into());
        self
    }

    pub fn attribute(&self, name: &str) -> Option<&str> {
        self.attributes.get(name).map(String::as_str)
    }

    pub fn value(&self, name: &str) -> Option<&str> {
        self.values.get(name).map(String::as_str)
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .get(&name.to_ascii_lowercase())
            .map(String::as_str)
    }
}

#[cfg(test)]
mod tests {
    use super::RequestContext;

    #[test]
    fn headers_ignore_case() {
        let request = RequestContext::new().with_header("X-Forwarded-Host", "example.org");
        assert_eq!(request.header("x-forwarded-host"), Some("example.org"));
        assert_eq!(request.header("X-FORWARDED-HOST"), Some("example.org"));
        assert_eq!(request.header("Forwarded"), None);
    }
}
