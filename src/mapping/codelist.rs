use std::time::Duration;

use quick_xml::Reader;
use quick_xml::events::Event;

use crate::error::Result;

/// Retrieves codelist documents by URL.
pub trait CodelistFetcher: Send + Sync {
    fn fetch(&self, url: &str) -> Result<String>;
}

/// Blocking HTTP fetcher. Non-success statuses are errors.
#[derive(Debug, Clone)]
pub struct HttpCodelistFetcher {
    client: reqwest::blocking::Client,
}

impl HttpCodelistFetcher {
    pub fn new() -> Result<Self> {
        Self::with_timeouts(Duration::from_secs(5), Duration::from_secs(30))
    }

    pub fn with_timeouts(connect_timeout: Duration, request_timeout: Duration) -> Result<Self> {
        let client = reqwest::blocking::Client::builder()
            .connect_timeout(connect_timeout)
            .timeout(request_timeout)
            .build()?;
        Ok(Self { client })
    }
}

impl CodelistFetcher for HttpCodelistFetcher {
    fn fetch(&self, url: &str) -> Result<String> {
        let response = self.client.get(url).send()?.error_for_status()?;
        Ok(response.text()?)
    }
}

/// Extract `(identifier, name)` pairs from a GML dictionary.
///
/// Only `dictionaryEntry/Definition` elements directly under the root are
/// read. Entries without an identifier or a name are skipped, values are
/// trimmed and the result is sorted by identifier. Elements are matched by
/// local name, so any namespace prefix is accepted.
pub fn parse_gml_dictionary(xml: &str) -> Result<Vec<(String, String)>> {
    let mut reader = Reader::from_str(xml);

    let mut path: Vec<Vec<u8>> = Vec::new();
    let mut text = String::new();
    let mut identifier: Option<String> = None;
    let mut name: Option<String> = None;
    let mut entries = Vec::new();

    loop {
        match reader.read_event()? {
            Event::Start(e) => {
                path.push(e.local_name().as_ref().to_vec());
                if in_definition_field(&path) {
                    text.clear();
                }
            }
            Event::Text(t) if in_definition_field(&path) => text.push_str(&t.unescape()?),
            Event::CData(c) if in_definition_field(&path) => {
                text.push_str(&String::from_utf8_lossy(&c))
            }
            Event::End(_) => {
                if in_definition_field(&path) {
                    let value = text.trim().to_string();
                    match path.last().map(Vec::as_slice) {
                        Some(b"identifier") if identifier.is_none() => identifier = Some(value),
                        Some(b"name") if name.is_none() => name = Some(value),
                        _ => {}
                    }
                } else if is_definition(&path) {
                    if let (Some(id), Some(label)) = (identifier.take(), name.take()) {
                        if !id.is_empty() && !label.is_empty() {
                            entries.push((id, label));
                        }
                    }
                }
                path.pop();
            }
            Event::Eof => break,
            _ => {}
        }
    }

    entries.sort_by(|a, b| a.0.cmp(&b.0));
    Ok(entries)
}

fn is_definition(path: &[Vec<u8>]) -> bool {
    path.len() == 3 && path[1] == b"dictionaryEntry" && path[2] == b"Definition"
}

fn in_definition_field(path: &[Vec<u8>]) -> bool {
    path.len() == 4
        && is_definition(&path[..3])
        && matches!(path[3].as_slice(), b"identifier" | b"name")
}

#[cfg(test)]
mod tests {
    use super::parse_gml_dictionary;
    use crate::Result;

    const DICTIONARY: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<gml:Dictionary xmlns:gml="http://www.opengis.net/gml/3.2" gml:id="status">
  <gml:identifier codeSpace="urn:example">status</gml:identifier>
  <gml:dictionaryEntry>
    <gml:Definition gml:id="s3">
      <gml:identifier codeSpace="urn:example"> 3 </gml:identifier>
      <gml:name>Active</gml:name>
    </gml:Definition>
  </gml:dictionaryEntry>
  <gml:dictionaryEntry>
    <gml:Definition gml:id="s1">
      <gml:identifier codeSpace="urn:example">1</gml:identifier>
      <gml:name>Planned &amp; approved</gml:name>
      <gml:name>Second name is ignored</gml:name>
    </gml:Definition>
  </gml:dictionaryEntry>
  <gml:dictionaryEntry>
    <gml:Definition gml:id="s9">
      <gml:identifier codeSpace="urn:example">9</gml:identifier>
    </gml:Definition>
  </gml:dictionaryEntry>
</gml:Dictionary>"#;

    #[test]
    fn extracts_sorted_entries() -> Result<()> {
        let entries = parse_gml_dictionary(DICTIONARY)?;
        assert_eq!(
            entries,
            vec![
                ("1".to_string(), "Planned & approved".to_string()),
                ("3".to_string(), "Active".to_string()),
            ]
        );
        Ok(())
    }

    #[test]
    fn malformed_xml_is_an_error() {
        assert!(parse_gml_dictionary("<gml:Dictionary><gml:dictionaryEntry></gml:Dictionary>").is_err());
    }
}
