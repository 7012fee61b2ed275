use url::Url;

use crate::request::RequestContext;

const ATTRIBUTE_KEYS: [&str; 3] = ["root_url", "host_url", "base_url"];
const EXPLICIT_KEYS: [&str; 5] = ["base_url", "baseurl", "api_base_url", "server_url", "url"];

/// Normalize a candidate into an absolute base URL.
///
/// The path is cut at the first `collections` segment, query and fragment
/// are dropped and the path always ends with a slash.
pub(crate) fn normalize_base(candidate: &str) -> Option<Url> {
    let mut url = Url::parse(candidate.trim()).ok()?;
    if url.cannot_be_a_base() || url.host_str().is_none_or(str::is_empty) {
        return None;
    }

    let segments: Vec<String> = url
        .path_segments()
        .map(|segments| {
            segments
                .take_while(|segment| *segment != "collections")
                .filter(|segment| !segment.is_empty())
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default();

    let mut path = String::from("/");
    for segment in segments {
        path.push_str(&segment);
        path.push('/');
    }
    url.set_path(&path);
    url.set_query(None);
    url.set_fragment(None);
    Some(url)
}

/// `proto://host[prefix]` from the `X-Forwarded-*` headers, or from the first
/// entry of `Forwarded`.
fn proxy_candidate(request: &RequestContext) -> Option<String> {
    if let (Some(proto), Some(host)) = (
        request.header("X-Forwarded-Proto"),
        request.header("X-Forwarded-Host"),
    ) {
        let proto = first_entry(proto);
        let host = first_entry(host);
        let prefix = request
            .header("X-Forwarded-Prefix")
            .map(first_entry)
            .unwrap_or_default();
        return Some(format!("{proto}://{host}/{}", prefix.trim_start_matches('/')));
    }

    let forwarded = request.header("Forwarded")?;
    let first = forwarded.split(',').next()?;
    let mut proto = None;
    let mut host = None;
    for pair in first.split(';') {
        let Some((key, value)) = pair.split_once('=') else {
            continue;
        };
        let value = value.trim().trim_matches('"');
        match key.trim().to_ascii_lowercase().as_str() {
            "proto" => proto = Some(value),
            "host" => host = Some(value),
            _ => {}
        }
    }
    Some(format!("{}://{}/", proto?, host?))
}

fn first_entry(header: &str) -> &str {
    header.split(',').next().unwrap_or(header).trim()
}

/// Candidate base URLs in priority order; the first that normalizes wins.
pub(crate) fn resolve_base(request: Option<&RequestContext>, configured: Option<&str>) -> Option<Url> {
    let mut candidates: Vec<String> = Vec::new();
    if let Some(request) = request {
        candidates.extend(
            ATTRIBUTE_KEYS
                .iter()
                .filter_map(|key| request.attribute(key).map(str::to_string)),
        );
        candidates.extend(
            EXPLICIT_KEYS
                .iter()
                .filter_map(|key| request.value(key).map(str::to_string)),
        );
        candidates.extend(proxy_candidate(request));
    }
    candidates.extend(configured.map(str::to_string));

    candidates.iter().find_map(|candidate| normalize_base(candidate))
}

/// `href` as an absolute URL: it needs both a scheme and a host.
pub(crate) fn absolute_href(href: &str) -> Option<Url> {
    Url::parse(href).ok().filter(Url::has_host)
}

/// Resolve `href` against `base`.
///
/// Root-relative hrefs are appended below the base path, so a mount prefix
/// survives; a prefix already present in `href` is not repeated.
pub(crate) fn resolve_href(href: &str, base: &Url) -> Option<Url> {
    match Url::parse(href) {
        Ok(url) if url.has_host() => return Some(url),
        // A scheme without a host, e.g. `urn:x` or `localhost:5000/items`.
        Ok(_) => return None,
        Err(_) => {}
    }

    if let Some(rooted) = href.strip_prefix('/') {
        let prefix = base.path();
        let mount = prefix.trim_end_matches('/');
        let already_mounted = !mount.is_empty()
            && href
                .strip_prefix(mount)
                .is_some_and(|rest| rest.is_empty() || rest.starts_with('/'));
        let joined = if already_mounted {
            href.to_string()
        } else {
            format!("{prefix}{rooted}")
        };
        return base.join(&joined).ok();
    }

    base.join(href).ok()
}
