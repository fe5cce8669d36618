use url::Url;

/// Join a step path onto the runner endpoint.
///
/// A path carrying its own scheme and host replaces the endpoint. Otherwise
/// the two paths are joined with exactly one `/` and the query is kept as
/// written, appended to any endpoint query with `&`.
pub fn merge_url(endpoint: &Url, path: &str) -> Result<Url, url::ParseError> {
    if let Ok(absolute) = Url::parse(path) {
        if absolute.has_host() {
            return Ok(absolute);
        }
    }

    let (p, query) = match path.split_once('?') {
        Some((p, q)) => (p, Some(q)),
        None => (path, None),
    };

    let mut merged = endpoint.clone();
    let base = endpoint.path().trim_end_matches('/');
    merged.set_path(&format!("{base}/{}", p.trim_start_matches('/')));

    let combined = match (endpoint.query().filter(|q| !q.is_empty()), query.filter(|q| !q.is_empty())) {
        (Some(a), Some(b)) => Some(format!("{a}&{b}")),
        (Some(a), None) => Some(a.to_string()),
        (None, Some(b)) => Some(b.to_string()),
        (None, None) => None,
    };
    merged.set_query(combined.as_deref());
    merged.set_fragment(None);
    Ok(merged)
}
