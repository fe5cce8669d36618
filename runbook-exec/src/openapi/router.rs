use std::collections::BTreeMap;

use regex::Regex;
use serde_json::Value;

const METHODS: &[&str] = &["get", "put", "post", "delete", "options", "head", "patch", "trace"];

#[derive(Debug)]
struct CompiledPath {
    template: String,
    pattern: Regex,
    params: Vec<String>,
}

/// Matches request paths against the document's path templates.
#[derive(Debug)]
pub(crate) struct Router {
    /// Server base paths. Scheme and host are dropped: a request always
    /// matches a server on its own scheme and host.
    bases: Vec<String>,
    /// Fewest template parameters first, so literal paths beat templated ones.
    paths: Vec<CompiledPath>,
}

pub(crate) struct Route<'a> {
    pub template: &'a str,
    pub path_item: &'a Value,
    pub path_params: BTreeMap<String, String>,
}

impl Router {
    pub fn new(doc: &Value) -> Result<Self, String> {
        let mut paths = Vec::new();
        if let Some(map) = doc.get("paths").and_then(Value::as_object) {
            for template in map.keys() {
                paths.push(compile_template(template)?);
            }
        }
        paths.sort_by_key(|p| p.params.len());
        Ok(Self {
            bases: server_base_paths(doc),
            paths,
        })
    }

    /// Find the path item for `path`. The operation for a method is looked up
    /// by the caller.
    pub fn find<'a>(&self, doc: &'a Value, path: &str) -> Option<Route<'a>> {
        let paths = doc.get("paths").and_then(Value::as_object)?;
        for base in &self.bases {
            let Some(rest) = strip_base(path, base) else {
                continue;
            };
            for compiled in &self.paths {
                let Some(caps) = compiled.pattern.captures(rest) else {
                    continue;
                };
                let (template, path_item) = paths.get_key_value(&compiled.template)?;
                let path_params = compiled
                    .params
                    .iter()
                    .zip(caps.iter().skip(1))
                    .filter_map(|(name, m)| m.map(|m| (name.clone(), m.as_str().to_string())))
                    .collect();
                return Some(Route {
                    template,
                    path_item,
                    path_params,
                });
            }
        }
        None
    }
}

pub(crate) fn operation<'a>(path_item: &'a Value, method: &str) -> Option<&'a Value> {
    let method = method.to_ascii_lowercase();
    if !METHODS.contains(&method.as_str()) {
        return None;
    }
    path_item.get(method.as_str())
}

fn strip_base<'p>(path: &'p str, base: &str) -> Option<&'p str> {
    if base.is_empty() {
        return Some(if path.is_empty() { "/" } else { path });
    }
    let rest = path.strip_prefix(base)?;
    match rest {
        "" => Some("/"),
        r if r.starts_with('/') => Some(r),
        _ => None,
    }
}

fn compile_template(template: &str) -> Result<CompiledPath, String> {
    let mut pattern = String::from("^");
    let mut params = Vec::new();
    let mut rest = template;
    while let Some(open) = rest.find('{') {
        pattern.push_str(&regex::escape(&rest[..open]));
        let close = rest[open..]
            .find('}')
            .map(|i| open + i)
            .ok_or_else(|| format!("unclosed parameter in path {template}"))?;
        params.push(rest[open + 1..close].to_string());
        pattern.push_str("([^/]+)");
        rest = &rest[close + 1..];
    }
    pattern.push_str(&regex::escape(rest));
    pattern.push('$');
    let pattern = Regex::new(&pattern).map_err(|e| format!("path {template}: {e}"))?;
    Ok(CompiledPath {
        template: template.to_string(),
        pattern,
        params,
    })
}

/// Base paths of `servers`, with server variables replaced by their defaults.
/// A document without servers is served from the root.
fn server_base_paths(doc: &Value) -> Vec<String> {
    let mut bases = Vec::new();
    if let Some(servers) = doc.get("servers").and_then(Value::as_array) {
        for server in servers {
            let Some(raw) = server.get("url").and_then(Value::as_str) else {
                continue;
            };
            let url = substitute_variables(raw, server.get("variables"));
            let path = match url.find("://") {
                Some(i) => {
                    let after = &url[i + 3..];
                    after.find('/').map(|j| after[j..].to_string()).unwrap_or_default()
                }
                None => url,
            };
            let path = path.split(['?', '#']).next().unwrap_or_default();
            let base = path.trim_end_matches('/').to_string();
            if !bases.contains(&base) {
                bases.push(base);
            }
        }
    }
    if bases.is_empty() {
        bases.push(String::new());
    }
    // Longest base first so nested server paths win.
    bases.sort_by_key(|b| std::cmp::Reverse(b.len()));
    bases
}

fn substitute_variables(url: &str, vars: Option<&Value>) -> String {
    let Some(vars) = vars.and_then(Value::as_object) else {
        return url.to_string();
    };
    let mut out = url.to_string();
    for (name, def) in vars {
        if let Some(default) = def.get("default").and_then(Value::as_str) {
            out = out.replace(&format!("{{{name}}}"), default);
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn doc() -> Value {
        json!({
            "servers": [{"url": "https://api.example.com/{version}", "variables": {"version": {"default": "v1"}}}],
            "paths": {
                "/users/{id}": {"get": {}},
                "/users/me": {"get": {}},
                "/files/{name}.json": {"get": {}}
            }
        })
    }

    #[test]
    fn literal_paths_beat_templates() {
        let doc = doc();
        let router = Router::new(&doc).unwrap();
        let route = router.find(&doc, "/v1/users/me").unwrap();
        assert_eq!(route.template, "/users/me");
        assert!(route.path_params.is_empty());
    }

    #[test]
    fn templates_capture_parameters() {
        let doc = doc();
        let router = Router::new(&doc).unwrap();
        let route = router.find(&doc, "/v1/users/42").unwrap();
        assert_eq!(route.template, "/users/{id}");
        assert_eq!(route.path_params.get("id").map(String::as_str), Some("42"));

        let route = router.find(&doc, "/v1/files/report.json").unwrap();
        assert_eq!(route.path_params.get("name").map(String::as_str), Some("report"));
    }

    #[test]
    fn requests_outside_the_server_base_do_not_match() {
        let doc = doc();
        let router = Router::new(&doc).unwrap();
        assert!(router.find(&doc, "/v2/users/42").is_none());
        assert!(router.find(&doc, "/v1x/users/42").is_none());
    }

    #[test]
    fn missing_servers_means_root() {
        let doc = json!({"paths": {"/ping": {"get": {}}}});
        let router = Router::new(&doc).unwrap();
        assert!(router.find(&doc, "/ping").is_some());
    }
}
