use std::path::Path;

use serde_json::{Map, Value};

use super::loader::{load_openapi, parse_openapi_str};
use super::refs::{collect_refs, deref, resolve_ref};
use super::router::{operation, Route, Router};
use super::schema::validate;
use crate::runner::http::{HttpRequestParts, HttpResponseParts};

#[derive(Debug, Clone, thiserror::Error)]
pub enum ValidationError {
    #[error("{method} {url}: no matching operation in openapi3 document")]
    NoRoute { method: String, url: String },
    #[error("{method} {url}: request: {message}")]
    Request {
        method: String,
        url: String,
        message: String,
    },
    #[error("{method} {url}: response {status}: {message}")]
    Response {
        method: String,
        url: String,
        status: u16,
        message: String,
    },
    #[error("{method} {url}: response {status}: unsupported body format {content_type}")]
    Unsupported {
        method: String,
        url: String,
        status: u16,
        content_type: String,
    },
}

impl ValidationError {
    /// The body could not be checked; callers warn instead of failing.
    pub fn is_unsupported(&self) -> bool {
        matches!(self, ValidationError::Unsupported { .. })
    }
}

pub trait HttpValidator: Send + Sync {
    fn validate_request(&self, req: &HttpRequestParts) -> Result<(), ValidationError>;
    fn validate_response(&self, req: &HttpRequestParts, res: &HttpResponseParts) -> Result<(), ValidationError>;
}

pub struct NopValidator;

impl HttpValidator for NopValidator {
    fn validate_request(&self, _req: &HttpRequestParts) -> Result<(), ValidationError> {
        Ok(())
    }

    fn validate_response(&self, _req: &HttpRequestParts, _res: &HttpResponseParts) -> Result<(), ValidationError> {
        Ok(())
    }
}

/// Validates exchanges against an OpenAPI 3 document. Security requirements
/// are not checked.
#[derive(Debug)]
pub struct OpenApi3Validator {
    doc: Value,
    router: Router,
    skip_request: bool,
    skip_response: bool,
}

impl OpenApi3Validator {
    pub fn from_value(doc: Value, skip_request: bool, skip_response: bool) -> Result<Self, String> {
        check_document(&doc)?;
        let router = Router::new(&doc)?;
        Ok(Self {
            doc,
            router,
            skip_request,
            skip_response,
        })
    }

    pub fn from_data(data: &str, skip_request: bool, skip_response: bool) -> Result<Self, String> {
        Self::from_value(parse_openapi_str(data)?, skip_request, skip_response)
    }

    /// Load from a URL or a path relative to `root`.
    pub async fn from_location(
        client: &reqwest::Client,
        location: &str,
        root: &Path,
        skip_request: bool,
        skip_response: bool,
    ) -> Result<Self, String> {
        let doc = load_openapi(client, location, root).await?;
        Self::from_value(doc, skip_request, skip_response)
    }

    fn route(&self, req: &HttpRequestParts) -> Result<(Route<'_>, &Value, &Value), ValidationError> {
        let no_route = || ValidationError::NoRoute {
            method: req.method.clone(),
            url: req.url.to_string(),
        };
        let route = self.router.find(&self.doc, req.url.path()).ok_or_else(no_route)?;
        let path_item = deref(&self.doc, route.path_item).map_err(|_| no_route())?;
        let op = operation(path_item, &req.method).ok_or_else(no_route)?;
        Ok((route, path_item, op))
    }

    fn check_request(&self, req: &HttpRequestParts, route: &Route<'_>, path_item: &Value, op: &Value) -> Result<(), String> {
        for param in parameters(&self.doc, path_item, op)? {
            let name = param.get("name").and_then(Value::as_str).unwrap_or_default();
            let location = param.get("in").and_then(Value::as_str).unwrap_or_default();
            let required =
                location == "path" || param.get("required").and_then(Value::as_bool).unwrap_or(false);
            let schema = param.get("schema");

            let raw: Vec<String> = match location {
                "path" => route.path_params.get(name).cloned().into_iter().collect(),
                "query" => req
                    .url
                    .query_pairs()
                    .filter(|(k, _)| k == name)
                    .map(|(_, v)| v.into_owned())
                    .collect(),
                "header" => req.header(name).map(str::to_string).into_iter().collect(),
                _ => continue,
            };
            if raw.is_empty() {
                if required {
                    return Err(format!("parameter \"{name}\" in {location} is required"));
                }
                continue;
            }
            if let Some(schema) = schema {
                let value = coerce_param(&self.doc, schema, &raw);
                validate(&self.doc, schema, &value)
                    .map_err(|e| format!("parameter \"{name}\" in {location}: {e}"))?;
            }
        }

        let Some(body_spec) = op.get("requestBody") else {
            return Ok(());
        };
        let body_spec = deref(&self.doc, body_spec).map_err(|e| e.to_string())?;
        let required = body_spec.get("required").and_then(Value::as_bool).unwrap_or(false);
        if req.body.is_empty() {
            return if required {
                Err("request body is required but missing".to_string())
            } else {
                Ok(())
            };
        }
        let Some(content) = body_spec.get("content").and_then(Value::as_object).filter(|c| !c.is_empty())
        else {
            return Ok(());
        };
        let content_type = req.header("content-type").map(essence).unwrap_or_default();
        let media = find_media(content, &content_type)
            .ok_or_else(|| format!("header Content-Type has unexpected value \"{content_type}\""))?;
        if is_json(&content_type) {
            let value: Value = serde_json::from_slice(&req.body)
                .map_err(|e| format!("request body is not valid JSON: {e}"))?;
            if let Some(schema) = media.get("schema") {
                validate(&self.doc, schema, &value).map_err(|e| format!("request body: {e}"))?;
            }
        }
        Ok(())
    }

    fn check_response(&self, req: &HttpRequestParts, res: &HttpResponseParts) -> Result<(), ValidationError> {
        let (_, _, op) = self.route(req)?;
        let fail = |message: String| ValidationError::Response {
            method: req.method.clone(),
            url: req.url.to_string(),
            status: res.status,
            message,
        };

        let responses = op
            .get("responses")
            .and_then(Value::as_object)
            .ok_or_else(|| fail("operation declares no responses".to_string()))?;
        let status = res.status.to_string();
        let range = format!("{}XX", &status[..1]);
        let declared = responses
            .get(&status)
            .or_else(|| responses.get(&range))
            .or_else(|| responses.get(&range.to_ascii_lowercase()))
            .or_else(|| responses.get("default"))
            .ok_or_else(|| fail("status is not declared".to_string()))?;
        let declared = deref(&self.doc, declared).map_err(|e| fail(e.to_string()))?;

        let Some(content) = declared.get("content").and_then(Value::as_object).filter(|c| !c.is_empty())
        else {
            return Ok(());
        };
        let content_type = res.header("content-type").map(essence).unwrap_or_default();
        let media = find_media(content, &content_type)
            .ok_or_else(|| fail(format!("header Content-Type has unexpected value \"{content_type}\"")))?;

        let value = if is_json(&content_type) {
            serde_json::from_slice::<Value>(&res.body)
                .map_err(|e| fail(format!("response body is not valid JSON: {e}")))?
        } else if content_type.starts_with("text/") {
            Value::String(String::from_utf8_lossy(&res.body).into_owned())
        } else {
            return Err(ValidationError::Unsupported {
                method: req.method.clone(),
                url: req.url.to_string(),
                status: res.status,
                content_type,
            });
        };
        if let Some(schema) = media.get("schema") {
            validate(&self.doc, schema, &value).map_err(|e| fail(format!("response body: {e}")))?;
        }
        Ok(())
    }
}

impl HttpValidator for OpenApi3Validator {
    fn validate_request(&self, req: &HttpRequestParts) -> Result<(), ValidationError> {
        if self.skip_request {
            return Ok(());
        }
        let (route, path_item, op) = self.route(req)?;
        self.check_request(req, &route, path_item, op).map_err(|message| ValidationError::Request {
            method: req.method.clone(),
            url: req.url.to_string(),
            message,
        })
    }

    fn validate_response(&self, req: &HttpRequestParts, res: &HttpResponseParts) -> Result<(), ValidationError> {
        if self.skip_response {
            return Ok(());
        }
        self.check_response(req, res)
    }
}

fn check_document(doc: &Value) -> Result<(), String> {
    let version = doc
        .get("openapi")
        .and_then(Value::as_str)
        .ok_or_else(|| "missing 'openapi' version field".to_string())?;
    if !version.starts_with("3.") {
        return Err(format!("unsupported openapi version {version}"));
    }
    match doc.get("paths") {
        None | Some(Value::Object(_)) => {}
        Some(_) => return Err("'paths' must be a mapping".to_string()),
    }
    let mut refs = Vec::new();
    collect_refs(doc, &mut refs);
    for r in refs {
        resolve_ref(doc, &r, &mut Default::default()).map_err(|e| e.to_string())?;
    }
    Ok(())
}

/// Path-item parameters overridden by operation parameters with the same name and location.
fn parameters<'a>(doc: &'a Value, path_item: &'a Value, op: &'a Value) -> Result<Vec<&'a Value>, String> {
    let mut out: Vec<&Value> = Vec::new();
    for source in [path_item.get("parameters"), op.get("parameters")] {
        let Some(Value::Array(list)) = source else {
            continue;
        };
        for p in list {
            let p = deref(doc, p).map_err(|e| e.to_string())?;
            let key = (p.get("name"), p.get("in"));
            out.retain(|existing| (existing.get("name"), existing.get("in")) != key);
            out.push(p);
        }
    }
    Ok(out)
}

fn coerce_param(doc: &Value, schema: &Value, raw: &[String]) -> Value {
    let schema = deref(doc, schema).unwrap_or(schema);
    let ty = schema.get("type").and_then(Value::as_str).unwrap_or("string");
    if ty == "array" {
        let items = schema.get("items").unwrap_or(&Value::Null);
        let parts: Vec<String> = if raw.len() == 1 {
            raw[0].split(',').map(str::to_string).collect()
        } else {
            raw.to_vec()
        };
        return Value::Array(parts.iter().map(|p| coerce_scalar(doc, items, p)).collect());
    }
    coerce_scalar(doc, schema, &raw[0])
}

fn coerce_scalar(doc: &Value, schema: &Value, raw: &str) -> Value {
    let schema = deref(doc, schema).unwrap_or(schema);
    match schema.get("type").and_then(Value::as_str) {
        Some("integer") => raw.parse::<i64>().map(Value::from).unwrap_or_else(|_| Value::String(raw.into())),
        Some("number") => raw
            .parse::<f64>()
            .ok()
            .and_then(serde_json::Number::from_f64)
            .map(Value::Number)
            .unwrap_or_else(|| Value::String(raw.into())),
        Some("boolean") => match raw {
            "true" => Value::Bool(true),
            "false" => Value::Bool(false),
            _ => Value::String(raw.into()),
        },
        _ => Value::String(raw.into()),
    }
}

fn essence(content_type: &str) -> String {
    content_type
        .split(';')
        .next()
        .unwrap_or_default()
        .trim()
        .to_ascii_lowercase()
}

fn is_json(essence: &str) -> bool {
    essence == "application/json" || essence.ends_with("+json")
}

/// Exact media type first, then `type/*`, then `*/*`.
fn find_media<'a>(content: &'a Map<String, Value>, essence: &str) -> Option<&'a Value> {
    if essence.is_empty() {
        return None;
    }
    let wildcard = essence.split('/').next().map(|t| format!("{t}/*"));
    content
        .iter()
        .find(|(k, _)| k.to_ascii_lowercase() == essence)
        .or_else(|| {
            wildcard
                .as_deref()
                .and_then(|w| content.iter().find(|(k, _)| k.as_str() == w))
        })
        .or_else(|| content.iter().find(|(k, _)| k.as_str() == "*/*"))
        .map(|(_, v)| v)
}
