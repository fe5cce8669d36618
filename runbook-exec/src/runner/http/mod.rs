mod body;
mod client;
mod url;

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;

use runbook_core::types::HttpRequest;
use serde_json::{json, Map, Value};

pub use self::body::{encode_body, random_boundary, EncodedBody};
pub use self::client::{
    HttpClient, HttpClientOptions, HttpError, HttpRequestParts, HttpResponseParts, ReqwestHttpClient,
};
pub use self::url::merge_url;

use super::RunnerOutput;
use crate::error::{RunError, RunnerError};
use crate::openapi::{HttpValidator, NopValidator};

pub const TRACE_HEADER: &str = "X-Runbook-Trace";

pub struct HttpRunner {
    name: String,
    endpoint: ::url::Url,
    client: Arc<dyn HttpClient>,
    validator: Arc<dyn HttpValidator>,
    multipart_boundary: Option<String>,
}

impl std::fmt::Debug for HttpRunner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpRunner")
            .field("name", &self.name)
            .field("endpoint", &self.endpoint.as_str())
            .finish_non_exhaustive()
    }
}

impl HttpRunner {
    pub fn new(name: impl Into<String>, endpoint: ::url::Url, client: Arc<dyn HttpClient>) -> Self {
        Self {
            name: name.into(),
            endpoint,
            client,
            validator: Arc::new(NopValidator),
            multipart_boundary: None,
        }
    }

    pub fn with_validator(mut self, validator: Arc<dyn HttpValidator>) -> Self {
        self.validator = validator;
        self
    }

    /// Fix the multipart boundary instead of drawing a random one per request.
    pub fn with_multipart_boundary(mut self, boundary: impl Into<String>) -> Self {
        self.multipart_boundary = Some(boundary.into());
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn endpoint(&self) -> &::url::Url {
        &self.endpoint
    }

    /// Send one request. Validation failures are errors except unsupported
    /// response formats, which come back as warnings.
    pub async fn run(
        &self,
        req: &HttpRequest,
        root: &Path,
        debug: bool,
        trace: Option<String>,
    ) -> Result<RunnerOutput, RunError> {
        let url = merge_url(&self.endpoint, &req.path).map_err(|e| {
            RunnerError::Http(HttpError::Other(format!("invalid url {}: {e}", req.path)))
        })?;

        let mut headers = req.headers.clone();
        let mut body_bytes = Vec::new();
        if let (Some(media_type), Some(body)) = (&req.media_type, &req.body) {
            let boundary = self.multipart_boundary.clone().unwrap_or_else(random_boundary);
            let encoded = encode_body(media_type, body, root, &boundary)?;
            let is_multipart = encoded.content_type.starts_with("multipart/");
            if is_multipart || req.header("content-type").is_none() {
                headers.retain(|(k, _)| !k.eq_ignore_ascii_case("content-type"));
                headers.push(("Content-Type".to_string(), encoded.content_type));
            }
            body_bytes = encoded.bytes;
        }
        if let Some(trace) = trace {
            headers.push((TRACE_HEADER.to_string(), trace));
        }

        let parts = HttpRequestParts {
            method: req.method.clone(),
            url,
            headers,
            body: body_bytes,
        };

        let mut warnings: Vec<Arc<RunError>> = Vec::new();
        if let Err(e) = self.validator.validate_request(&parts) {
            if !e.is_unsupported() {
                return Err(e.into());
            }
            warnings.push(Arc::new(e.into()));
        }

        if debug {
            tracing::debug!(
                target: "runbook::http",
                runner = %self.name,
                "-----START HTTP REQUEST-----\n{}\n-----END HTTP REQUEST-----",
                dump_request(&parts)
            );
        }

        let res = self.client.send(parts.clone()).await.map_err(RunnerError::from)?;

        if debug {
            tracing::debug!(
                target: "runbook::http",
                runner = %self.name,
                "-----START HTTP RESPONSE-----\n{}\n-----END HTTP RESPONSE-----",
                dump_response(&res)
            );
        }

        if let Err(e) = self.validator.validate_response(&parts, &res) {
            if !e.is_unsupported() {
                return Err(e.into());
            }
            tracing::warn!(target: "runbook::http", runner = %self.name, "{e}");
            warnings.push(Arc::new(e.into()));
        }

        let result = json!({
            "req": {
                "method": parts.method,
                "url": parts.url.as_str(),
                "headers": request_headers(&parts.headers),
                "body": req.body.clone().unwrap_or(Value::Null),
            },
            "res": {
                "status": res.status,
                "headers": response_headers(&res.headers),
                "body": decode_response_body(&res),
                "rawBody": String::from_utf8_lossy(&res.body),
            },
        });

        Ok(RunnerOutput {
            result: Some(result),
            warnings,
            ..RunnerOutput::default()
        })
    }
}

fn request_headers(headers: &[(String, String)]) -> Value {
    let mut m: Map<String, Value> = Map::new();
    for (k, v) in headers {
        m.insert(k.clone(), Value::String(v.clone()));
    }
    Value::Object(m)
}

fn response_headers(headers: &BTreeMap<String, Vec<String>>) -> Value {
    Value::Object(
        headers
            .iter()
            .map(|(k, v)| (k.clone(), Value::Array(v.iter().cloned().map(Value::String).collect())))
            .collect(),
    )
}

/// JSON responses decode to structured values; anything else stays text.
fn decode_response_body(res: &HttpResponseParts) -> Value {
    let is_json = res
        .header("content-type")
        .map(|ct| {
            let essence = ct.split(';').next().unwrap_or_default().trim().to_ascii_lowercase();
            essence == "application/json" || essence.ends_with("+json")
        })
        .unwrap_or(false);
    if res.body.is_empty() {
        return Value::Null;
    }
    if is_json {
        if let Ok(v) = serde_json::from_slice(&res.body) {
            return v;
        }
    }
    Value::String(String::from_utf8_lossy(&res.body).into_owned())
}

fn dump_request(parts: &HttpRequestParts) -> String {
    let mut out = format!("{} {}\n", parts.method, parts.url);
    for (k, v) in &parts.headers {
        out.push_str(&format!("{k}: {v}\n"));
    }
    out.push('\n');
    out.push_str(&String::from_utf8_lossy(&parts.body));
    out
}

fn dump_response(res: &HttpResponseParts) -> String {
    let mut out = format!("HTTP {}\n", res.status);
    for (k, values) in &res.headers {
        for v in values {
            out.push_str(&format!("{k}: {v}\n"));
        }
    }
    out.push('\n');
    out.push_str(&String::from_utf8_lossy(&res.body));
    out
}
