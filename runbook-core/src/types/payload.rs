//! Typed views of expanded runner payloads.

use serde_json::{Map, Value};

use crate::error::PayloadError;

pub const MEDIA_TYPE_JSON: &str = "application/json";
pub const MEDIA_TYPE_FORM: &str = "application/x-www-form-urlencoded";
pub const MEDIA_TYPE_TEXT: &str = "text/plain";
pub const MEDIA_TYPE_MULTIPART: &str = "multipart/form-data";

const BODYLESS_METHODS: &[&str] = &["GET", "HEAD", "DELETE", "OPTIONS"];
const HTTP_METHODS: &[&str] = &[
    "GET", "HEAD", "DELETE", "OPTIONS", "POST", "PUT", "PATCH", "TRACE", "CONNECT",
];

/// `{path: {method: {headers, body: {mediaType: value}}}}`
#[derive(Debug, Clone, PartialEq)]
pub struct HttpRequest {
    pub path: String,
    pub method: String,
    pub headers: Vec<(String, String)>,
    pub media_type: Option<String>,
    pub body: Option<Value>,
}

impl HttpRequest {
    pub fn from_payload(payload: &Value) -> Result<Self, PayloadError> {
        let err = |m: String| PayloadError::new("http", m);
        let (path, by_method) = single_entry(payload).map_err(|m| err(format!("request {m}")))?;
        let (method, spec) = single_entry(by_method).map_err(|m| err(format!("{path}: method {m}")))?;
        let method = method.to_ascii_uppercase();
        if !HTTP_METHODS.contains(&method.as_str()) {
            return Err(err(format!("{path}: unknown method {method}")));
        }
        let spec = spec
            .as_object()
            .ok_or_else(|| err(format!("{path}: {method} must be a mapping")))?;

        let headers = match spec.get("headers") {
            None | Some(Value::Null) => Vec::new(),
            Some(Value::Object(h)) => h
                .iter()
                .map(|(k, v)| (k.clone(), scalar_to_string(v)))
                .collect(),
            Some(_) => return Err(err(format!("{path}: headers must be a mapping"))),
        };

        let (media_type, body) = match spec.get("body") {
            None | Some(Value::Null) => {
                if !BODYLESS_METHODS.contains(&method.as_str()) {
                    return Err(err(format!("{path}: {method} requires a body")));
                }
                (None, None)
            }
            Some(body) => {
                let (media_type, value) =
                    single_entry(body).map_err(|m| err(format!("{path}: body {m}")))?;
                (Some(media_type.to_string()), Some(value.clone()))
            }
        };

        Ok(Self {
            path: path.to_string(),
            method,
            headers,
            media_type,
            body,
        })
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }
}

/// `{query: "..."}`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DbQuery {
    pub stmt: String,
}

impl DbQuery {
    pub fn from_payload(payload: &Value) -> Result<Self, PayloadError> {
        let stmt = required_str(payload, "db", "query")?;
        Ok(Self {
            stmt: stmt.trim().to_string(),
        })
    }
}

/// `{command, stdin, shell, background}`
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ExecCommand {
    pub command: String,
    pub stdin: Option<String>,
    pub shell: Option<String>,
    pub background: bool,
}

impl ExecCommand {
    pub fn from_payload(payload: &Value) -> Result<Self, PayloadError> {
        Ok(Self {
            command: required_str(payload, "exec", "command")?,
            stdin: optional_str(payload, "exec", "stdin")?,
            shell: optional_str(payload, "exec", "shell")?,
            background: payload
                .get("background")
                .map(|v| v.as_bool().unwrap_or(false))
                .unwrap_or(false),
        })
    }
}

/// `{command, stdin}`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SshCommand {
    pub command: String,
    pub stdin: Option<String>,
}

impl SshCommand {
    pub fn from_payload(payload: &Value) -> Result<Self, PayloadError> {
        Ok(Self {
            command: required_str(payload, "ssh", "command")?,
            stdin: optional_str(payload, "ssh", "stdin")?,
        })
    }
}

/// `{ "pkg.Service/Method": {headers, message} }`
#[derive(Debug, Clone, PartialEq)]
pub struct GrpcRequest {
    pub service: String,
    pub method: String,
    pub headers: Map<String, Value>,
    pub message: Value,
}

impl GrpcRequest {
    pub fn from_payload(payload: &Value) -> Result<Self, PayloadError> {
        let err = |m: String| PayloadError::new("grpc", m);
        let (full, spec) = single_entry(payload).map_err(|m| err(format!("request {m}")))?;
        let (service, method) = full
            .trim_start_matches('/')
            .split_once('/')
            .ok_or_else(|| err(format!("{full}: expected 'package.Service/Method'")))?;
        let (headers, message) = match spec {
            Value::Null => (Map::new(), Value::Object(Map::new())),
            Value::Object(o) => (
                o.get("headers")
                    .and_then(Value::as_object)
                    .cloned()
                    .unwrap_or_default(),
                o.get("message").cloned().unwrap_or(Value::Object(Map::new())),
            ),
            _ => return Err(err(format!("{full}: must be a mapping"))),
        };
        Ok(Self {
            service: service.to_string(),
            method: method.to_string(),
            headers,
            message,
        })
    }
}

fn single_entry(v: &Value) -> Result<(&str, &Value), String> {
    match v.as_object() {
        Some(map) if map.len() == 1 => map
            .iter()
            .next()
            .map(|(k, v)| (k.as_str(), v))
            .ok_or_else(|| "is empty".to_string()),
        Some(map) => Err(format!("must have exactly one key, found {}", map.len())),
        None => Err("must be a mapping".to_string()),
    }
}

fn required_str(payload: &Value, runner: &'static str, key: &str) -> Result<String, PayloadError> {
    optional_str(payload, runner, key)?
        .ok_or_else(|| PayloadError::new(runner, format!("'{key}' is required")))
}

fn optional_str(payload: &Value, runner: &'static str, key: &str) -> Result<Option<String>, PayloadError> {
    let obj = payload
        .as_object()
        .ok_or_else(|| PayloadError::new(runner, "payload must be a mapping"))?;
    match obj.get(key) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(s)) => Ok(Some(s.clone())),
        Some(other) => Ok(Some(scalar_to_string(other))),
    }
}

fn scalar_to_string(v: &Value) -> String {
    match v {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}
