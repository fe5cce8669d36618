use std::path::Path;

use runbook_core::types::{MEDIA_TYPE_FORM, MEDIA_TYPE_JSON, MEDIA_TYPE_MULTIPART, MEDIA_TYPE_TEXT};
use runbook_core::PayloadError;
use serde_json::Value;

use crate::error::{RunError, RunnerError};

const BOUNDARY_LEN: usize = 60;

#[derive(Debug, Clone, PartialEq)]
pub struct EncodedBody {
    pub content_type: String,
    pub bytes: Vec<u8>,
}

/// Random multipart boundary.
pub fn random_boundary() -> String {
    (0..BOUNDARY_LEN).map(|_| fastrand::alphanumeric()).collect()
}

/// Encode a request body for `media_type`. Multipart file parts resolve
/// against `root`.
pub fn encode_body(media_type: &str, body: &Value, root: &Path, boundary: &str) -> Result<EncodedBody, RunError> {
    let essence = media_type
        .split(';')
        .next()
        .unwrap_or_default()
        .trim()
        .to_ascii_lowercase();

    let bytes = match essence.as_str() {
        MEDIA_TYPE_JSON => json(body)?,
        MEDIA_TYPE_FORM => form(body)?,
        MEDIA_TYPE_TEXT => text(body)?,
        MEDIA_TYPE_MULTIPART => {
            return Ok(EncodedBody {
                content_type: format!("{MEDIA_TYPE_MULTIPART}; boundary={boundary}"),
                bytes: multipart(body, root, boundary)?,
            })
        }
        other if other.ends_with("+json") => json(body)?,
        _ => match body {
            Value::String(s) => s.clone().into_bytes(),
            _ => {
                return Err(invalid(format!(
                    "unsupported media type {media_type} for a structured body"
                )))
            }
        },
    };

    Ok(EncodedBody {
        content_type: media_type.to_string(),
        bytes,
    })
}

fn invalid(message: String) -> RunError {
    RunError::Payload(PayloadError::new("http", message))
}

fn json(body: &Value) -> Result<Vec<u8>, RunError> {
    serde_json::to_vec(body).map_err(|e| invalid(format!("json body: {e}")))
}

fn text(body: &Value) -> Result<Vec<u8>, RunError> {
    match body {
        Value::String(s) => Ok(s.clone().into_bytes()),
        Value::Number(_) | Value::Bool(_) => Ok(body.to_string().into_bytes()),
        Value::Null => Ok(Vec::new()),
        _ => Err(invalid("text/plain body must be a string".to_string())),
    }
}

fn form(body: &Value) -> Result<Vec<u8>, RunError> {
    let Value::Object(map) = body else {
        return Err(invalid("form body must be a mapping".to_string()));
    };
    let mut ser = url::form_urlencoded::Serializer::new(String::new());
    for (k, v) in map {
        match v {
            Value::Array(items) => {
                for item in items {
                    ser.append_pair(k, &scalar(item));
                }
            }
            other => {
                ser.append_pair(k, &scalar(other));
            }
        }
    }
    Ok(ser.finish().into_bytes())
}

fn multipart(body: &Value, root: &Path, boundary: &str) -> Result<Vec<u8>, RunError> {
    let mut fields: Vec<(&str, &Value)> = Vec::new();
    match body {
        Value::Object(map) => fields.extend(map.iter().map(|(k, v)| (k.as_str(), v))),
        Value::Array(items) => {
            for item in items {
                let entry = item.as_object().filter(|m| m.len() == 1).ok_or_else(|| {
                    invalid("multipart list entries must be single-entry mappings".to_string())
                })?;
                fields.extend(entry.iter().map(|(k, v)| (k.as_str(), v)));
            }
        }
        _ => return Err(invalid("multipart body must be a mapping or a list".to_string())),
    }

    let mut out = Vec::new();
    for (name, value) in fields {
        match value {
            Value::Array(items) => {
                for item in items {
                    write_part(&mut out, boundary, name, item, root)?;
                }
            }
            other => write_part(&mut out, boundary, name, other, root)?,
        }
    }
    out.extend_from_slice(format!("--{boundary}--\r\n").as_bytes());
    Ok(out)
}

fn write_part(out: &mut Vec<u8>, boundary: &str, name: &str, value: &Value, root: &Path) -> Result<(), RunError> {
    out.extend_from_slice(format!("--{boundary}\r\n").as_bytes());

    let file = match value {
        Value::String(s) if !s.is_empty() => Some(root.join(s)).filter(|p| p.is_file()),
        _ => None,
    };

    match file {
        Some(path) => {
            let data = std::fs::read(&path)
                .map_err(|e| RunnerError::Io(format!("{}: {e}", path.display())))?;
            let filename = path
                .file_name()
                .map(|f| f.to_string_lossy().into_owned())
                .unwrap_or_default();
            let mime = mime_guess::from_path(&path).first_or_octet_stream();
            out.extend_from_slice(
                format!(
                    "Content-Disposition: form-data; name=\"{}\"; filename=\"{}\"\r\nContent-Type: {mime}\r\n\r\n",
                    escape_quotes(name),
                    escape_quotes(&filename)
                )
                .as_bytes(),
            );
            out.extend_from_slice(&data);
        }
        None => {
            out.extend_from_slice(
                format!(
                    "Content-Disposition: form-data; name=\"{}\"\r\n\r\n",
                    escape_quotes(name)
                )
                .as_bytes(),
            );
            out.extend_from_slice(scalar(value).as_bytes());
        }
    }
    out.extend_from_slice(b"\r\n");
    Ok(())
}

fn escape_quotes(s: &str) -> String {
    s.replace('\\', "\\\\").replace('"', "\\\"")
}

fn scalar(v: &Value) -> String {
    match v {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}
