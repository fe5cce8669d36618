use std::collections::HashSet;

use serde_json::Value;

pub(crate) fn resolve_ref<'a>(
    doc: &'a Value,
    ref_str: &str,
    visited: &mut HashSet<String>,
) -> Result<&'a Value, RefError> {
    // Local refs only: "#/..."
    if !ref_str.starts_with('#') {
        return Err(RefError::ExternalRef(ref_str.to_string()));
    }

    let pointer = ref_str.trim_start_matches('#');
    if !visited.insert(ref_str.to_string()) {
        return Err(RefError::Cycle(ref_str.to_string()));
    }

    doc.pointer(pointer)
        .ok_or_else(|| RefError::NotFound(ref_str.to_string()))
}

/// Follow `$ref` until a non-reference node is reached.
pub(crate) fn deref<'a>(doc: &'a Value, node: &'a Value) -> Result<&'a Value, RefError> {
    let mut visited = HashSet::new();
    let mut current = node;
    while let Some(r) = current.get("$ref").and_then(Value::as_str) {
        current = resolve_ref(doc, r, &mut visited)?;
    }
    Ok(current)
}

/// Every `$ref` string in the document, in document order.
pub(crate) fn collect_refs(node: &Value, out: &mut Vec<String>) {
    match node {
        Value::Object(map) => {
            for (k, v) in map {
                match (k.as_str(), v) {
                    ("$ref", Value::String(r)) => out.push(r.clone()),
                    _ => collect_refs(v, out),
                }
            }
        }
        Value::Array(items) => items.iter().for_each(|v| collect_refs(v, out)),
        _ => {}
    }
}

#[derive(Debug, Clone, thiserror::Error)]
pub enum RefError {
    #[error("unsupported external $ref: {0}")]
    ExternalRef(String),
    #[error("unresolvable $ref: {0}")]
    NotFound(String),
    #[error("cyclic $ref: {0}")]
    Cycle(String),
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn deref_follows_chains() {
        let doc = json!({
            "components": {"schemas": {
                "A": {"$ref": "#/components/schemas/B"},
                "B": {"type": "string"}
            }}
        });
        let node = json!({"$ref": "#/components/schemas/A"});
        assert_eq!(deref(&doc, &node).unwrap(), &json!({"type": "string"}));
    }

    #[test]
    fn deref_detects_cycles() {
        let doc = json!({
            "components": {"schemas": {
                "A": {"$ref": "#/components/schemas/B"},
                "B": {"$ref": "#/components/schemas/A"}
            }}
        });
        let node = json!({"$ref": "#/components/schemas/A"});
        assert!(matches!(deref(&doc, &node), Err(RefError::Cycle(_))));
    }

    #[test]
    fn external_refs_are_rejected() {
        let doc = json!({});
        let node = json!({"$ref": "other.yml#/x"});
        assert!(matches!(deref(&doc, &node), Err(RefError::ExternalRef(_))));
    }
}
