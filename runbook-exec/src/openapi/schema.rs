//! A JSON Schema subset as used by OpenAPI 3.0 and 3.1 documents.

use regex::Regex;
use serde_json::{Map, Value};

use super::refs::deref;

const MAX_DEPTH: usize = 128;

/// Validate `value` against `schema`, reporting the first violation with its location.
pub(crate) fn validate(doc: &Value, schema: &Value, value: &Value) -> Result<(), String> {
    check(doc, schema, value, "$", 0)
}

fn check(doc: &Value, schema: &Value, value: &Value, at: &str, depth: usize) -> Result<(), String> {
    if depth > MAX_DEPTH {
        return Err(format!("{at}: schema nesting too deep"));
    }
    let schema = deref(doc, schema).map_err(|e| format!("{at}: {e}"))?;
    let obj = match schema {
        Value::Bool(true) => return Ok(()),
        Value::Bool(false) => return Err(format!("{at}: no value is allowed")),
        Value::Object(obj) => obj,
        _ => return Ok(()),
    };

    if value.is_null() && allows_null(obj) {
        return Ok(());
    }

    if let Some(ty) = obj.get("type") {
        check_type(ty, value, at)?;
    }
    if let Some(Value::Array(options)) = obj.get("enum") {
        if !options.contains(value) {
            return Err(format!("{at}: value {value} is not one of the allowed values"));
        }
    }
    if let Some(expected) = obj.get("const") {
        if expected != value {
            return Err(format!("{at}: value must be {expected}"));
        }
    }

    match value {
        Value::String(s) => check_string(obj, s, at)?,
        Value::Number(_) => check_number(obj, value, at)?,
        Value::Array(items) => check_array(doc, obj, items, at, depth)?,
        Value::Object(map) => check_object(doc, obj, map, at, depth)?,
        _ => {}
    }

    if let Some(Value::Array(all)) = obj.get("allOf") {
        for sub in all {
            check(doc, sub, value, at, depth + 1)?;
        }
    }
    if let Some(Value::Array(any)) = obj.get("anyOf") {
        if !any.iter().any(|sub| check(doc, sub, value, at, depth + 1).is_ok()) {
            return Err(format!("{at}: value does not match any schema of anyOf"));
        }
    }
    if let Some(Value::Array(one)) = obj.get("oneOf") {
        let matched = one
            .iter()
            .filter(|sub| check(doc, sub, value, at, depth + 1).is_ok())
            .count();
        if matched != 1 {
            return Err(format!("{at}: value matches {matched} schemas of oneOf, expected exactly 1"));
        }
    }
    if let Some(not) = obj.get("not") {
        if check(doc, not, value, at, depth + 1).is_ok() {
            return Err(format!("{at}: value must not match the schema in not"));
        }
    }
    Ok(())
}

fn allows_null(obj: &Map<String, Value>) -> bool {
    if obj.get("nullable").and_then(Value::as_bool) == Some(true) {
        return true;
    }
    match obj.get("type") {
        Some(Value::String(t)) => t == "null",
        Some(Value::Array(types)) => types.iter().any(|t| t == "null"),
        _ => false,
    }
}

fn check_type(ty: &Value, value: &Value, at: &str) -> Result<(), String> {
    let ok = match ty {
        Value::String(t) => type_matches(t, value),
        Value::Array(types) => types
            .iter()
            .filter_map(Value::as_str)
            .any(|t| type_matches(t, value)),
        _ => true,
    };
    if ok {
        Ok(())
    } else {
        Err(format!("{at}: value must be {}", type_label(ty)))
    }
}

fn type_matches(ty: &str, value: &Value) -> bool {
    match ty {
        "string" => value.is_string(),
        "number" => value.is_number(),
        "integer" => match value {
            Value::Number(n) => n.is_i64() || n.is_u64() || n.as_f64().is_some_and(|f| f.fract() == 0.0),
            _ => false,
        },
        "boolean" => value.is_boolean(),
        "array" => value.is_array(),
        "object" => value.is_object(),
        "null" => value.is_null(),
        _ => true,
    }
}

fn type_label(ty: &Value) -> String {
    match ty {
        Value::String(t) => format!("a {t}"),
        Value::Array(types) => {
            let names: Vec<&str> = types.iter().filter_map(Value::as_str).collect();
            format!("one of [{}]", names.join(", "))
        }
        other => other.to_string(),
    }
}

fn check_string(obj: &Map<String, Value>, s: &str, at: &str) -> Result<(), String> {
    let len = s.chars().count() as u64;
    if let Some(min) = obj.get("minLength").and_then(Value::as_u64) {
        if len < min {
            return Err(format!("{at}: string shorter than {min}"));
        }
    }
    if let Some(max) = obj.get("maxLength").and_then(Value::as_u64) {
        if len > max {
            return Err(format!("{at}: string longer than {max}"));
        }
    }
    if let Some(pattern) = obj.get("pattern").and_then(Value::as_str) {
        let re = Regex::new(pattern).map_err(|e| format!("{at}: invalid pattern {pattern}: {e}"))?;
        if !re.is_match(s) {
            return Err(format!("{at}: string does not match pattern {pattern}"));
        }
    }
    Ok(())
}

fn check_number(obj: &Map<String, Value>, value: &Value, at: &str) -> Result<(), String> {
    let Some(n) = value.as_f64() else {
        return Ok(());
    };
    let bound = |key: &str| obj.get(key).and_then(Value::as_f64);
    let flag = |key: &str| obj.get(key).and_then(Value::as_bool).unwrap_or(false);

    if let Some(min) = bound("minimum") {
        let exclusive = flag("exclusiveMinimum");
        if n < min || (exclusive && n == min) {
            return Err(format!("{at}: number must be {} {min}", if exclusive { ">" } else { ">=" }));
        }
    }
    if let Some(max) = bound("maximum") {
        let exclusive = flag("exclusiveMaximum");
        if n > max || (exclusive && n == max) {
            return Err(format!("{at}: number must be {} {max}", if exclusive { "<" } else { "<=" }));
        }
    }
    if let Some(min) = bound("exclusiveMinimum") {
        if n <= min {
            return Err(format!("{at}: number must be > {min}"));
        }
    }
    if let Some(max) = bound("exclusiveMaximum") {
        if n >= max {
            return Err(format!("{at}: number must be < {max}"));
        }
    }
    if let Some(step) = bound("multipleOf") {
        if step > 0.0 && (n / step).fract().abs() > f64::EPSILON {
            return Err(format!("{at}: number must be a multiple of {step}"));
        }
    }
    Ok(())
}

fn check_array(doc: &Value, obj: &Map<String, Value>, items: &[Value], at: &str, depth: usize) -> Result<(), String> {
    let len = items.len() as u64;
    if let Some(min) = obj.get("minItems").and_then(Value::as_u64) {
        if len < min {
            return Err(format!("{at}: array has fewer than {min} items"));
        }
    }
    if let Some(max) = obj.get("maxItems").and_then(Value::as_u64) {
        if len > max {
            return Err(format!("{at}: array has more than {max} items"));
        }
    }
    if obj.get("uniqueItems").and_then(Value::as_bool) == Some(true) {
        for (i, a) in items.iter().enumerate() {
            if items[i + 1..].contains(a) {
                return Err(format!("{at}: array items must be unique"));
            }
        }
    }
    if let Some(item_schema) = obj.get("items") {
        for (i, item) in items.iter().enumerate() {
            check(doc, item_schema, item, &format!("{at}[{i}]"), depth + 1)?;
        }
    }
    Ok(())
}

fn check_object(
    doc: &Value,
    obj: &Map<String, Value>,
    map: &Map<String, Value>,
    at: &str,
    depth: usize,
) -> Result<(), String> {
    if let Some(Value::Array(required)) = obj.get("required") {
        for name in required.iter().filter_map(Value::as_str) {
            if !map.contains_key(name) {
                return Err(format!("{at}: property \"{name}\" is missing"));
            }
        }
    }
    let len = map.len() as u64;
    if let Some(min) = obj.get("minProperties").and_then(Value::as_u64) {
        if len < min {
            return Err(format!("{at}: object has fewer than {min} properties"));
        }
    }
    if let Some(max) = obj.get("maxProperties").and_then(Value::as_u64) {
        if len > max {
            return Err(format!("{at}: object has more than {max} properties"));
        }
    }

    let properties = obj.get("properties").and_then(Value::as_object);
    for (key, v) in map {
        let child_at = format!("{at}.{key}");
        match properties.and_then(|p| p.get(key)) {
            Some(prop) => check(doc, prop, v, &child_at, depth + 1)?,
            None => match obj.get("additionalProperties") {
                Some(Value::Bool(false)) => {
                    return Err(format!("{at}: property \"{key}\" is unsupported"));
                }
                Some(extra @ Value::Object(_)) => check(doc, extra, v, &child_at, depth + 1)?,
                _ => {}
            },
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn required_properties_are_enforced_through_refs() {
        let doc = json!({
            "components": {"schemas": {"User": {
                "type": "object",
                "required": ["username", "email"],
                "properties": {"username": {"type": "string"}, "email": {"type": "string"}}
            }}}
        });
        let schema = json!({"$ref": "#/components/schemas/User"});
        assert!(validate(&doc, &schema, &json!({"username": "alice", "email": "a@example.com"})).is_ok());
        let err = validate(&doc, &schema, &json!({"username": "alice"})).unwrap_err();
        assert!(err.contains("\"email\""), "{err}");
    }

    #[test]
    fn integer_accepts_whole_floats_only() {
        let doc = json!({});
        let schema = json!({"type": "integer"});
        assert!(validate(&doc, &schema, &json!(3)).is_ok());
        assert!(validate(&doc, &schema, &json!(3.0)).is_ok());
        assert!(validate(&doc, &schema, &json!(3.5)).is_err());
        assert!(validate(&doc, &schema, &json!("3")).is_err());
    }

    #[test]
    fn nullable_and_type_lists_allow_null() {
        let doc = json!({});
        assert!(validate(&doc, &json!({"type": "string", "nullable": true}), &Value::Null).is_ok());
        assert!(validate(&doc, &json!({"type": ["string", "null"]}), &Value::Null).is_ok());
        assert!(validate(&doc, &json!({"type": "string"}), &Value::Null).is_err());
    }

    #[test]
    fn nested_errors_carry_their_location() {
        let doc = json!({});
        let schema = json!({
            "type": "object",
            "properties": {"items": {"type": "array", "items": {"type": "integer", "minimum": 1}}}
        });
        let err = validate(&doc, &schema, &json!({"items": [1, 0]})).unwrap_err();
        assert!(err.starts_with("$.items[1]"), "{err}");
    }

    #[test]
    fn composition_keywords() {
        let doc = json!({});
        let one_of = json!({"oneOf": [{"type": "string"}, {"type": "integer"}]});
        assert!(validate(&doc, &one_of, &json!(1)).is_ok());
        assert!(validate(&doc, &one_of, &json!(true)).is_err());

        let closed = json!({"type": "object", "properties": {"a": {}}, "additionalProperties": false});
        assert!(validate(&doc, &closed, &json!({"a": 1, "b": 2})).is_err());
    }
}
