use std::collections::BTreeMap;
use std::fmt;
use std::sync::{Arc, RwLock};

use serde_json::Value;

use super::eval::{as_num, float_value, is_truthy, type_name, values_equal, Num};
use super::ExprError;

pub type UserFn = dyn Fn(&[Value]) -> Result<Value, String> + Send + Sync;

/// Names resolved before the user registry is consulted.
pub const BUILTINS: &[&str] = &[
    "string",
    "int",
    "float",
    "bool",
    "len",
    "keys",
    "contains",
    "urlencode",
    "type",
];

/// Shared registry of user-supplied helper functions.
///
/// Cloning yields another handle to the same registry, so functions registered
/// through any handle are visible to every operator holding one.
#[derive(Clone, Default)]
pub struct FuncRegistry {
    inner: Arc<RwLock<BTreeMap<String, Arc<UserFn>>>>,
}

impl FuncRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register<F>(&self, name: impl Into<String>, f: F)
    where
        F: Fn(&[Value]) -> Result<Value, String> + Send + Sync + 'static,
    {
        if let Ok(mut guard) = self.inner.write() {
            guard.insert(name.into(), Arc::new(f));
        }
    }

    pub fn get(&self, name: &str) -> Option<Arc<UserFn>> {
        self.inner.read().ok().and_then(|g| g.get(name).cloned())
    }

    pub fn names(&self) -> Vec<String> {
        self.inner
            .read()
            .map(|g| g.keys().cloned().collect())
            .unwrap_or_default()
    }

    pub fn same_registry(&self, other: &FuncRegistry) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl fmt::Debug for FuncRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FuncRegistry").field("names", &self.names()).finish()
    }
}

pub(crate) fn call_builtin(name: &str, args: &[Value]) -> Option<Result<Value, ExprError>> {
    let result = match name {
        "string" => one(name, args).map(to_string),
        "int" => one(name, args).and_then(|v| to_int(name, v)),
        "float" => one(name, args).and_then(|v| to_float(name, v)),
        "bool" => one(name, args).map(|v| Value::Bool(is_truthy(v))),
        "len" => one(name, args).and_then(|v| match v {
            Value::String(s) => Ok(Value::from(s.chars().count())),
            Value::Array(a) => Ok(Value::from(a.len())),
            Value::Object(o) => Ok(Value::from(o.len())),
            other => Err(fail(name, format!("no length for {}", type_name(other)))),
        }),
        "keys" => one(name, args).and_then(|v| match v {
            Value::Object(o) => Ok(Value::Array(o.keys().cloned().map(Value::String).collect())),
            other => Err(fail(name, format!("expected object, got {}", type_name(other)))),
        }),
        "contains" => two(name, args).and_then(|(hay, needle)| match (hay, needle) {
            (Value::String(h), Value::String(n)) => Ok(Value::Bool(h.contains(n.as_str()))),
            (Value::Array(items), n) => Ok(Value::Bool(items.iter().any(|i| values_equal(i, n)))),
            (Value::Object(o), Value::String(k)) => Ok(Value::Bool(o.contains_key(k))),
            (h, n) => Err(fail(
                name,
                format!("cannot search {} for {}", type_name(h), type_name(n)),
            )),
        }),
        "urlencode" => one(name, args).and_then(|v| match v {
            Value::String(s) => Ok(Value::String(
                url::form_urlencoded::byte_serialize(s.as_bytes()).collect(),
            )),
            other => Err(fail(name, format!("expected string, got {}", type_name(other)))),
        }),
        "type" => one(name, args).map(|v| Value::String(type_name(v).to_string())),
        _ => return None,
    };
    Some(result)
}

fn fail(name: &str, message: String) -> ExprError {
    ExprError::Function {
        name: name.to_string(),
        message,
    }
}

fn one<'a>(name: &str, args: &'a [Value]) -> Result<&'a Value, ExprError> {
    match args {
        [v] => Ok(v),
        _ => Err(fail(name, format!("expected 1 argument, got {}", args.len()))),
    }
}

fn two<'a>(name: &str, args: &'a [Value]) -> Result<(&'a Value, &'a Value), ExprError> {
    match args {
        [a, b] => Ok((a, b)),
        _ => Err(fail(name, format!("expected 2 arguments, got {}", args.len()))),
    }
}

fn to_string(v: &Value) -> Value {
    Value::String(match v {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => n.to_string(),
        other => serde_json::to_string(other).unwrap_or_default(),
    })
}

fn to_int(name: &str, v: &Value) -> Result<Value, ExprError> {
    match v {
        Value::Number(_) => match as_num(v) {
            Some(Num::Int(i)) => Ok(Value::from(i)),
            Some(Num::Float(f)) if f.is_finite() && f.abs() < i64::MAX as f64 => {
                Ok(Value::from(f.trunc() as i64))
            }
            _ => Err(fail(name, format!("{v} does not fit in an integer"))),
        },
        Value::String(s) => s
            .trim()
            .parse::<i64>()
            .map(Value::from)
            .map_err(|_| fail(name, format!("cannot parse {s:?} as an integer"))),
        Value::Bool(b) => Ok(Value::from(i64::from(*b))),
        other => Err(fail(name, format!("cannot convert {} to int", type_name(other)))),
    }
}

fn to_float(name: &str, v: &Value) -> Result<Value, ExprError> {
    match v {
        Value::Number(_) => match as_num(v) {
            Some(n) => float_value(n.as_f64()),
            None => Err(fail(name, format!("{v} is not a number"))),
        },
        Value::String(s) => match s.trim().parse::<f64>() {
            Ok(f) => float_value(f),
            Err(_) => Err(fail(name, format!("cannot parse {s:?} as a float"))),
        },
        other => Err(fail(name, format!("cannot convert {} to float", type_name(other)))),
    }
}
