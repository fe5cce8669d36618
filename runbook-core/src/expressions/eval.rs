use std::cmp::Ordering;

use serde_json::{Number, Value};

use super::funcs::{call_builtin, FuncRegistry};
use super::parser::{BinaryOp, Expr, UnaryOp};
use super::ExprError;

/// Evaluation environment: the store rendered as one JSON object plus the
/// user function registry.
#[derive(Clone, Copy)]
pub struct EvalEnv<'a> {
    pub root: &'a Value,
    pub funcs: Option<&'a FuncRegistry>,
}

impl<'a> EvalEnv<'a> {
    pub fn new(root: &'a Value) -> Self {
        Self { root, funcs: None }
    }

    pub fn with_funcs(mut self, funcs: &'a FuncRegistry) -> Self {
        self.funcs = Some(funcs);
        self
    }
}

pub fn evaluate(expr: &Expr, env: &EvalEnv<'_>) -> Result<Value, ExprError> {
    match expr {
        Expr::Literal(v) => Ok(v.clone()),
        Expr::Array(items) => items
            .iter()
            .map(|e| evaluate(e, env))
            .collect::<Result<Vec<_>, _>>()
            .map(Value::Array),
        Expr::Ident(name) => env
            .root
            .get(name)
            .cloned()
            .ok_or_else(|| ExprError::UndefinedVariable(name.clone())),
        Expr::Member {
            target,
            name,
            optional,
        } => {
            let base = match evaluate(target, env) {
                Ok(v) => v,
                Err(e) if *optional && e.is_lookup_miss() => return Ok(Value::Null),
                Err(e) => return Err(e),
            };
            member(&base, name, *optional, || target.path())
        }
        Expr::Index { target, index } => {
            let base = evaluate(target, env)?;
            let idx = evaluate(index, env)?;
            index_value(&base, &idx, || target.path())
        }
        Expr::Call { name, args } => {
            let args = args
                .iter()
                .map(|a| evaluate(a, env))
                .collect::<Result<Vec<_>, _>>()?;
            if let Some(result) = call_builtin(name, &args) {
                return result;
            }
            let func = env
                .funcs
                .and_then(|f| f.get(name))
                .ok_or_else(|| ExprError::UnknownFunction(name.clone()))?;
            func(&args).map_err(|message| ExprError::Function {
                name: name.clone(),
                message,
            })
        }
        Expr::Unary { op, expr } => {
            let v = evaluate(expr, env)?;
            match op {
                UnaryOp::Not => Ok(Value::Bool(!is_truthy(&v))),
                UnaryOp::Neg => match as_num(&v) {
                    Some(Num::Int(i)) => i.checked_neg().map(Value::from).ok_or(ExprError::Overflow),
                    Some(Num::Float(f)) => float_value(-f),
                    None => Err(ExprError::Type(format!("cannot negate {}", type_name(&v)))),
                },
            }
        }
        Expr::Binary { op, left, right } => eval_binary(*op, left, right, env),
    }
}

fn eval_binary(op: BinaryOp, left: &Expr, right: &Expr, env: &EvalEnv<'_>) -> Result<Value, ExprError> {
    match op {
        BinaryOp::And => {
            let l = evaluate(left, env)?;
            if !is_truthy(&l) {
                return Ok(Value::Bool(false));
            }
            Ok(Value::Bool(is_truthy(&evaluate(right, env)?)))
        }
        BinaryOp::Or => {
            let l = evaluate(left, env)?;
            if is_truthy(&l) {
                return Ok(Value::Bool(true));
            }
            Ok(Value::Bool(is_truthy(&evaluate(right, env)?)))
        }
        BinaryOp::Coalesce => match evaluate(left, env) {
            Ok(Value::Null) => evaluate(right, env),
            Ok(v) => Ok(v),
            Err(e) if e.is_lookup_miss() => evaluate(right, env),
            Err(e) => Err(e),
        },
        _ => {
            let l = evaluate(left, env)?;
            let r = evaluate(right, env)?;
            apply_binary(op, &l, &r)
        }
    }
}

fn apply_binary(op: BinaryOp, l: &Value, r: &Value) -> Result<Value, ExprError> {
    match op {
        BinaryOp::Eq => Ok(Value::Bool(values_equal(l, r))),
        BinaryOp::Ne => Ok(Value::Bool(!values_equal(l, r))),
        BinaryOp::Lt | BinaryOp::Le | BinaryOp::Gt | BinaryOp::Ge => {
            let ord = compare(l, r)?;
            let result = match op {
                BinaryOp::Lt => ord == Ordering::Less,
                BinaryOp::Le => ord != Ordering::Greater,
                BinaryOp::Gt => ord == Ordering::Greater,
                _ => ord != Ordering::Less,
            };
            Ok(Value::Bool(result))
        }
        BinaryOp::In => match r {
            Value::Array(items) => Ok(Value::Bool(items.iter().any(|i| values_equal(i, l)))),
            Value::Object(map) => match l {
                Value::String(k) => Ok(Value::Bool(map.contains_key(k))),
                other => Err(ExprError::Type(format!(
                    "object keys are strings, got {}",
                    type_name(other)
                ))),
            },
            Value::String(hay) => match l {
                Value::String(needle) => Ok(Value::Bool(hay.contains(needle.as_str()))),
                other => Err(ExprError::Type(format!(
                    "cannot search a string for {}",
                    type_name(other)
                ))),
            },
            other => Err(ExprError::Type(format!("'in' needs a collection, got {}", type_name(other)))),
        },
        BinaryOp::Add => match (l, r) {
            (Value::String(a), Value::String(b)) => Ok(Value::String(format!("{a}{b}"))),
            _ => arithmetic(op, l, r),
        },
        _ => arithmetic(op, l, r),
    }
}

fn arithmetic(op: BinaryOp, l: &Value, r: &Value) -> Result<Value, ExprError> {
    let (a, b) = match (as_num(l), as_num(r)) {
        (Some(a), Some(b)) => (a, b),
        _ => {
            return Err(ExprError::Type(format!(
                "unsupported operand types for {op:?}: {} and {}",
                type_name(l),
                type_name(r)
            )))
        }
    };

    match op {
        BinaryOp::Div => {
            let (x, y) = (a.as_f64(), b.as_f64());
            if y == 0.0 {
                return Err(ExprError::DivisionByZero);
            }
            float_value(x / y)
        }
        BinaryOp::Rem => match (a, b) {
            (Num::Int(_), Num::Int(0)) => Err(ExprError::DivisionByZero),
            (Num::Int(x), Num::Int(y)) => x.checked_rem(y).map(Value::from).ok_or(ExprError::Overflow),
            _ => Err(ExprError::Type("'%' requires integer operands".into())),
        },
        _ => match (a, b) {
            (Num::Int(x), Num::Int(y)) => {
                let out = match op {
                    BinaryOp::Add => x.checked_add(y),
                    BinaryOp::Sub => x.checked_sub(y),
                    _ => x.checked_mul(y),
                };
                out.map(Value::from).ok_or(ExprError::Overflow)
            }
            (a, b) => {
                let (x, y) = (a.as_f64(), b.as_f64());
                float_value(match op {
                    BinaryOp::Add => x + y,
                    BinaryOp::Sub => x - y,
                    _ => x * y,
                })
            }
        },
    }
}

fn member(base: &Value, name: &str, optional: bool, path: impl Fn() -> String) -> Result<Value, ExprError> {
    match base {
        Value::Object(map) => match map.get(name) {
            Some(v) => Ok(v.clone()),
            None if optional => Ok(Value::Null),
            None => Err(ExprError::MissingKey {
                path: path(),
                key: name.to_string(),
            }),
        },
        Value::Array(_) => match name.parse::<i64>() {
            Ok(i) => match index_value(base, &Value::from(i), &path) {
                Err(e) if optional && e.is_lookup_miss() => Ok(Value::Null),
                other => other,
            },
            Err(_) if optional => Ok(Value::Null),
            Err(_) => Err(ExprError::NotIndexable {
                path: path(),
                kind: "array",
            }),
        },
        _ if optional => Ok(Value::Null),
        other => Err(ExprError::NotIndexable {
            path: path(),
            kind: type_name(other),
        }),
    }
}

fn index_value(base: &Value, idx: &Value, path: impl Fn() -> String) -> Result<Value, ExprError> {
    match (base, idx) {
        (Value::Array(items), Value::Number(n)) => {
            let i = n
                .as_i64()
                .ok_or_else(|| ExprError::Type(format!("array index must be an integer, got {n}")))?;
            let len = items.len();
            let resolved = if i < 0 { len as i64 + i } else { i };
            if resolved < 0 || resolved as usize >= len {
                return Err(ExprError::IndexOutOfRange {
                    path: path(),
                    index: i,
                    len,
                });
            }
            Ok(items[resolved as usize].clone())
        }
        (Value::Object(map), Value::String(key)) => map.get(key).cloned().ok_or_else(|| ExprError::MissingKey {
            path: path(),
            key: key.clone(),
        }),
        (Value::Array(_), other) | (Value::Object(_), other) => Err(ExprError::Type(format!(
            "{}: invalid index of type {}",
            path(),
            type_name(other)
        ))),
        (other, _) => Err(ExprError::NotIndexable {
            path: path(),
            kind: type_name(other),
        }),
    }
}

/// false, null, 0, "" and empty collections are falsy.
pub fn is_truthy(v: &Value) -> bool {
    match v {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().map(|f| f != 0.0).unwrap_or(true),
        Value::String(s) => !s.is_empty(),
        Value::Array(a) => !a.is_empty(),
        Value::Object(o) => !o.is_empty(),
    }
}

/// Interpolation rendering: null renders empty, strings render bare.
pub fn render(v: &Value) -> String {
    match v {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => n.to_string(),
        other => serde_json::to_string(other).unwrap_or_default(),
    }
}

pub(crate) fn type_name(v: &Value) -> &'static str {
    match v {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(n) if n.is_i64() || n.is_u64() => "int",
        Value::Number(_) => "float",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

#[derive(Debug, Clone, Copy)]
pub(crate) enum Num {
    Int(i64),
    Float(f64),
}

impl Num {
    pub(crate) fn as_f64(self) -> f64 {
        match self {
            Num::Int(i) => i as f64,
            Num::Float(f) => f,
        }
    }
}

pub(crate) fn as_num(v: &Value) -> Option<Num> {
    let Value::Number(n) = v else {
        return None;
    };
    match n.as_i64() {
        Some(i) => Some(Num::Int(i)),
        None => n.as_f64().map(Num::Float),
    }
}

pub(crate) fn float_value(f: f64) -> Result<Value, ExprError> {
    Number::from_f64(f)
        .map(Value::Number)
        .ok_or_else(|| ExprError::Type(format!("{f} is not a finite number")))
}

pub(crate) fn values_equal(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Number(_), Value::Number(_)) => match (as_num(a), as_num(b)) {
            (Some(Num::Int(x)), Some(Num::Int(y))) => x == y,
            (Some(x), Some(y)) => x.as_f64() == y.as_f64(),
            _ => false,
        },
        (Value::Array(x), Value::Array(y)) => {
            x.len() == y.len() && x.iter().zip(y).all(|(i, j)| values_equal(i, j))
        }
        (Value::Object(x), Value::Object(y)) => {
            x.len() == y.len()
                && x
                    .iter()
                    .all(|(k, v)| y.get(k).is_some_and(|w| values_equal(v, w)))
        }
        _ => a == b,
    }
}

fn compare(l: &Value, r: &Value) -> Result<Ordering, ExprError> {
    match (l, r) {
        (Value::String(a), Value::String(b)) => Ok(a.cmp(b)),
        _ => match (as_num(l), as_num(r)) {
            (Some(Num::Int(a)), Some(Num::Int(b))) => Ok(a.cmp(&b)),
            (Some(a), Some(b)) => a
                .as_f64()
                .partial_cmp(&b.as_f64())
                .ok_or_else(|| ExprError::Type("incomparable numbers".into())),
            _ => Err(ExprError::Type(format!(
                "cannot compare {} with {}",
                type_name(l),
                type_name(r)
            ))),
        },
    }
}
