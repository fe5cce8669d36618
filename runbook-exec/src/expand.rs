use std::path::Path;

use runbook_core::expressions::{eval_str, expand_value, is_truthy, EvalEnv};
use runbook_core::{FuncRegistry, LoadError, ParseError};
use serde_json::Value;

use crate::error::{ConfigError, RunError};
use crate::store::Store;

const JSON_SCHEME: &str = "json://";
const FILE_SCHEME: &str = "file://";

/// Expand templates in `value`; the running step's `current` result is visible.
pub fn expand(store: &Store, value: &Value) -> Result<Value, RunError> {
    let env = store.env();
    Ok(expand_value(value, &EvalEnv::new(&env).with_funcs(store.funcs()))?)
}

/// Expand templates before the running step has recorded anything.
pub fn expand_before_record(store: &Store, value: &Value) -> Result<Value, RunError> {
    let env = store.env_before_record();
    Ok(expand_value(value, &EvalEnv::new(&env).with_funcs(store.funcs()))?)
}

/// Evaluate a bare expression (guard, predicate, test, bind value).
pub fn eval_expr(store: &Store, expr: &str) -> Result<Value, RunError> {
    let env = store.env();
    Ok(eval_str(expr, &EvalEnv::new(&env).with_funcs(store.funcs()))?)
}

pub fn eval_cond(store: &Store, expr: &str) -> Result<bool, RunError> {
    eval_expr(store, expr).map(|v| is_truthy(&v))
}

/// Resolve file schemes: `json://path` loads and expands a JSON document,
/// `file://path` loads raw text. Paths resolve against `root`. Other values
/// pass through untouched.
pub fn evaluate_schema(value: Value, root: &Path, env: &Value, funcs: &FuncRegistry) -> Result<Value, RunError> {
    let Value::String(s) = &value else {
        return Ok(value);
    };
    if let Some(rel) = s.strip_prefix(JSON_SCHEME) {
        let path = root.join(rel);
        let text = read(&path)?;
        let doc: Value = serde_json::from_str(&text).map_err(|e| {
            ConfigError::Load(LoadError::Parse {
                path: path.display().to_string(),
                source: ParseError::Json(e),
            })
        })?;
        return Ok(expand_value(&doc, &EvalEnv::new(env).with_funcs(funcs))?);
    }
    if let Some(rel) = s.strip_prefix(FILE_SCHEME) {
        return Ok(Value::String(read(&root.join(rel))?));
    }
    Ok(value)
}

fn read(path: &Path) -> Result<String, RunError> {
    std::fs::read_to_string(path).map_err(|source| {
        RunError::Config(ConfigError::Load(LoadError::Io {
            path: path.to_path_buf(),
            source,
        }))
    })
}
