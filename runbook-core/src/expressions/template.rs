use serde_json::{Map, Value};

use super::eval::{evaluate, render, EvalEnv};
use super::parser::{parse_expr, Expr};
use super::ExprError;

const OPEN: &str = "{{";
const CLOSE: &str = "}}";

#[derive(Debug, Clone, PartialEq)]
pub enum Segment {
    Literal(String),
    Expr(Expr),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Template {
    pub segments: Vec<Segment>,
}

impl Template {
    pub fn has_expressions(&self) -> bool {
        self.segments.iter().any(|s| matches!(s, Segment::Expr(_)))
    }

    /// The expression when the template is exactly one marker. Any surrounding
    /// text, whitespace included, makes the template render to a string.
    pub fn single_expr(&self) -> Option<&Expr> {
        match self.segments.as_slice() {
            [Segment::Expr(e)] => Some(e),
            _ => None,
        }
    }

    pub fn render(&self, env: &EvalEnv<'_>) -> Result<Value, ExprError> {
        if let Some(expr) = self.single_expr() {
            return evaluate(expr, env);
        }
        let mut out = String::new();
        for seg in &self.segments {
            match seg {
                Segment::Literal(text) => out.push_str(text),
                Segment::Expr(expr) => out.push_str(&render(&evaluate(expr, env)?)),
            }
        }
        Ok(Value::String(out))
    }
}

pub fn parse_template(input: &str) -> Result<Template, ExprError> {
    let mut segments = Vec::new();
    let mut rest = input;

    while let Some(start) = rest.find(OPEN) {
        if start > 0 {
            segments.push(Segment::Literal(rest[..start].to_string()));
        }
        let after = &rest[start + OPEN.len()..];
        // No nesting: the first closing marker ends the expression.
        let end = after.find(CLOSE).ok_or(ExprError::UnclosedTemplate)?;
        segments.push(Segment::Expr(parse_expr(after[..end].trim())?));
        rest = &after[end + CLOSE.len()..];
    }

    if !rest.is_empty() {
        segments.push(Segment::Literal(rest.to_string()));
    }

    Ok(Template { segments })
}

/// Expand every template in a value tree. Mapping keys are expanded too and
/// rendered back to strings.
pub fn expand_value(value: &Value, env: &EvalEnv<'_>) -> Result<Value, ExprError> {
    match value {
        Value::String(s) => expand_string(s, env),
        Value::Array(items) => items
            .iter()
            .map(|v| expand_value(v, env))
            .collect::<Result<Vec<_>, _>>()
            .map(Value::Array),
        Value::Object(map) => {
            let mut out = Map::with_capacity(map.len());
            for (k, v) in map {
                let key = match expand_string(k, env)? {
                    Value::String(s) => s,
                    other => render(&other),
                };
                out.insert(key, expand_value(v, env)?);
            }
            Ok(Value::Object(out))
        }
        other => Ok(other.clone()),
    }
}

fn expand_string(s: &str, env: &EvalEnv<'_>) -> Result<Value, ExprError> {
    if !s.contains(OPEN) {
        return Ok(Value::String(s.to_string()));
    }
    parse_template(s)?.render(env)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn splits_literals_and_markers() {
        let t = parse_template("/users/{{ vars.id }}/posts").unwrap();
        assert_eq!(t.segments.len(), 3);
        assert!(t.single_expr().is_none());
    }

    #[test]
    fn only_a_bare_marker_is_raw() {
        assert!(parse_template("{{ 1 }}").unwrap().single_expr().is_some());
        assert!(parse_template("  {{ 1 }} ").unwrap().single_expr().is_none());
    }

    #[test]
    fn unclosed_marker_is_an_error() {
        assert_eq!(parse_template("{{ vars.x"), Err(ExprError::UnclosedTemplate));
    }

    #[test]
    fn single_braces_are_literal() {
        let t = parse_template("{\"a\": 1}").unwrap();
        assert!(!t.has_expressions());
    }
}
