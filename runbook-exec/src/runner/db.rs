use std::sync::Arc;

use async_trait::async_trait;
use runbook_core::types::DbQuery;
use serde_json::{json, Map, Value};
use sqlx::any::{AnyPoolOptions, AnyRow};
use sqlx::{AnyPool, Column, Row, ValueRef};

use super::RunnerOutput;
use crate::error::{RunError, RunnerError};

const ROW_KEYWORDS: &[&str] = &["SELECT", "WITH", "PRAGMA", "SHOW", "EXPLAIN", "VALUES", "DESCRIBE"];

#[derive(Debug, Clone, PartialEq)]
pub enum StatementOutcome {
    Rows(Vec<Map<String, Value>>),
    Exec {
        last_insert_id: Option<i64>,
        rows_affected: u64,
    },
}

impl StatementOutcome {
    fn into_value(self) -> Value {
        match self {
            StatementOutcome::Rows(rows) => json!({ "rows": rows }),
            StatementOutcome::Exec {
                last_insert_id,
                rows_affected,
            } => json!({
                "last_insert_id": last_insert_id,
                "rows_affected": rows_affected,
            }),
        }
    }
}

#[async_trait]
pub trait DbClient: Send + Sync {
    /// Run one statement. `returns_rows` selects fetch over execute.
    async fn run_statement(&self, stmt: &str, returns_rows: bool) -> Result<StatementOutcome, String>;
}

/// `sqlx` any-driver pool. Connects on first use.
pub struct SqlxDbClient {
    pool: AnyPool,
}

impl SqlxDbClient {
    pub fn connect_lazy(dsn: &str) -> Result<Self, String> {
        sqlx::any::install_default_drivers();
        let pool = AnyPoolOptions::new()
            .max_connections(1)
            .connect_lazy(dsn)
            .map_err(|e| e.to_string())?;
        Ok(Self { pool })
    }
}

#[async_trait]
impl DbClient for SqlxDbClient {
    async fn run_statement(&self, stmt: &str, returns_rows: bool) -> Result<StatementOutcome, String> {
        if returns_rows {
            let rows = sqlx::query(stmt)
                .fetch_all(&self.pool)
                .await
                .map_err(|e| e.to_string())?;
            return Ok(StatementOutcome::Rows(rows.iter().map(row_to_map).collect()));
        }
        let done = sqlx::query(stmt)
            .execute(&self.pool)
            .await
            .map_err(|e| e.to_string())?;
        Ok(StatementOutcome::Exec {
            last_insert_id: done.last_insert_id(),
            rows_affected: done.rows_affected(),
        })
    }
}

fn row_to_map(row: &AnyRow) -> Map<String, Value> {
    let mut m = Map::new();
    for (i, col) in row.columns().iter().enumerate() {
        m.insert(col.name().to_string(), column_value(row, i));
    }
    m
}

fn column_value(row: &AnyRow, i: usize) -> Value {
    if row.try_get_raw(i).map(|v| v.is_null()).unwrap_or(true) {
        return Value::Null;
    }
    if let Ok(v) = row.try_get::<i64, _>(i) {
        return Value::from(v);
    }
    if let Ok(v) = row.try_get::<f64, _>(i) {
        return Value::from(v);
    }
    if let Ok(v) = row.try_get::<bool, _>(i) {
        return Value::Bool(v);
    }
    if let Ok(v) = row.try_get::<String, _>(i) {
        return Value::String(v);
    }
    if let Ok(v) = row.try_get::<Vec<u8>, _>(i) {
        return Value::String(String::from_utf8_lossy(&v).into_owned());
    }
    Value::Null
}

pub struct DbRunner {
    name: String,
    client: Arc<dyn DbClient>,
}

impl std::fmt::Debug for DbRunner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DbRunner").field("name", &self.name).finish_non_exhaustive()
    }
}

impl DbRunner {
    pub fn new(name: impl Into<String>, client: Arc<dyn DbClient>) -> Self {
        Self {
            name: name.into(),
            client,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Run every statement in order; the last one's outcome is the result.
    pub async fn run(&self, query: &DbQuery) -> Result<RunnerOutput, RunError> {
        let mut last = None;
        for stmt in split_statements(&query.stmt) {
            let returns_rows = returns_rows(&stmt);
            tracing::debug!(target: "runbook::db", runner = %self.name, stmt = %stmt, "db statement");
            let outcome = self
                .client
                .run_statement(&stmt, returns_rows)
                .await
                .map_err(RunnerError::Db)?;
            last = Some(outcome);
        }
        let result = last
            .map(StatementOutcome::into_value)
            .unwrap_or_else(|| json!({ "rows": [] }));
        Ok(RunnerOutput {
            result: Some(result),
            ..RunnerOutput::default()
        })
    }
}

fn returns_rows(stmt: &str) -> bool {
    let first = stmt
        .split_whitespace()
        .next()
        .unwrap_or_default()
        .trim_start_matches('(')
        .to_ascii_uppercase();
    ROW_KEYWORDS.contains(&first.as_str()) || stmt.to_ascii_uppercase().contains(" RETURNING ")
}

/// Split on `;` outside quotes and comments. Empty statements are dropped.
pub fn split_statements(input: &str) -> Vec<String> {
    let mut out = Vec::new();
    let mut current = String::new();
    let mut chars = input.chars().peekable();
    let mut quote: Option<char> = None;

    while let Some(c) = chars.next() {
        match quote {
            Some(q) => {
                current.push(c);
                if c == q {
                    // A doubled quote is an escaped quote.
                    if chars.peek() == Some(&q) {
                        current.push(q);
                        chars.next();
                    } else {
                        quote = None;
                    }
                }
            }
            None => match c {
                '\'' | '"' | '`' => {
                    quote = Some(c);
                    current.push(c);
                }
                '-' if chars.peek() == Some(&'-') => {
                    for c in chars.by_ref() {
                        if c == '\n' {
                            current.push('\n');
                            break;
                        }
                    }
                }
                ';' => {
                    let stmt = current.trim();
                    if !stmt.is_empty() {
                        out.push(stmt.to_string());
                    }
                    current.clear();
                }
                _ => current.push(c),
            },
        }
    }
    let stmt = current.trim();
    if !stmt.is_empty() {
        out.push(stmt.to_string());
    }
    out
}
