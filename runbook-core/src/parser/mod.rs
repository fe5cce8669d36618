use std::collections::{BTreeMap, HashSet};
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde_json::{Map, Value};

use crate::error::{LoadError, ParseError};
use crate::types::{
    Command, DbRunnerSpec, GrpcRunnerSpec, HttpRunnerSpec, IncludeConfig, IncludeRunnerSpec,
    RetrySpec, Runbook, RunnerSpec, SshRunnerSpec, StepDef, DEFAULT_RETRY_COUNT,
};

const BOOK_KEYS: &[&str] = &[
    "desc", "if", "runners", "vars", "steps", "debug", "force", "skipTest",
];
const STEP_KEYS: &[&str] = &["desc", "if", "retry", "loop", "test", "bind"];
const DB_SCHEMES: &[&str] = &["sqlite", "postgres", "postgresql", "mysql"];

/// Parse JSON or YAML into a JSON value. YAML mapping keys that are not strings
/// (`200:` in OpenAPI responses) are stringified.
pub fn parse_document_value(input: &str) -> Result<Value, ParseError> {
    let trimmed = input.trim_start();
    if trimmed.starts_with('{') || trimmed.starts_with('[') {
        if let Ok(v) = serde_json::from_str::<Value>(input) {
            return Ok(v);
        }
    }
    let yaml = serde_yaml::from_str::<serde_yaml::Value>(input)?;
    Ok(serde_json::to_value(yaml)?)
}

pub fn load_runbook(path: impl AsRef<Path>) -> Result<Runbook, LoadError> {
    let path = path.as_ref();
    let input = std::fs::read_to_string(path).map_err(|source| LoadError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let root = path
        .parent()
        .map(Path::to_path_buf)
        .unwrap_or_else(|| PathBuf::from("."));
    let doc = parse_document_value(&input).map_err(|source| LoadError::Parse {
        path: path.display().to_string(),
        source,
    })?;
    let mut book = runbook_from_value(&doc, root, &path.display().to_string())?;
    book.path = Some(path.to_path_buf());
    Ok(book)
}

/// Load every runbook the glob `patterns` match, in pattern then path order.
/// A file matched twice loads once. With `skip_included`, runbooks that
/// another loaded runbook includes are dropped, leaving only entry points.
pub fn load_runbooks<I, S>(patterns: I, skip_included: bool) -> Result<Vec<Runbook>, LoadError>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut seen = HashSet::new();
    let mut books = Vec::new();
    for pattern in patterns {
        let pattern = pattern.as_ref();
        let entries = glob::glob(pattern).map_err(|e| LoadError::Pattern {
            pattern: pattern.to_string(),
            message: e.to_string(),
        })?;
        let mut matched = false;
        for entry in entries {
            let path = entry.map_err(|e| {
                let path = e.path().to_path_buf();
                LoadError::Io {
                    path,
                    source: e.into_error(),
                }
            })?;
            if !path.is_file() || !is_runbook_path(&path.to_string_lossy()) {
                continue;
            }
            matched = true;
            if seen.insert(canonical(&path)) {
                books.push(load_runbook(&path)?);
            }
        }
        if !matched {
            // A plain path that does not exist reports the read error.
            if !pattern.contains(['*', '?', '[']) {
                books.push(load_runbook(pattern)?);
                continue;
            }
            return Err(LoadError::NoMatch(pattern.to_string()));
        }
    }

    if skip_included {
        let included: HashSet<PathBuf> = books
            .iter()
            .flat_map(Runbook::included_paths)
            .map(|p| canonical(&p))
            .collect();
        books.retain(|book| {
            book.path
                .as_deref()
                .map_or(true, |p| !included.contains(&canonical(p)))
        });
    }
    Ok(books)
}

fn canonical(path: &Path) -> PathBuf {
    path.canonicalize().unwrap_or_else(|_| path.to_path_buf())
}

pub fn parse_runbook_str(input: &str, root: impl Into<PathBuf>) -> Result<Runbook, LoadError> {
    let doc = parse_document_value(input).map_err(|source| LoadError::Parse {
        path: "<inline>".to_string(),
        source,
    })?;
    runbook_from_value(&doc, root.into(), "<inline>")
}

pub fn runbook_from_value(doc: &Value, root: PathBuf, origin: &str) -> Result<Runbook, LoadError> {
    let obj = doc.as_object().ok_or_else(|| LoadError::Parse {
        path: origin.to_string(),
        source: ParseError::NotAMapping,
    })?;

    if let Some(unknown) = obj.keys().find(|k| !BOOK_KEYS.contains(&k.as_str())) {
        return Err(LoadError::invalid(origin, format!("unknown top-level key '{unknown}'")));
    }

    let mut book = Runbook {
        root,
        desc: opt_string(obj.get("desc")),
        guard: opt_expr(obj.get("if")),
        debug: flag(obj.get("debug")),
        force: flag(obj.get("force")),
        skip_test: flag(obj.get("skipTest")),
        ..Runbook::default()
    };

    match obj.get("vars") {
        None | Some(Value::Null) => {}
        Some(Value::Object(vars)) => book.vars = vars.clone(),
        Some(_) => return Err(LoadError::invalid(origin, "vars must be a mapping")),
    }

    book.runners = match obj.get("runners") {
        None | Some(Value::Null) => BTreeMap::new(),
        Some(Value::Object(runners)) => runners
            .iter()
            .map(|(name, v)| {
                parse_runner(v)
                    .map(|spec| (name.clone(), spec))
                    .map_err(|m| LoadError::invalid(format!("{origin}: runners.{name}"), m))
            })
            .collect::<Result<_, _>>()?,
        Some(_) => return Err(LoadError::invalid(origin, "runners must be a mapping")),
    };

    match obj.get("steps") {
        None | Some(Value::Null) => {}
        Some(Value::Array(steps)) => {
            for (i, v) in steps.iter().enumerate() {
                let location = format!("{origin}: steps[{i}]");
                book.steps.push(parse_step(i, None, v, &location)?);
            }
        }
        Some(Value::Object(steps)) => {
            book.use_map = true;
            for (i, (key, v)) in steps.iter().enumerate() {
                let location = format!("{origin}: steps.{key}");
                book.steps.push(parse_step(i, Some(key.clone()), v, &location)?);
            }
        }
        Some(_) => return Err(LoadError::invalid(origin, "steps must be a list or a mapping")),
    }

    Ok(book)
}

pub fn parse_runner(v: &Value) -> Result<RunnerSpec, String> {
    match v {
        Value::String(s) => parse_runner_str(s),
        Value::Object(o) => {
            if let Some(endpoint) = o.get("endpoint").and_then(Value::as_str) {
                Ok(RunnerSpec::Http(HttpRunnerSpec {
                    endpoint: endpoint.to_string(),
                    openapi3: opt_string(o.get("openapi3")),
                    skip_validate_request: flag(o.get("skipValidateRequest")),
                    skip_validate_response: flag(o.get("skipValidateResponse")),
                    not_follow_redirect: flag(o.get("notFollowRedirect")),
                    cacert: opt_string(o.get("cacert")).map(PathBuf::from),
                    cert: opt_string(o.get("cert")).map(PathBuf::from),
                    key: opt_string(o.get("key")).map(PathBuf::from),
                    skip_verify: flag(o.get("skipVerify")),
                    timeout: match o.get("timeout") {
                        None | Some(Value::Null) => None,
                        Some(t) => Some(parse_duration(t)?),
                    },
                }))
            } else if let Some(dsn) = o.get("dsn").and_then(Value::as_str) {
                Ok(RunnerSpec::Db(DbRunnerSpec {
                    dsn: dsn.to_string(),
                }))
            } else if let Some(addr) = o.get("addr").and_then(Value::as_str) {
                Ok(RunnerSpec::Grpc(GrpcRunnerSpec {
                    addr: addr.to_string(),
                    tls: flag(o.get("tls")),
                }))
            } else if let Some(host) = o.get("host").and_then(Value::as_str) {
                let port = match o.get("port") {
                    None | Some(Value::Null) => None,
                    Some(p) => Some(
                        p.as_u64()
                            .and_then(|p| u16::try_from(p).ok())
                            .ok_or_else(|| format!("invalid ssh port {p}"))?,
                    ),
                };
                Ok(RunnerSpec::Ssh(SshRunnerSpec {
                    host: host.to_string(),
                    user: opt_string(o.get("user")),
                    port,
                    key: opt_string(o.get("key")).map(PathBuf::from),
                }))
            } else if let Some(path) = o.get("path").and_then(Value::as_str) {
                Ok(RunnerSpec::Include(IncludeRunnerSpec {
                    path: path.to_string(),
                    params: o
                        .get("params")
                        .and_then(Value::as_object)
                        .cloned()
                        .unwrap_or_default(),
                }))
            } else {
                Err("runner mapping needs one of endpoint, dsn, addr, host or path".to_string())
            }
        }
        _ => Err("runner must be a string or a mapping".to_string()),
    }
}

fn parse_runner_str(s: &str) -> Result<RunnerSpec, String> {
    let scheme = s.split_once(':').map(|(scheme, _)| scheme.to_ascii_lowercase());
    match scheme.as_deref() {
        Some("http") | Some("https") => Ok(RunnerSpec::Http(HttpRunnerSpec::new(s))),
        Some("grpc") => {
            let addr = s.trim_start_matches("grpc://").trim_end_matches('/');
            Ok(RunnerSpec::Grpc(GrpcRunnerSpec {
                addr: addr.to_string(),
                tls: false,
            }))
        }
        Some("ssh") => {
            let url = url::Url::parse(s).map_err(|e| format!("invalid ssh url: {e}"))?;
            let host = url
                .host_str()
                .ok_or_else(|| "ssh url needs a host".to_string())?;
            Ok(RunnerSpec::Ssh(SshRunnerSpec {
                host: host.to_string(),
                user: Some(url.username())
                    .filter(|u| !u.is_empty())
                    .map(str::to_string),
                port: url.port(),
                key: None,
            }))
        }
        Some(scheme) if DB_SCHEMES.contains(&scheme) => Ok(RunnerSpec::Db(DbRunnerSpec {
            dsn: s.to_string(),
        })),
        _ if is_runbook_path(s) => Ok(RunnerSpec::Include(IncludeRunnerSpec {
            path: s.to_string(),
            params: Map::new(),
        })),
        Some(scheme) => Err(format!("unsupported runner scheme '{scheme}'")),
        None => Err(format!("cannot infer runner type from '{s}'")),
    }
}

fn is_runbook_path(s: &str) -> bool {
    [".yml", ".yaml", ".json"].iter().any(|ext| s.ends_with(ext))
}

fn parse_step(index: usize, key: Option<String>, v: &Value, location: &str) -> Result<StepDef, LoadError> {
    let obj = v
        .as_object()
        .ok_or_else(|| LoadError::invalid(location, "step must be a mapping"))?;

    let mut step = StepDef::new(index);
    step.key = key;
    step.desc = opt_string(obj.get("desc"));
    step.guard = opt_expr(obj.get("if"));
    step.test = opt_expr(obj.get("test"));

    let retry = match (obj.get("retry"), obj.get("loop")) {
        (Some(_), Some(_)) => {
            return Err(LoadError::invalid(location, "use either retry or loop, not both"))
        }
        (Some(r), None) | (None, Some(r)) => Some(r),
        (None, None) => None,
    };
    if let Some(r) = retry {
        step.retry = Some(parse_retry(r).map_err(|m| LoadError::invalid(location, m))?);
    }

    match obj.get("bind") {
        None | Some(Value::Null) => {}
        Some(Value::Object(b)) => step.bind = Some(b.clone()),
        Some(_) => return Err(LoadError::invalid(location, "bind must be a mapping")),
    }

    let mut commands = obj
        .iter()
        .filter(|(k, _)| !STEP_KEYS.contains(&k.as_str()));
    if let Some((name, payload)) = commands.next() {
        if let Some((other, _)) = commands.next() {
            return Err(LoadError::invalid(
                location,
                format!("step declares more than one runner ('{name}' and '{other}')"),
            ));
        }
        step.command = Some(match name.as_str() {
            "include" => Command::Include(parse_include(payload).map_err(|m| LoadError::invalid(location, m))?),
            "exec" => Command::Exec(payload.clone()),
            _ => Command::Runner {
                name: name.clone(),
                payload: payload.clone(),
            },
        });
    }

    if step.command.is_none() && step.test.is_none() && step.bind.is_none() {
        return Err(LoadError::invalid(location, "step has no runner, test or bind"));
    }

    Ok(step)
}

fn parse_include(v: &Value) -> Result<IncludeConfig, String> {
    match v {
        Value::String(path) => Ok(IncludeConfig {
            path: path.clone(),
            ..IncludeConfig::default()
        }),
        Value::Object(o) => Ok(IncludeConfig {
            path: o
                .get("path")
                .and_then(Value::as_str)
                .ok_or("include needs a path")?
                .to_string(),
            vars: match o.get("vars") {
                None | Some(Value::Null) => Map::new(),
                Some(Value::Object(vars)) => vars.clone(),
                Some(_) => return Err("include vars must be a mapping".to_string()),
            },
            skip_test: flag(o.get("skipTest")),
            force: flag(o.get("force")),
        }),
        _ => Err("include must be a path or a mapping".to_string()),
    }
}

pub fn parse_retry(v: &Value) -> Result<RetrySpec, String> {
    match v {
        Value::Number(n) => Ok(RetrySpec {
            count: retry_count(n)?,
            ..RetrySpec::default()
        }),
        Value::Object(o) => Ok(RetrySpec {
            count: match o.get("count") {
                None | Some(Value::Null) => DEFAULT_RETRY_COUNT,
                Some(Value::Number(n)) => retry_count(n)?,
                Some(other) => return Err(format!("retry count must be a number, got {other}")),
            },
            interval: match o.get("interval") {
                None | Some(Value::Null) => Duration::ZERO,
                Some(i) => parse_duration(i)?,
            },
            until: opt_expr(o.get("until")),
        }),
        _ => Err("retry must be a count or a mapping".to_string()),
    }
}

fn retry_count(n: &serde_json::Number) -> Result<u32, String> {
    n.as_u64()
        .and_then(|c| u32::try_from(c).ok())
        .filter(|c| *c > 0)
        .ok_or_else(|| format!("retry count must be a positive integer, got {n}"))
}

/// Seconds as a number, or a humantime string such as `500ms` or `1m 30s`.
pub fn parse_duration(v: &Value) -> Result<Duration, String> {
    match v {
        Value::Number(n) => n
            .as_f64()
            .filter(|f| f.is_finite() && *f >= 0.0)
            .map(Duration::from_secs_f64)
            .ok_or_else(|| format!("invalid duration {n}")),
        Value::String(s) => match s.trim().parse::<f64>() {
            Ok(secs) if secs.is_finite() && secs >= 0.0 => Ok(Duration::from_secs_f64(secs)),
            _ => humantime::parse_duration(s.trim()).map_err(|e| format!("invalid duration '{s}': {e}")),
        },
        other => Err(format!("invalid duration {other}")),
    }
}

fn opt_string(v: Option<&Value>) -> Option<String> {
    v.and_then(Value::as_str).map(str::to_string)
}

/// Expressions may be written as YAML scalars (`if: true`, `test: 1`).
fn opt_expr(v: Option<&Value>) -> Option<String> {
    match v? {
        Value::Null => None,
        Value::String(s) => Some(s.clone()),
        other => Some(other.to_string()),
    }
}

fn flag(v: Option<&Value>) -> bool {
    v.and_then(Value::as_bool).unwrap_or(false)
}
