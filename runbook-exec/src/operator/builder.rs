use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use runbook_core::types::HttpRunnerSpec;
use runbook_core::{Command, FuncRegistry, Runbook, RunnerKind, RunnerSpec};
use serde_json::{Map, Value};
use uuid::Uuid;

use super::{HookFn, Operator, OperatorOptions};
use crate::cancel::Cancellation;
use crate::error::ConfigError;
use crate::events::{EventSink, NoOpEventSink};
use crate::expand::evaluate_schema;
use crate::openapi::OpenApi3Validator;
use crate::runner::http::{HttpClient, HttpClientOptions, HttpRunner, ReqwestHttpClient};
use crate::runner::{DbClient, DbRunner, GrpcClient, GrpcRunner, IncludeRunner, Runner, SqlxDbClient, SshRunner};
use crate::store::{KvStore, Store};

/// Names a step key can never refer to as a runner.
pub const RESERVED_RUNNER_NAMES: &[&str] = &["exec", "include", "bind", "test", "if", "desc", "retry", "loop"];

const SUPPORTED_DB_SCHEMES: &[&str] = &["sqlite", "postgres", "postgresql"];

pub struct OperatorBuilder {
    book: Runbook,
    injected: BTreeMap<String, Runner>,
    reused: BTreeMap<String, Runner>,
    http_clients: BTreeMap<String, Arc<dyn HttpClient>>,
    db_clients: BTreeMap<String, Arc<dyn DbClient>>,
    grpc_clients: BTreeMap<String, Arc<dyn GrpcClient>>,
    vars: Map<String, Value>,
    funcs: FuncRegistry,
    kv: KvStore,
    opts: OperatorOptions,
    before: Vec<HookFn>,
    after: Vec<HookFn>,
    events: Arc<dyn EventSink>,
    cancel: Cancellation,
    multipart_boundary: Option<String>,
    parent: Option<Value>,
}

impl OperatorBuilder {
    pub fn new(book: Runbook) -> Self {
        Self {
            book,
            injected: BTreeMap::new(),
            reused: BTreeMap::new(),
            http_clients: BTreeMap::new(),
            db_clients: BTreeMap::new(),
            grpc_clients: BTreeMap::new(),
            vars: Map::new(),
            funcs: FuncRegistry::default(),
            kv: KvStore::new(),
            opts: OperatorOptions::default(),
            before: Vec::new(),
            after: Vec::new(),
            events: Arc::new(NoOpEventSink),
            cancel: Cancellation::new(),
            multipart_boundary: None,
            parent: None,
        }
    }

    /// Register a ready-made runner. It replaces a same-kind runner the book declares.
    pub fn http_runner(mut self, runner: HttpRunner) -> Self {
        self.injected
            .insert(runner.name().to_string(), Runner::Http(Arc::new(runner)));
        self
    }

    pub fn db_runner(mut self, runner: DbRunner) -> Self {
        self.injected
            .insert(runner.name().to_string(), Runner::Db(Arc::new(runner)));
        self
    }

    pub fn grpc_runner(mut self, runner: GrpcRunner) -> Self {
        self.injected
            .insert(runner.name().to_string(), Runner::Grpc(Arc::new(runner)));
        self
    }

    /// Transport for the book's http runner `name`; endpoint and validation
    /// still come from the book.
    pub fn http_client(mut self, name: impl Into<String>, client: Arc<dyn HttpClient>) -> Self {
        self.http_clients.insert(name.into(), client);
        self
    }

    pub fn db_client(mut self, name: impl Into<String>, client: Arc<dyn DbClient>) -> Self {
        self.db_clients.insert(name.into(), client);
        self
    }

    pub fn grpc_client(mut self, name: impl Into<String>, client: Arc<dyn GrpcClient>) -> Self {
        self.grpc_clients.insert(name.into(), client);
        self
    }

    /// Runners inherited from an including operator. The book's own runners win.
    pub fn reuse_runners(mut self, runners: BTreeMap<String, Runner>) -> Self {
        self.reused = runners;
        self
    }

    /// Override a variable after the book's vars are evaluated.
    pub fn var(mut self, name: impl Into<String>, value: Value) -> Self {
        self.vars.insert(name.into(), value);
        self
    }

    pub fn vars(mut self, vars: Map<String, Value>) -> Self {
        self.vars.extend(vars);
        self
    }

    pub fn funcs(mut self, funcs: FuncRegistry) -> Self {
        self.funcs = funcs;
        self
    }

    pub fn kv(mut self, kv: KvStore) -> Self {
        self.kv = kv;
        self
    }

    pub fn debug(mut self, on: bool) -> Self {
        self.opts.debug = on;
        self
    }

    pub fn trace(mut self, on: bool) -> Self {
        self.opts.trace = on;
        self
    }

    pub fn force(mut self, on: bool) -> Self {
        self.opts.force = on;
        self
    }

    pub fn skip_test(mut self, on: bool) -> Self {
        self.opts.skip_test = on;
        self
    }

    pub(crate) fn included(mut self, on: bool) -> Self {
        self.opts.included = on;
        self
    }

    pub fn before(mut self, hook: HookFn) -> Self {
        self.before.push(hook);
        self
    }

    pub fn after(mut self, hook: HookFn) -> Self {
        self.after.push(hook);
        self
    }

    pub fn events(mut self, sink: Arc<dyn EventSink>) -> Self {
        self.events = sink;
        self
    }

    pub fn cancellation(mut self, cancel: Cancellation) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn multipart_boundary(mut self, boundary: impl Into<String>) -> Self {
        self.multipart_boundary = Some(boundary.into());
        self
    }

    pub(crate) fn parent(mut self, snapshot: Value) -> Self {
        self.parent = Some(snapshot);
        self
    }

    pub async fn build(self) -> Result<Operator, ConfigError> {
        let Self {
            book,
            injected,
            reused,
            http_clients,
            db_clients,
            grpc_clients,
            vars,
            funcs,
            kv,
            mut opts,
            before,
            after,
            events,
            cancel,
            multipart_boundary,
            parent,
        } = self;

        for name in book.runners.keys().chain(injected.keys()) {
            if RESERVED_RUNNER_NAMES.contains(&name.as_str()) {
                return Err(ConfigError::ReservedRunnerName(name.clone()));
            }
        }
        check_injected_kinds(&book, &injected, &http_clients, &db_clients, &grpc_clients)?;

        let mut runners = reused;
        for (name, spec) in &book.runners {
            if injected.contains_key(name) {
                continue;
            }
            let runner = match spec {
                RunnerSpec::Http(s) => Runner::Http(Arc::new(
                    build_http(
                        name,
                        s,
                        &book.root,
                        http_clients.get(name).cloned(),
                        multipart_boundary.as_deref(),
                    )
                    .await?,
                )),
                RunnerSpec::Db(s) => {
                    let client = match db_clients.get(name) {
                        Some(c) => Arc::clone(c),
                        None => {
                            let scheme = s.dsn.split(':').next().unwrap_or_default();
                            if !SUPPORTED_DB_SCHEMES.contains(&scheme) {
                                return Err(ConfigError::UnsupportedScheme {
                                    name: name.clone(),
                                    dsn: s.dsn.clone(),
                                });
                            }
                            let client = SqlxDbClient::connect_lazy(&s.dsn).map_err(|message| {
                                ConfigError::Client {
                                    name: name.clone(),
                                    message,
                                }
                            })?;
                            Arc::new(client) as Arc<dyn DbClient>
                        }
                    };
                    Runner::Db(Arc::new(DbRunner::new(name.clone(), client)))
                }
                RunnerSpec::Grpc(s) => {
                    let client = grpc_clients
                        .get(name)
                        .cloned()
                        .ok_or_else(|| ConfigError::MissingGrpcClient(name.clone()))?;
                    Runner::Grpc(Arc::new(GrpcRunner::new(name.clone(), s.addr.clone(), client)))
                }
                RunnerSpec::Ssh(s) => Runner::Ssh(Arc::new(SshRunner::new(name.clone(), s.clone()))),
                RunnerSpec::Include(s) => {
                    Runner::Include(Arc::new(IncludeRunner::new(name.clone(), s.clone())))
                }
            };
            runners.insert(name.clone(), runner);
        }
        runners.extend(injected);

        for step in &book.steps {
            if let Some(Command::Runner { name, .. }) = &step.command {
                if !runners.contains_key(name) {
                    return Err(ConfigError::UnknownRunner {
                        step: step.label(),
                        name: name.clone(),
                    });
                }
            }
        }

        let mut store = Store::new(Map::new(), book.use_map, kv, funcs.clone());
        let env = store.env();
        for (name, value) in &book.vars {
            let value = evaluate_schema(value.clone(), &book.root, &env, &funcs).map_err(|e| {
                ConfigError::InvalidVar {
                    name: name.clone(),
                    message: e.to_string(),
                }
            })?;
            store.set_var(name.clone(), value);
        }
        for (name, value) in vars {
            store.set_var(name, value);
        }
        if let Some(parent) = parent {
            store.set_parent(parent);
        }
        store.set_included(opts.included);

        opts.debug |= book.debug;
        opts.force |= book.force;
        opts.skip_test |= book.skip_test;

        Ok(Operator {
            id: Uuid::new_v4(),
            book: Arc::new(book),
            store,
            runners,
            inline_include: Runner::Include(Arc::new(IncludeRunner::inline())),
            opts,
            before,
            after,
            events,
            cancel,
        })
    }
}

fn check_injected_kinds(
    book: &Runbook,
    injected: &BTreeMap<String, Runner>,
    http_clients: &BTreeMap<String, Arc<dyn HttpClient>>,
    db_clients: &BTreeMap<String, Arc<dyn DbClient>>,
    grpc_clients: &BTreeMap<String, Arc<dyn GrpcClient>>,
) -> Result<(), ConfigError> {
    let injected_kinds = injected
        .iter()
        .filter_map(|(name, r)| r.kind().map(|k| (name, k)))
        .chain(http_clients.keys().map(|n| (n, RunnerKind::Http)))
        .chain(db_clients.keys().map(|n| (n, RunnerKind::Db)))
        .chain(grpc_clients.keys().map(|n| (n, RunnerKind::Grpc)));
    for (name, new) in injected_kinds {
        if let Some(spec) = book.runners.get(name) {
            if spec.kind() != new {
                return Err(ConfigError::DuplicateRunner {
                    name: name.clone(),
                    existing: spec.kind(),
                    new,
                });
            }
        }
    }
    Ok(())
}

async fn build_http(
    name: &str,
    spec: &HttpRunnerSpec,
    root: &Path,
    client: Option<Arc<dyn HttpClient>>,
    boundary: Option<&str>,
) -> Result<HttpRunner, ConfigError> {
    let endpoint = url::Url::parse(&spec.endpoint).map_err(|e| ConfigError::InvalidEndpoint {
        name: name.to_string(),
        message: format!("{}: {e}", spec.endpoint),
    })?;

    let has_tls = spec.cacert.is_some() || spec.cert.is_some() || spec.key.is_some() || spec.skip_verify;
    let client = match client {
        Some(_) if has_tls => {
            return Err(ConfigError::Tls {
                name: name.to_string(),
                message: "tls settings cannot be applied to an injected client".to_string(),
            })
        }
        Some(c) => c,
        None => {
            let read = |p: &Option<PathBuf>| -> Result<Option<Vec<u8>>, ConfigError> {
                p.as_ref()
                    .map(|p| {
                        std::fs::read(root.join(p)).map_err(|e| ConfigError::Tls {
                            name: name.to_string(),
                            message: format!("{}: {e}", p.display()),
                        })
                    })
                    .transpose()
            };
            let opts = HttpClientOptions {
                timeout: spec.timeout,
                follow_redirects: !spec.not_follow_redirect,
                cacert: read(&spec.cacert)?,
                cert: read(&spec.cert)?,
                key: read(&spec.key)?,
                skip_verify: spec.skip_verify,
            };
            let client = ReqwestHttpClient::new(&opts).map_err(|message| ConfigError::Tls {
                name: name.to_string(),
                message,
            })?;
            Arc::new(client) as Arc<dyn HttpClient>
        }
    };

    let mut runner = HttpRunner::new(name, endpoint, client);
    if let Some(location) = &spec.openapi3 {
        let validator = OpenApi3Validator::from_location(
            &reqwest::Client::new(),
            location,
            root,
            spec.skip_validate_request,
            spec.skip_validate_response,
        )
        .await
        .map_err(|message| ConfigError::OpenApi {
            name: name.to_string(),
            message,
        })?;
        runner = runner.with_validator(Arc::new(validator));
    }
    if let Some(boundary) = boundary {
        runner = runner.with_multipart_boundary(boundary);
    }
    tracing::debug!(target: "runbook::operator", runner = %name, endpoint = %spec.endpoint, "http runner ready");
    Ok(runner)
}
