use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use serde_json::{Map, Value};

/// Kinds of runner a runbook can declare under `runners:`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RunnerKind {
    Http,
    Db,
    Grpc,
    Ssh,
    Include,
}

impl fmt::Display for RunnerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            RunnerKind::Http => "http",
            RunnerKind::Db => "db",
            RunnerKind::Grpc => "grpc",
            RunnerKind::Ssh => "ssh",
            RunnerKind::Include => "include",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum RunnerSpec {
    Http(HttpRunnerSpec),
    Db(DbRunnerSpec),
    Grpc(GrpcRunnerSpec),
    Ssh(SshRunnerSpec),
    Include(IncludeRunnerSpec),
}

impl RunnerSpec {
    pub fn kind(&self) -> RunnerKind {
        match self {
            RunnerSpec::Http(_) => RunnerKind::Http,
            RunnerSpec::Db(_) => RunnerKind::Db,
            RunnerSpec::Grpc(_) => RunnerKind::Grpc,
            RunnerSpec::Ssh(_) => RunnerKind::Ssh,
            RunnerSpec::Include(_) => RunnerKind::Include,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct HttpRunnerSpec {
    pub endpoint: String,
    pub openapi3: Option<String>,
    pub skip_validate_request: bool,
    pub skip_validate_response: bool,
    pub not_follow_redirect: bool,
    pub cacert: Option<PathBuf>,
    pub cert: Option<PathBuf>,
    pub key: Option<PathBuf>,
    pub skip_verify: bool,
    pub timeout: Option<Duration>,
}

impl HttpRunnerSpec {
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            ..Self::default()
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DbRunnerSpec {
    pub dsn: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GrpcRunnerSpec {
    pub addr: String,
    pub tls: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SshRunnerSpec {
    pub host: String,
    pub user: Option<String>,
    pub port: Option<u16>,
    pub key: Option<PathBuf>,
}

impl SshRunnerSpec {
    /// `user@host` as handed to the ssh binary.
    pub fn destination(&self) -> String {
        match &self.user {
            Some(user) => format!("{user}@{}", self.host),
            None => self.host.clone(),
        }
    }
}

/// A named include runner: a child runbook plus the parameters it is called with.
#[derive(Debug, Clone, PartialEq)]
pub struct IncludeRunnerSpec {
    pub path: String,
    pub params: Map<String, Value>,
}
