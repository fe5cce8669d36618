use std::sync::Arc;

use async_trait::async_trait;
use runbook_core::types::GrpcRequest;
use serde_json::{json, Map, Value};

use super::RunnerOutput;
use crate::error::{RunError, RunnerError};

#[derive(Debug, Clone, PartialEq)]
pub struct GrpcResponse {
    /// gRPC status code; 0 is OK.
    pub status: i64,
    pub headers: Map<String, Value>,
    pub message: Value,
}

/// Unary gRPC transport. The engine ships no implementation; embedders
/// inject one per runner name.
#[async_trait]
pub trait GrpcClient: Send + Sync {
    async fn invoke(&self, req: &GrpcRequest) -> Result<GrpcResponse, String>;
}

pub struct GrpcRunner {
    name: String,
    addr: String,
    client: Arc<dyn GrpcClient>,
}

impl std::fmt::Debug for GrpcRunner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GrpcRunner")
            .field("name", &self.name)
            .field("addr", &self.addr)
            .finish_non_exhaustive()
    }
}

impl GrpcRunner {
    pub fn new(name: impl Into<String>, addr: impl Into<String>, client: Arc<dyn GrpcClient>) -> Self {
        Self {
            name: name.into(),
            addr: addr.into(),
            client,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub async fn run(&self, req: &GrpcRequest) -> Result<RunnerOutput, RunError> {
        tracing::debug!(
            target: "runbook::grpc",
            runner = %self.name,
            addr = %self.addr,
            method = %format!("{}/{}", req.service, req.method),
            "grpc call"
        );
        let res = self
            .client
            .invoke(req)
            .await
            .map_err(|e| RunnerError::Grpc(format!("{}/{}: {e}", req.service, req.method)))?;
        Ok(RunnerOutput {
            result: Some(json!({
                "status": res.status,
                "headers": res.headers,
                "message": res.message,
            })),
            ..RunnerOutput::default()
        })
    }
}
