#![forbid(unsafe_code)]

pub mod cancel;
pub mod error;
pub mod events;
pub mod expand;
pub mod openapi;
pub mod operator;
pub mod retry;
pub mod runner;
pub mod store;

pub use crate::cancel::Cancellation;
pub use crate::error::{ConfigError, ErrorKind, RunError, RunnerError};
pub use crate::events::{
    CompositeEventSink, Event, EventSink, NoOpEventSink, StdoutEventSink, TracingEventSink,
};
pub use crate::openapi::{HttpValidator, NopValidator, OpenApi3Validator, ValidationError};
pub use crate::operator::{
    HookFn, Operator, OperatorBuilder, OperatorOptions, RunResult, StepResult, StepStatus,
};
pub use crate::runner::{Runner, RunnerOutput};
pub use crate::store::{KvStore, RootKey, Store};
