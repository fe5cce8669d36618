use clap::Args;
use serde_json::Value;

use crate::output::OutputFormat;

#[derive(Debug, Args, Clone)]
pub struct OutputArgs {
    #[arg(long, value_enum, default_value_t = OutputFormat::Text, global = true)]
    pub format: OutputFormat,
    #[arg(long, short, global = true)]
    pub quiet: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum EventsTarget {
    None,
    /// JSON lines on stdout.
    Stdout,
    /// Lifecycle events through the log.
    Log,
}

#[derive(Debug, Args, Clone)]
pub struct RunArgs {
    /// Override a runbook var. The value is parsed as JSON when it can be.
    #[arg(long = "var", value_name = "KEY=VALUE", value_parser = parse_var)]
    pub vars: Vec<(String, Value)>,
    /// Keep running steps after a failure.
    #[arg(long)]
    pub force: bool,
    #[arg(long)]
    pub skip_test: bool,
    /// Do not run runbooks that another matched runbook includes.
    #[arg(long)]
    pub skip_included: bool,
    /// Dump HTTP exchanges and step results.
    #[arg(long)]
    pub debug: bool,
    /// Tag HTTP requests with a trace header.
    #[arg(long)]
    pub trace: bool,
    #[arg(long, value_enum, default_value_t = EventsTarget::None)]
    pub events: EventsTarget,
}

pub fn parse_var(s: &str) -> Result<(String, Value), String> {
    let (key, raw) = s
        .split_once('=')
        .ok_or_else(|| format!("expected KEY=VALUE, got '{s}'"))?;
    let key = key.trim();
    if key.is_empty() {
        return Err(format!("empty var name in '{s}'"));
    }
    let value = serde_json::from_str(raw).unwrap_or_else(|_| Value::String(raw.to_string()));
    Ok((key.to_string(), value))
}
