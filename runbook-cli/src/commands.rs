use clap::Subcommand;

use crate::args::*;

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Run runbooks one after another.
    Run {
        /// Runbook paths or glob patterns such as `books/**/*.yml`.
        #[arg(required = true, value_name = "PATTERN")]
        paths: Vec<String>,
        #[command(flatten)]
        run: RunArgs,
        #[command(flatten)]
        output: OutputArgs,
    },
    /// Print the steps of each runbook without running them.
    List {
        #[arg(required = true, value_name = "PATTERN")]
        paths: Vec<String>,
        #[command(flatten)]
        output: OutputArgs,
    },
}

impl Command {
    pub fn debug(&self) -> bool {
        matches!(self, Command::Run { run, .. } if run.debug)
    }
}
