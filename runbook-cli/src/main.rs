use clap::Parser;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

mod args;
mod cmd;
mod commands;
mod exit_codes;
mod output;

pub use args::*;
use commands::Command;

const LOG_ENV: &str = "RUNBOOK_LOG";

#[derive(Debug, Parser)]
#[command(name = "runbook", version, about = "Run API and operations scenarios described as runbooks")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

fn main() {
    let cli = Cli::parse();
    init_logging(cli.command.debug());

    let rt = match tokio::runtime::Runtime::new() {
        Ok(rt) => rt,
        Err(e) => {
            eprintln!("error: failed to create tokio runtime: {e}");
            std::process::exit(exit_codes::RUNTIME_ERROR);
        }
    };

    let exit_code = rt.block_on(run_command(cli.command));
    std::process::exit(exit_code);
}

/// Logs go to stderr so `--format json` output stays parseable.
fn init_logging(debug: bool) {
    let filter = EnvFilter::try_from_env(LOG_ENV)
        .unwrap_or_else(|_| EnvFilter::new(if debug { "debug" } else { "warn" }));
    tracing_subscriber::registry()
        .with(fmt::layer().with_target(debug).with_writer(std::io::stderr))
        .with(filter)
        .init();
}

async fn run_command(command: Command) -> i32 {
    match command {
        Command::Run { paths, run, output } => cmd::run::run_cmd(&paths, run, output).await,
        Command::List { paths, output } => cmd::list::list_cmd(&paths, output),
    }
}
