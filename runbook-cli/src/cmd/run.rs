use std::sync::Arc;

use runbook_core::load_runbooks;
use runbook_exec::{
    Cancellation, EventSink, NoOpEventSink, Operator, RunResult, StdoutEventSink, StepStatus,
    TracingEventSink,
};
use serde_json::Map;

use crate::args::EventsTarget;
use crate::exit_codes;
use crate::output::{print_error, print_result, OutputFormat};
use crate::{OutputArgs, RunArgs};

pub async fn run_cmd(patterns: &[String], run: RunArgs, output: OutputArgs) -> i32 {
    let books = match load_runbooks(patterns, run.skip_included) {
        Ok(books) => books,
        Err(e) => {
            print_error(output.format, output.quiet, &e.to_string());
            return exit_codes::VALIDATION_FAILED;
        }
    };

    let events: Arc<dyn EventSink> = match run.events {
        EventsTarget::None => Arc::new(NoOpEventSink),
        EventsTarget::Stdout => Arc::new(StdoutEventSink),
        EventsTarget::Log => Arc::new(TracingEventSink),
    };
    let vars: Map<String, serde_json::Value> = run.vars.iter().cloned().collect();

    let cancel = Cancellation::new();
    let on_signal = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("interrupted, cancelling run");
            on_signal.cancel();
        }
    });

    let total = books.len();
    let mut results: Vec<RunResult> = Vec::with_capacity(total);
    for book in books {
        let name = book.display_name();
        let mut op = match Operator::builder(book)
            .vars(vars.clone())
            .force(run.force)
            .skip_test(run.skip_test)
            .debug(run.debug)
            .trace(run.trace)
            .events(Arc::clone(&events))
            .cancellation(cancel.clone())
            .build()
            .await
        {
            Ok(op) => op,
            Err(e) => {
                print_error(output.format, output.quiet, &format!("{name}: {e}"));
                return exit_codes::VALIDATION_FAILED;
            }
        };

        let result = op.run().await;
        if output.format == OutputFormat::Text && !output.quiet {
            print_text(&name, &result);
        }
        results.push(result);
        if cancel.is_cancelled() {
            break;
        }
    }

    if output.format == OutputFormat::Json {
        print_result(output.format, output.quiet, &results);
    }

    let failed = results.iter().filter(|r| !r.succeeded).count();
    if output.format == OutputFormat::Text && !output.quiet && results.len() > 1 {
        println!();
        println!("{} runbooks, {} failed", results.len(), failed);
    }
    if failed > 0 || results.len() < total {
        exit_codes::RUN_FAILED
    } else {
        exit_codes::SUCCESS
    }
}

fn print_text(name: &str, result: &RunResult) {
    let mark = match (result.skipped, result.succeeded) {
        (true, _) => "skip",
        (false, true) => "ok",
        (false, false) => "FAIL",
    };
    println!(
        "{mark:<4} {name} ({} succeeded, {} failed, {} skipped)",
        result.count(StepStatus::Succeeded),
        result.count(StepStatus::Failed),
        result.count(StepStatus::Skipped),
    );
    for step in &result.steps {
        if let Some(err) = &step.error {
            println!("     {err}");
        }
    }
    for err in result.errors.iter().filter(|e| {
        !result
            .steps
            .iter()
            .any(|s| s.error.as_ref().is_some_and(|se| Arc::ptr_eq(se, e)))
    }) {
        println!("     {err}");
    }
    for warning in &result.warnings {
        println!("     warning: {warning}");
    }
}
