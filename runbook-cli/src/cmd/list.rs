use runbook_core::{load_runbooks, Runbook};
use serde::Serialize;

use crate::exit_codes;
use crate::output::{print_error, print_result, OutputFormat};
use crate::OutputArgs;

#[derive(Serialize)]
struct StepSummary {
    label: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    runner: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    desc: Option<String>,
}

#[derive(Serialize)]
struct BookSummary {
    path: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    desc: Option<String>,
    runners: Vec<String>,
    steps: Vec<StepSummary>,
}

impl BookSummary {
    fn new(book: &Runbook) -> Self {
        Self {
            path: book.display_name(),
            desc: book.desc.clone(),
            runners: book.runners.keys().cloned().collect(),
            steps: book
                .steps
                .iter()
                .map(|s| StepSummary {
                    label: s.label(),
                    runner: s.runner_name().map(str::to_string),
                    desc: s.desc.clone(),
                })
                .collect(),
        }
    }
}

pub fn list_cmd(patterns: &[String], output: OutputArgs) -> i32 {
    let summaries: Vec<BookSummary> = match load_runbooks(patterns, false) {
        Ok(books) => books.iter().map(BookSummary::new).collect(),
        Err(e) => {
            print_error(output.format, output.quiet, &e.to_string());
            return exit_codes::VALIDATION_FAILED;
        }
    };

    if output.format == OutputFormat::Text && !output.quiet {
        for book in &summaries {
            match &book.desc {
                Some(desc) => println!("{}: {desc}", book.path),
                None => println!("{}", book.path),
            }
            for step in &book.steps {
                let runner = step.runner.as_deref().unwrap_or("-");
                match &step.desc {
                    Some(desc) => println!("  {:<12} {:<10} {desc}", step.label, runner),
                    None => println!("  {:<12} {runner}", step.label),
                }
            }
        }
    } else {
        print_result(output.format, output.quiet, &summaries);
    }
    exit_codes::SUCCESS
}
