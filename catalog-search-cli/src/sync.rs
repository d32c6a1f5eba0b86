use crate::cli::{JobStatusArg, OutputFormat};
use crate::error::{CliResult, IntoCliResult};
use crate::exit_codes::{EXIT_SUCCESS, EXIT_WARNING};
use crate::runtime::Runtime;
use catalog_search::sync::{
    DeadLetterRegistry, FailedSyncJob, InMemoryDeadLetterRegistry, RetrySweeper,
};
use chrono::{DateTime, Utc};
use colored::*;
use is_terminal::IsTerminal;
use std::io;
use std::path::Path;
use tabled::{
    settings::{object::Rows, Alignment, Color, Modify, Style},
    Table, Tabled,
};

#[derive(Tabled)]
struct JobRow {
    #[tabled(rename = "Job")]
    id: String,
    #[tabled(rename = "Product")]
    product: String,
    #[tabled(rename = "Operation")]
    operation: String,
    #[tabled(rename = "Status")]
    status: String,
    #[tabled(rename = "Attempts")]
    attempts: u32,
    #[tabled(rename = "Retry After")]
    retry_after: String,
    #[tabled(rename = "Error")]
    error: String,
}

fn print_json<T: serde::Serialize>(value: &T) -> CliResult<()> {
    let json = serde_json::to_string_pretty(value).cli_general_error()?;
    println!("{json}");
    Ok(())
}

pub async fn run_index(
    runtime: &Runtime,
    dead_letters: &Path,
    format: OutputFormat,
) -> CliResult<i32> {
    let report = runtime.index().await?;
    if report.failed > 0 {
        runtime.save_dead_letters(dead_letters)?;
    }

    match format {
        OutputFormat::Json => print_json(&report)?,
        OutputFormat::Table => {
            println!(
                "{} {} products indexed",
                "✓".green(),
                report.synced.to_string().bold()
            );
            if report.failed > 0 {
                println!(
                    "{} {} products failed, jobs written to {}",
                    "✗".red(),
                    report.failed.to_string().bold(),
                    dead_letters.display()
                );
            }
        }
    }

    Ok(if report.failed > 0 {
        EXIT_WARNING
    } else {
        EXIT_SUCCESS
    })
}

pub async fn run_jobs(
    dead_letters: &Path,
    status: Option<JobStatusArg>,
    format: OutputFormat,
) -> CliResult<i32> {
    let registry = InMemoryDeadLetterRegistry::load_json(dead_letters).cli_validation_error()?;
    let jobs = match status {
        Some(status) => registry
            .list_by_status(status.into())
            .await
            .cli_general_error()?,
        None => registry.snapshot(),
    };

    match format {
        OutputFormat::Json => print_json(&jobs)?,
        OutputFormat::Table => display_jobs(&jobs),
    }
    Ok(EXIT_SUCCESS)
}

pub async fn run_sweep(
    runtime: &Runtime,
    dead_letters: &Path,
    at: Option<DateTime<Utc>>,
    format: OutputFormat,
) -> CliResult<i32> {
    runtime.warm().await?;

    let sweeper = RetrySweeper::new(
        runtime.orchestrator.clone(),
        runtime.dead_letters.clone(),
        runtime.config.sweep_batch_size,
    );
    let report = sweeper
        .run_once(at.unwrap_or_else(Utc::now))
        .await
        .cli_general_error()?;
    runtime.save_dead_letters(dead_letters)?;

    match format {
        OutputFormat::Json => print_json(&report)?,
        OutputFormat::Table => {
            println!(
                "Examined {}: {} resolved, {} rescheduled, {} abandoned, {} deferred",
                report.examined,
                report.resolved.to_string().green(),
                report.rescheduled.to_string().yellow(),
                report.abandoned.to_string().red(),
                report.deferred.to_string().yellow()
            );
        }
    }

    Ok(if report.rescheduled + report.abandoned + report.deferred > 0 {
        EXIT_WARNING
    } else {
        EXIT_SUCCESS
    })
}

fn display_jobs(jobs: &[FailedSyncJob]) {
    if jobs.is_empty() {
        println!("No dead-letter jobs.");
        return;
    }

    let rows: Vec<JobRow> = jobs
        .iter()
        .map(|job| JobRow {
            id: job.id.to_string(),
            product: job.product_id.to_string(),
            operation: job.operation.to_string(),
            status: job.status.to_string(),
            attempts: job.attempts,
            retry_after: job
                .retry_after
                .map(|at| at.format("%Y-%m-%d %H:%M:%S").to_string())
                .unwrap_or_else(|| "-".to_string()),
            error: job.error_message.clone(),
        })
        .collect();

    let mut table = Table::new(rows);
    table.with(Style::modern());
    if io::stdout().is_terminal() {
        table.with(Modify::new(Rows::one(0)).with(Color::FG_BRIGHT_CYAN));
    }
    table.with(Modify::new(Rows::new(1..)).with(Alignment::left()));
    println!("{table}");
}
