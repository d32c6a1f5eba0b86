use crate::cli::OutputFormat;
use crate::error::{CliResult, IntoCliResult};
use crate::exit_codes::EXIT_SUCCESS;
use crate::runtime::Runtime;
use catalog_search::metrics::MetricsReport;
use catalog_search::SimilarityProfile;
use tabled::{settings::Style, Table, Tabled};

#[derive(Tabled)]
struct ModeRow {
    #[tabled(rename = "Mode")]
    mode: String,
    #[tabled(rename = "Searches")]
    searches: u64,
    #[tabled(rename = "Empty")]
    empty: String,
    #[tabled(rename = "p50 ms")]
    p50: String,
    #[tabled(rename = "p95 ms")]
    p95: String,
    #[tabled(rename = "p99 ms")]
    p99: String,
}

pub async fn run_metrics(
    runtime: &Runtime,
    queries: &[String],
    mode: &str,
    format: OutputFormat,
) -> CliResult<i32> {
    runtime.warm().await?;
    for text in queries {
        let query = runtime.config.query_for(SimilarityProfile::Search, text.clone());
        runtime.router.search(&query, mode).await;
    }

    let report = runtime.metrics.report().await.cli_general_error()?;
    match format {
        OutputFormat::Json => {
            let json = serde_json::to_string_pretty(&report).cli_general_error()?;
            println!("{json}");
        }
        OutputFormat::Table => display_report(&report),
    }
    Ok(EXIT_SUCCESS)
}

fn display_report(report: &MetricsReport) {
    let rows: Vec<ModeRow> = report
        .modes
        .iter()
        .map(|m| ModeRow {
            mode: m.mode.to_string(),
            searches: m.searches,
            empty: format!("{:.1}%", m.empty_result_rate * 100.0),
            p50: format!("{:.2}", m.response_times.p50),
            p95: format!("{:.2}", m.response_times.p95),
            p99: format!("{:.2}", m.response_times.p99),
        })
        .collect();

    let mut table = Table::new(rows);
    table.with(Style::modern());
    println!("{table}");
    println!(
        "Cache hit rate: {:.1}% ({} hits, {} misses)",
        report.cache_hit_rate * 100.0,
        report.cache_hits,
        report.cache_misses
    );
    // Fixed tokens-per-query assumption, not billed usage
    println!(
        "Embedding API calls: {} (estimated cost ${:.8})",
        report.api_calls, report.estimated_cost_usd
    );
}
