use crate::cli::OutputFormat;
use crate::error::{CliResult, IntoCliResult};
use crate::exit_codes::EXIT_SUCCESS;
use crate::runtime::Runtime;
use catalog_search::{ProductId, SearchQuery, SearchResult, SimilarityProfile};
use colored::*;
use is_terminal::IsTerminal;
use std::io;
use tabled::{
    settings::{object::Rows, Alignment, Color, Modify, Style},
    Table, Tabled,
};

const MAX_NAME_WIDTH: usize = 40;

/// Options of the `search` command
#[derive(Debug, Clone)]
pub struct SearchOptions {
    pub query: String,
    pub mode: String,
    pub limit: Option<usize>,
    pub offset: usize,
    pub category: Option<String>,
    pub min_similarity: Option<f32>,
    pub format: OutputFormat,
}

#[derive(Tabled)]
struct ProductRow {
    #[tabled(rename = "#")]
    rank: usize,
    #[tabled(rename = "ID")]
    id: String,
    #[tabled(rename = "Name")]
    name: String,
    #[tabled(rename = "Category")]
    category: String,
    #[tabled(rename = "Price")]
    price: String,
    #[tabled(rename = "Score")]
    score: String,
}

/// Build the query from command-line options and the configured defaults
pub fn build_query(runtime: &Runtime, options: &SearchOptions) -> SearchQuery {
    let mut query = runtime
        .config
        .query_for(SimilarityProfile::Search, options.query.clone())
        .with_offset(options.offset);
    if let Some(limit) = options.limit {
        query = query.with_limit(limit);
    }
    if let Some(min_similarity) = options.min_similarity {
        query = query.with_min_similarity(min_similarity);
    }
    if let Some(category) = &options.category {
        query = query.with_category(category.clone());
    }
    query
}

pub async fn run_search(runtime: &Runtime, options: SearchOptions) -> CliResult<i32> {
    runtime.warm().await?;
    let query = build_query(runtime, &options);
    let result = runtime.router.search(&query, &options.mode).await;
    display_result(&result, options.format)?;
    Ok(EXIT_SUCCESS)
}

pub async fn run_similar(
    runtime: &Runtime,
    product_id: &str,
    limit: usize,
    format: OutputFormat,
) -> CliResult<i32> {
    runtime.warm().await?;
    let result = runtime
        .router
        .similar_products(&ProductId::from(product_id), limit)
        .await;
    display_result(&result, format)?;
    Ok(EXIT_SUCCESS)
}

pub fn display_result(result: &SearchResult, format: OutputFormat) -> CliResult<()> {
    match format {
        OutputFormat::Json => {
            let json = serde_json::to_string_pretty(result).cli_general_error()?;
            println!("{json}");
        }
        OutputFormat::Table => display_table(result),
    }
    Ok(())
}

fn truncate(text: &str, width: usize) -> String {
    if text.chars().count() > width {
        let kept: String = text.chars().take(width.saturating_sub(3)).collect();
        format!("{kept}...")
    } else {
        text.to_string()
    }
}

fn display_table(result: &SearchResult) {
    if result.is_empty() {
        println!("No products found ({} search).", result.mode());
        return;
    }

    let is_tty = io::stdout().is_terminal();

    let rows: Vec<ProductRow> = result
        .products()
        .iter()
        .enumerate()
        .map(|(i, product)| ProductRow {
            rank: i + 1,
            id: product.id.to_string(),
            name: truncate(&product.name, MAX_NAME_WIDTH),
            category: product.category.clone().unwrap_or_default(),
            price: format!("{:.2} {}", product.price_cents as f64 / 100.0, product.currency),
            score: result
                .score_for(&product.id)
                .map(|s| format!("{s:.3}"))
                .unwrap_or_else(|| "-".to_string()),
        })
        .collect();

    let mut table = Table::new(rows);
    table.with(Style::modern());
    if is_tty {
        table.with(Modify::new(Rows::one(0)).with(Color::FG_BRIGHT_CYAN));
    }
    table.with(Modify::new(Rows::new(1..)).with(Alignment::left()));

    println!("{table}");

    let summary = format!(
        "{} of {} results via {} search in {:.1}ms",
        result.products().len(),
        result.total_results(),
        result.mode(),
        result.execution_time_ms()
    );
    if is_tty {
        println!("{}", summary.dimmed());
    } else {
        println!("{summary}");
    }
}
