use std::process;
mod cli;
mod config;
mod error;
mod exit_codes;
mod metrics;
mod runtime;
mod search;
mod sync;

use clap::CommandFactory;
use cli::{Cli, Commands};
use error::{handle_cli_result, CliResult};
use exit_codes::{EXIT_ERROR, EXIT_SUCCESS};
use runtime::Runtime;
use search::SearchOptions;
use tracing::Level;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() {
    let cli = Cli::parse_args();

    // Fast path for help
    let Some(command) = cli.command else {
        if let Err(e) = Cli::command().print_help() {
            eprintln!("Failed to print help: {e}");
            process::exit(EXIT_ERROR);
        }
        process::exit(EXIT_SUCCESS);
    };

    let log_level = if cli.quiet {
        Level::ERROR
    } else if cli.debug {
        Level::DEBUG
    } else if cli.verbose {
        Level::TRACE
    } else {
        Level::INFO
    };

    // RUST_LOG wins over the flags
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(log_level.as_str().to_lowercase()));
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(filter)
        .init();

    let exit_code = handle_cli_result(run(command, &cli.catalog, cli.config.as_deref()).await);
    process::exit(exit_code);
}

async fn run(
    command: Commands,
    catalog: &std::path::Path,
    config_path: Option<&std::path::Path>,
) -> CliResult<i32> {
    let config = runtime::load_config(config_path)?;

    match command {
        Commands::Index {
            dead_letters,
            format,
        } => {
            tracing::info!("Running index command");
            let runtime = Runtime::load(config, catalog, Some(&dead_letters))?;
            sync::run_index(&runtime, &dead_letters, format).await
        }
        Commands::Search {
            query,
            mode,
            limit,
            offset,
            category,
            min_similarity,
            format,
        } => {
            tracing::info!("Running search command");
            let runtime = Runtime::load(config, catalog, None)?;
            let options = SearchOptions {
                query,
                mode,
                limit,
                offset,
                category,
                min_similarity,
                format,
            };
            search::run_search(&runtime, options).await
        }
        Commands::Similar {
            product_id,
            limit,
            format,
        } => {
            tracing::info!("Running similar command");
            let runtime = Runtime::load(config, catalog, None)?;
            search::run_similar(&runtime, &product_id, limit, format).await
        }
        Commands::Jobs {
            dead_letters,
            status,
            format,
        } => {
            tracing::info!("Running jobs command");
            sync::run_jobs(&dead_letters, status, format).await
        }
        Commands::Sweep {
            dead_letters,
            at,
            format,
        } => {
            tracing::info!("Running sweep command");
            let runtime = Runtime::load(config, catalog, Some(&dead_letters))?;
            sync::run_sweep(&runtime, &dead_letters, at, format).await
        }
        Commands::Metrics {
            queries,
            mode,
            format,
        } => {
            tracing::info!("Running metrics command");
            let runtime = Runtime::load(config, catalog, None)?;
            metrics::run_metrics(&runtime, &queries, &mode, format).await
        }
        Commands::Config { example } => config::run_config(&config, example),
    }
}
