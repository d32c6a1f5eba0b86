use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

/// Default location of the product catalog
pub const DEFAULT_CATALOG: &str = "catalog.json";

/// Default location of the dead-letter file written by `index` and read by `sweep`
pub const DEFAULT_DEAD_LETTERS: &str = ".catalog-search/dead_letters.json";

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
pub enum OutputFormat {
    Table,
    Json,
}

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
pub enum JobStatusArg {
    Failed,
    Retrying,
    Resolved,
    Abandoned,
}

impl From<JobStatusArg> for catalog_search::sync::JobStatus {
    fn from(status: JobStatusArg) -> Self {
        use catalog_search::sync::JobStatus;
        match status {
            JobStatusArg::Failed => JobStatus::Failed,
            JobStatusArg::Retrying => JobStatus::Retrying,
            JobStatusArg::Resolved => JobStatus::Resolved,
            JobStatusArg::Abandoned => JobStatus::Abandoned,
        }
    }
}

#[derive(Parser, Debug)]
#[command(name = "catalog-search")]
#[command(version)]
#[command(about = "Semantic product search with keyword fallback and embedding sync")]
#[command(long_about = "
catalog-search indexes a JSON product catalog into an in-process vector store
and answers semantic or keyword queries against it. Embeddings come from an
OpenAI-compatible API when CATALOG_SEARCH_EMBEDDING_API_KEY is set, and from a
deterministic local model otherwise.

Example usage:
  catalog-search --catalog products.json index
  catalog-search --catalog products.json search \"gaming laptop\" --limit 5
  catalog-search --catalog products.json similar sku-123
")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,

    /// Product catalog (JSON array of products)
    #[arg(long, global = true, default_value = DEFAULT_CATALOG)]
    pub catalog: PathBuf,

    /// Configuration file, instead of searching for catalog-search.yaml
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long)]
    pub verbose: bool,

    /// Enable debug logging
    #[arg(short, long)]
    pub debug: bool,

    /// Suppress all output except errors
    #[arg(short, long)]
    pub quiet: bool,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Index every catalog product into the vector store
    #[command(long_about = "
Builds embeddings for every product in the catalog. Products that fail to sync
are recorded in the dead-letter file with their first retry time.

Exit codes:
  0 - Every product indexed
  1 - Some products failed and were dead-lettered
")]
    Index {
        /// Dead-letter file to append failed jobs to
        #[arg(long, default_value = DEFAULT_DEAD_LETTERS)]
        dead_letters: PathBuf,

        /// Output format
        #[arg(long, value_enum, default_value = "table")]
        format: OutputFormat,
    },
    /// Search the catalog
    #[command(long_about = "
Runs a search against the indexed catalog. Semantic mode falls back to keyword
search when embeddings or the vector store are unavailable; an unknown mode is
treated as semantic.

Examples:
  catalog-search search \"wireless mouse\"
  catalog-search search laptop --mode keyword --category Laptops
  catalog-search search \"standing desk\" --limit 3 --offset 3 --format json
")]
    Search {
        /// Query text
        query: String,

        /// Search mode: semantic or keyword
        #[arg(long, default_value = "semantic")]
        mode: String,

        /// Maximum number of results (capped at 50)
        #[arg(long)]
        limit: Option<usize>,

        /// Results to skip
        #[arg(long, default_value = "0")]
        offset: usize,

        /// Only return products in this category
        #[arg(long)]
        category: Option<String>,

        /// Minimum similarity score for semantic hits
        #[arg(long)]
        min_similarity: Option<f32>,

        /// Output format
        #[arg(long, value_enum, default_value = "table")]
        format: OutputFormat,
    },
    /// Recommend products similar to a given one
    Similar {
        /// Product identifier
        product_id: String,

        /// Maximum number of recommendations
        #[arg(long, default_value = "5")]
        limit: usize,

        /// Output format
        #[arg(long, value_enum, default_value = "table")]
        format: OutputFormat,
    },
    /// List dead-letter jobs
    Jobs {
        /// Dead-letter file
        #[arg(long, default_value = DEFAULT_DEAD_LETTERS)]
        dead_letters: PathBuf,

        /// Only list jobs in this status
        #[arg(long, value_enum)]
        status: Option<JobStatusArg>,

        /// Output format
        #[arg(long, value_enum, default_value = "table")]
        format: OutputFormat,
    },
    /// Replay dead-letter jobs whose retry time has come
    #[command(long_about = "
Indexes the catalog, then replays every dead-letter job that is due. Resolved
jobs are marked as such; jobs that fail again move along the backoff table
(60s, 5m, 30m, 2h) and are abandoned after their fifth attempt.

Examples:
  catalog-search sweep
  catalog-search sweep --at 2030-01-01T00:00:00Z
")]
    Sweep {
        /// Dead-letter file
        #[arg(long, default_value = DEFAULT_DEAD_LETTERS)]
        dead_letters: PathBuf,

        /// Treat this instant as now (RFC 3339)
        #[arg(long)]
        at: Option<DateTime<Utc>>,

        /// Output format
        #[arg(long, value_enum, default_value = "table")]
        format: OutputFormat,
    },
    /// Run queries and report search metrics
    Metrics {
        /// Queries to run before reporting
        queries: Vec<String>,

        /// Search mode for the queries
        #[arg(long, default_value = "semantic")]
        mode: String,

        /// Output format
        #[arg(long, value_enum, default_value = "table")]
        format: OutputFormat,
    },
    /// Show the resolved configuration
    Config {
        /// Print an annotated example configuration file instead
        #[arg(long)]
        example: bool,
    },
}

impl Cli {
    pub fn parse_args() -> Self {
        Self::parse()
    }

    #[cfg(test)]
    pub fn try_parse_from_args<I, T>(args: I) -> Result<Self, clap::Error>
    where
        I: IntoIterator<Item = T>,
        T: Into<std::ffi::OsString> + Clone,
    {
        <Self as Parser>::try_parse_from(args)
    }
}
