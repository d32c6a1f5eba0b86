//! Error handling for the catalog search CLI
//!
//! Keeps the error context for display while carrying the exit code the process should
//! end with.

use crate::exit_codes::{EXIT_ERROR, EXIT_WARNING};
use std::error::Error;
use std::fmt;

/// CLI-specific result type that preserves error information
pub type CliResult<T> = Result<T, CliError>;

/// CLI error type with the suggested exit code
#[derive(Debug)]
pub struct CliError {
    pub message: String,
    pub exit_code: i32,
    pub source: Option<Box<dyn Error + Send + Sync>>,
}

impl CliError {
    /// Create a CLI error from another error with a specific exit code
    pub fn from_error<E: Error + Send + Sync + 'static>(error: E, exit_code: i32) -> Self {
        Self {
            message: error.to_string(),
            exit_code,
            source: Some(Box::new(error)),
        }
    }

    /// Get the full error chain as a formatted string
    pub fn full_chain(&self) -> String {
        let mut result = self.message.clone();

        let mut current_source = self.source();
        while let Some(err) = current_source {
            let text = err.to_string();
            if text != self.message {
                result.push_str(&format!("\n  Caused by: {text}"));
            }
            current_source = err.source();
        }

        result
    }
}

impl fmt::Display for CliError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl Error for CliError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        self.source
            .as_ref()
            .map(|e| e.as_ref() as &(dyn Error + 'static))
    }
}

impl From<anyhow::Error> for CliError {
    fn from(error: anyhow::Error) -> Self {
        Self {
            message: format!("{error:#}"),
            exit_code: EXIT_ERROR,
            source: None,
        }
    }
}

/// Extension trait for converting results to CLI results
pub trait IntoCliResult<T> {
    fn cli_error(self, exit_code: i32) -> CliResult<T>;
    fn cli_general_error(self) -> CliResult<T>;
    fn cli_validation_error(self) -> CliResult<T>;
}

impl<T, E: Error + Send + Sync + 'static> IntoCliResult<T> for Result<T, E> {
    fn cli_error(self, exit_code: i32) -> CliResult<T> {
        self.map_err(|e| CliError::from_error(e, exit_code))
    }

    fn cli_general_error(self) -> CliResult<T> {
        self.cli_error(EXIT_WARNING)
    }

    fn cli_validation_error(self) -> CliResult<T> {
        self.cli_error(EXIT_ERROR)
    }
}

/// Convert a command result to an exit code, printing the full error chain if needed
pub fn handle_cli_result(result: CliResult<i32>) -> i32 {
    match result {
        Ok(code) => code,
        Err(e) => {
            eprintln!("Error: {}", e.full_chain());
            e.exit_code
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use catalog_search::SearchError;

    #[test]
    fn test_full_chain_includes_causes() {
        let error = CliError::from_error(
            SearchError::unavailable(SearchError::VectorStore("down".to_string())),
            EXIT_ERROR,
        );
        let chain = error.full_chain();
        assert!(chain.starts_with("Semantic search unavailable"));
        assert!(chain.contains("Caused by: Vector store error: down"));
    }

    #[test]
    fn test_validation_errors_exit_with_error_code() {
        let result: Result<(), SearchError> = Err(SearchError::Validation("bad".to_string()));
        let error = result.cli_validation_error().unwrap_err();
        assert_eq!(error.exit_code, EXIT_ERROR);
        assert_eq!(handle_cli_result(Err(error)), EXIT_ERROR);
    }

    #[test]
    fn test_anyhow_errors_keep_context() {
        let error: CliError = anyhow::anyhow!("root cause").context("loading catalog").into();
        assert_eq!(error.message, "loading catalog: root cause");
        assert_eq!(error.exit_code, EXIT_ERROR);
    }

    #[test]
    fn test_sourceless_error_has_no_chain() {
        let error = CliError::from_error(
            std::io::Error::new(std::io::ErrorKind::NotFound, "catalog.json missing"),
            EXIT_WARNING,
        );
        assert_eq!(error.full_chain(), "catalog.json missing");
        assert_eq!(handle_cli_result(Err(error)), EXIT_WARNING);
    }
}
