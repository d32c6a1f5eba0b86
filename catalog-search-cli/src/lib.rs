//! Catalog Search CLI library
//!
//! Command-line definitions and exit codes, exposed for tests.

/// Command-line interface definitions and argument parsing
pub mod cli;
/// Exit codes used by the CLI application
pub mod exit_codes;
