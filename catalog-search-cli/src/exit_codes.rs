//! Exit code constants for CLI commands
//!
//! - 0: Success
//! - 1: Completed with warnings (some products or jobs failed)
//! - 2: The command could not run

/// Successful execution
pub const EXIT_SUCCESS: i32 = 0;

/// Completed, but some items failed
pub const EXIT_WARNING: i32 = 1;

/// Invalid input, configuration or catalog
pub const EXIT_ERROR: i32 = 2;
