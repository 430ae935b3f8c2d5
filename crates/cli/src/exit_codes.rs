//! CLI Exit Code Registry
//!
//! This is the single source of truth for all CLI exit codes.
//! Exit codes are part of the shell contract: scripts rely on them.
//!
//! # Exit Code Ranges
//!
//! | Range   | Domain           | Description                              |
//! |---------|------------------|------------------------------------------|
//! | 0       | Universal        | Success                                  |
//! | 2       | Universal        | CLI usage error (bad args)               |
//! | 60-69   | run              | Configuration, paths, pipeline, output   |
//!
//! # Adding New Exit Codes
//!
//! 1. Add the constant in the appropriate range
//! 2. Document what triggers it
//! 3. Update the table above
//! 4. Wire it into `CliError`

// =============================================================================
// Universal (0-2)
// =============================================================================

/// Success - the job ran and every partition was written.
pub const EXIT_SUCCESS: u8 = 0;

/// Usage error - bad arguments, missing required options.
pub const EXIT_USAGE: u8 = 2;

// =============================================================================
// Run (60-69)
// =============================================================================

/// Configuration could not be read, parsed, merged or validated, or names
/// an unknown action.
pub const EXIT_INVALID_CONFIG: u8 = 60;

/// A supplied path is neither a file nor a directory and may not be created.
pub const EXIT_PATH_NOT_FOUND: u8 = 61;

/// Reading, mutating or reconciling failed.
pub const EXIT_RUNTIME: u8 = 62;

/// A partition could not be written.
pub const EXIT_WRITE: u8 = 63;
