//! CLI Exit Code Registry
//!
//! This is the single source of truth for all CLI exit codes.
//! Exit codes are part of the shell contract; scripts rely on them.
//!
//! # Exit Code Ranges
//!
//! | Range   | Domain           | Description                              |
//! |---------|------------------|------------------------------------------|
//! | 0       | Universal        | Success                                  |
//! | 1       | Universal        | General error (unspecified)              |
//! | 2       | Universal        | CLI usage error (bad args, missing file) |
//! | 3-9     | collection       | Settings, inputs and the record file     |
//! | 10-19   | check            | Consistency findings                     |
//! | 50-59   | fetch            | Remote source clients                    |

// =============================================================================
// Universal (0-2)
// =============================================================================

/// Success - command completed without errors.
pub const EXIT_SUCCESS: u8 = 0;

/// General error - unspecified failure.
pub const EXIT_ERROR: u8 = 1;

/// Usage error - bad arguments, missing required options.
pub const EXIT_USAGE: u8 = 2;

// =============================================================================
// Collection (3-9)
// =============================================================================

/// Settings file unreadable, malformed or out of range.
pub const EXIT_CONFIG: u8 = 3;

/// An input table or map could not be read or parsed.
pub const EXIT_INPUT: u8 = 4;

/// The record collection is missing, malformed, or could not be written.
pub const EXIT_COLLECTION: u8 = 5;

// =============================================================================
// Check (10-19)
// =============================================================================

/// `check --strict` found problems.
pub const EXIT_CHECK_FINDINGS: u8 = 10;

// =============================================================================
// Fetch (50-59)
// =============================================================================

/// HTTP client could not be built, or an endpoint URL is invalid.
pub const EXIT_FETCH_CLIENT: u8 = 50;
