//! Standard exit codes for CLI operations
//!
//! These exit codes follow Unix conventions and sysexits.h where applicable.

#![allow(dead_code)]

/// Success - operation completed without errors
pub const SUCCESS: i32 = 0;

/// General error - unspecified failure
pub const ERROR: i32 = 1;

/// Configuration error - bad config file, policy file or endpoint
pub const CONFIG_ERROR: i32 = 2;

/// Chart not found in the catalog
pub const NOT_FOUND: i32 = 3;

/// Chart artifact failed re-validation on download
pub const INVALID_ARTIFACT: i32 = 4;

/// IO error - file not found, permission denied, etc.
pub const IO_ERROR: i32 = 5;

/// Backend unreachable, timed out or refused the request
pub const BACKEND_ERROR: i32 = 6;

/// Usage error - invalid arguments or options (following sysexits.h convention)
pub const USAGE_ERROR: i32 = 64;
