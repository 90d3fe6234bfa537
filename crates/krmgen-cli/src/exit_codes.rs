//! Standard exit codes for CLI operations
//!
//! These exit codes follow Unix conventions and sysexits.h where applicable.

/// General error - unspecified failure
pub const ERROR: i32 = 1;

/// Configuration error - invalid config document, kustomization or chart source
pub const CONFIG_ERROR: i32 = 2;

/// Template error - template evaluation failed
pub const TEMPLATE_ERROR: i32 = 3;

/// Tool error - helm or kubectl could not be started or failed
pub const TOOL_ERROR: i32 = 4;

/// IO error - file not found, permission denied, etc.
pub const IO_ERROR: i32 = 5;
