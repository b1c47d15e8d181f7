//! Standard exit codes for CLI operations
//!
//! These exit codes follow Unix conventions and sysexits.h where applicable.

/// General error - unspecified failure
pub const ERROR: i32 = 1;

/// Configuration error - invalid configuration file or flag values
pub const CONFIG_ERROR: i32 = 2;

/// Cluster error - the Kubernetes API could not be reached or refused a request
pub const CLUSTER_ERROR: i32 = 3;

/// IO error - file not found, permission denied, etc.
pub const IO_ERROR: i32 = 5;
