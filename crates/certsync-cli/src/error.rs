//! CLI error types with exit code handling
//!
//! Every failure surfaces as a [`CliError`], rendered through miette and
//! mapped to an exit code.

use certsync_core::CoreError;
use certsync_kube::KubeError;
use miette::Diagnostic;
use thiserror::Error;

use crate::exit_codes;

/// CLI-specific error type that includes exit code information
#[derive(Error, Debug, Diagnostic)]
pub enum CliError {
    /// Configuration file or flags rejected
    #[error("Invalid configuration: {message}")]
    #[diagnostic(code(certsync::cli::config))]
    Config {
        message: String,
        #[help]
        help: Option<String>,
    },

    /// Talking to the cluster failed
    #[error("Cluster error: {message}")]
    #[diagnostic(code(certsync::cli::cluster))]
    Cluster {
        message: String,
        #[help]
        help: Option<String>,
    },

    /// IO error (file not found, permissions, etc.)
    #[error("IO error: {message}")]
    #[diagnostic(code(certsync::cli::io))]
    Io { message: String },

    /// Internal error (runtime, unexpected failure)
    #[error("Internal error: {message}")]
    #[diagnostic(code(certsync::cli::internal))]
    Internal { message: String },
}

impl CliError {
    /// Get the exit code for this error
    pub fn exit_code(&self) -> i32 {
        match self {
            CliError::Config { .. } => exit_codes::CONFIG_ERROR,
            CliError::Cluster { .. } => exit_codes::CLUSTER_ERROR,
            CliError::Io { .. } => exit_codes::IO_ERROR,
            CliError::Internal { .. } => exit_codes::ERROR,
        }
    }

    /// Create a configuration error
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
            help: None,
        }
    }

    /// Create an internal error
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }
}

impl From<std::io::Error> for CliError {
    fn from(err: std::io::Error) -> Self {
        CliError::Io {
            message: err.to_string(),
        }
    }
}

impl From<CoreError> for CliError {
    fn from(err: CoreError) -> Self {
        match err {
            CoreError::Io(e) => e.into(),
            CoreError::YamlParse(e) => CliError::Config {
                message: e.to_string(),
                help: Some("durations take a unit suffix, e.g. 30s, 5m, 24h or 365d".to_string()),
            },
            other => CliError::config(other.to_string()),
        }
    }
}

impl From<KubeError> for CliError {
    fn from(err: KubeError) -> Self {
        match err {
            KubeError::Core(e) => e.into(),
            KubeError::Api(e) => CliError::Cluster {
                message: e.to_string(),
                help: Some("check your kubeconfig context and RBAC permissions".to_string()),
            },
            other => CliError::Cluster {
                message: other.to_string(),
                help: None,
            },
        }
    }
}

impl From<kube::Error> for CliError {
    fn from(err: kube::Error) -> Self {
        KubeError::Api(err).into()
    }
}

/// Result type for CLI operations
pub type Result<T> = std::result::Result<T, CliError>;
