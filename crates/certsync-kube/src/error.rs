//! Error types for certsync-kube

use thiserror::Error;

/// Result type for certsync-kube operations
pub type Result<T> = std::result::Result<T, KubeError>;

/// Errors that can occur while reconciling certificates
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum KubeError {
    /// Kubernetes API error
    #[error("Kubernetes API error: {0}")]
    Api(#[from] kube::Error),

    /// Object not found
    #[error("{kind} '{name}' not found{}", in_namespace(namespace))]
    NotFound {
        kind: String,
        namespace: Option<String>,
        name: String,
    },

    /// Object already exists
    #[error("{kind} '{name}' already exists{}", in_namespace(namespace))]
    AlreadyExists {
        kind: String,
        namespace: Option<String>,
        name: String,
    },

    /// Stored TLS secret cannot be used
    #[error("secret '{namespace}/{name}' holds an unusable certificate: {source}")]
    InvalidCertificate {
        namespace: String,
        name: String,
        #[source]
        source: certsync_core::CoreError,
    },

    /// Certificate generation or configuration error
    #[error(transparent)]
    Core(#[from] certsync_core::CoreError),

    /// Object is missing metadata the operation relies on
    #[error("invalid object: {0}")]
    InvalidObject(String),
}

fn in_namespace(namespace: &Option<String>) -> String {
    namespace
        .as_deref()
        .map(|ns| format!(" in namespace '{ns}'"))
        .unwrap_or_default()
}

impl KubeError {
    /// Check if this is a not-found error (structured or raw 404)
    pub fn is_not_found(&self) -> bool {
        match self {
            KubeError::NotFound { .. } => true,
            KubeError::Api(kube::Error::Api(resp)) => resp.code == 404,
            _ => false,
        }
    }

    /// Check if this is an already-exists conflict (structured or raw 409)
    pub fn is_already_exists(&self) -> bool {
        match self {
            KubeError::AlreadyExists { .. } => true,
            KubeError::Api(kube::Error::Api(resp)) => {
                resp.code == 409 && resp.reason == "AlreadyExists"
            }
            _ => false,
        }
    }
}
