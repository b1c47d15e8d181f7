//! Object access and re-delivery seams
//!
//! The reconcilers never talk to the API server directly. They go through:
//! - [`ObjectStore`]: cached reads plus direct get/create/update per kind
//! - [`Enqueue`]: asks the dispatch layer to deliver an object again
//!
//! [`KubeStore`] and [`ChannelQueue`] back these with kube-runtime reflectors
//! and controller trigger streams; [`MockObjectStore`] and [`RecordingQueue`]
//! keep everything in memory for tests.

mod cluster;
mod mock;
mod queue;

pub use cluster::KubeStore;
pub use mock::{MockObjectStore, OperationCounts};
pub use queue::{ChannelQueue, QueueReceivers, RecordingQueue};

use async_trait::async_trait;
use certsync_core::DependentKind;
use std::fmt;
use std::sync::Arc;

use crate::error::Result;

/// Read/write access to one object kind
///
/// Implementations must be Send + Sync for use across reconcile tasks.
#[async_trait]
pub trait ObjectStore<K>: Send + Sync {
    /// Look an object up in the local cache; may lag behind the cluster
    fn cached(&self, namespace: Option<&str>, name: &str) -> Option<Arc<K>>;

    /// Read an object straight from the source of truth, bypassing the cache
    async fn get(&self, namespace: Option<&str>, name: &str) -> Result<K>;

    /// Create an object; fails with `AlreadyExists` if the name is taken
    async fn create(&self, obj: &K) -> Result<K>;

    /// Replace an existing object
    async fn update(&self, obj: &K) -> Result<K>;
}

/// Object to be delivered again to its own handler
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ObjectKey {
    Service { namespace: String, name: String },
    Dependent { kind: DependentKind, name: String },
}

impl ObjectKey {
    pub fn service(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        ObjectKey::Service {
            namespace: namespace.into(),
            name: name.into(),
        }
    }

    pub fn dependent(kind: DependentKind, name: impl Into<String>) -> Self {
        ObjectKey::Dependent {
            kind,
            name: name.into(),
        }
    }
}

impl fmt::Display for ObjectKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ObjectKey::Service { namespace, name } => write!(f, "Service {namespace}/{name}"),
            ObjectKey::Dependent { kind, name } => write!(f, "{kind} {name}"),
        }
    }
}

/// Schedules asynchronous re-delivery of an object
pub trait Enqueue: Send + Sync {
    fn enqueue(&self, key: ObjectKey);
}
