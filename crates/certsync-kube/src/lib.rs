//! certsync Kube - Kubernetes integration for certsync
//!
//! This crate provides:
//! - **Certificate Manager**: Issues and rotates the TLS Secret of every opted-in Service
//! - **Reconcilers**: Keep webhook and CRD conversion CA bundles in step with those Secrets
//! - **Object Stores**: Cached reads and writes behind a trait, with an in-memory mock
//! - **Controllers**: kube-runtime wiring with reflectors, index upkeep and trigger queues
//! - **Status**: Read-only overview of managed certificates

pub mod controller;
pub mod error;
pub mod manager;
pub mod reconcile;
pub mod status;
pub mod store;

pub use controller::{Context, build_controllers, next_check, run};
pub use error::{KubeError, Result};
pub use manager::{CertManager, CertSettings};
pub use reconcile::{Handlers, Stores, WebhookTarget};
pub use status::{SecretState, ServiceStatus};
pub use store::{
    ChannelQueue, Enqueue, KubeStore, MockObjectStore, ObjectKey, ObjectStore, OperationCounts,
    RecordingQueue,
};
