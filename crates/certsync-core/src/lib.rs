//! certsync Core - building blocks for self-managed webhook certificates
//!
//! This crate provides the cluster-independent pieces of certsync:
//! - `annotations`: Opt-in annotation parsing and DNS name derivation
//! - `pki`: Self-signed certificate issuance and inspection
//! - `lock`: Per-service mutual exclusion
//! - `index`: Service → dependent object secondary index
//! - `config`: Controller configuration

pub mod annotations;
pub mod config;
pub mod error;
pub mod identity;
pub mod index;
pub mod lock;
pub mod pki;

pub use config::ControllerConfig;
pub use error::{CoreError, Result};
pub use identity::ServiceIdentity;
pub use index::{DependentKind, ServiceIndex};
pub use lock::{KeyedGuard, KeyedLock};
pub use pki::{CertificateInfo, IssuedCertificate, RotationReason};
