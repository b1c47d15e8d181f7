//! Certificate manager
//!
//! Owns the lifecycle of the TLS Secret behind every opted-in Service:
//!
//! 1. No secret-name annotation: nothing to do.
//! 2. Secret missing: issue a self-signed keypair and create the Secret.
//!    Losing a create race against a stale cache is recovered by reading the
//!    winner's Secret directly.
//! 3. Secret present: reissue in place when the certificate expires within
//!    the renewal window or its DNS names drifted from the Service.
//!
//! The whole read-modify-write runs under a lock keyed by the Service, so at
//! most one issuance per Service is in flight.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use certsync_core::{
    ControllerConfig, KeyedLock, ServiceIdentity, annotations,
    pki::{self, IssuedCertificate},
};
use k8s_openapi::ByteString;
use k8s_openapi::api::core::v1::{Secret, Service};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::{ObjectMeta, OwnerReference};
use tracing::{debug, info, warn};

use crate::error::{KubeError, Result};
use crate::store::ObjectStore;

/// Secret type for TLS keypairs
pub const TLS_SECRET_TYPE: &str = "kubernetes.io/tls";

/// Data key of the PEM certificate
pub const TLS_CERT_KEY: &str = "tls.crt";

/// Data key of the PEM private key
pub const TLS_KEY_KEY: &str = "tls.key";

/// Label marking Secrets created by certsync
pub const MANAGED_BY_LABEL: &str = "app.kubernetes.io/managed-by";

/// Value of [`MANAGED_BY_LABEL`]
pub const MANAGED_BY: &str = "certsync";

/// Certificate settings derived from the controller configuration
#[derive(Debug, Clone)]
pub struct CertSettings {
    pub secret_name_annotation: String,
    pub dns_name_prefix: String,
    pub renewal_window: Duration,
    pub validity: Duration,
}

impl From<&ControllerConfig> for CertSettings {
    fn from(config: &ControllerConfig) -> Self {
        Self {
            secret_name_annotation: config.secret_name_annotation.clone(),
            dns_name_prefix: config.dns_name_annotation_prefix.clone(),
            renewal_window: config.renewal_window,
            validity: config.certificate_validity,
        }
    }
}

impl CertSettings {
    /// Name of the Secret a Service asked for, if it opted in
    pub fn secret_name<'a>(&self, service: &'a Service) -> Option<&'a str> {
        service
            .metadata
            .annotations
            .as_ref()
            .and_then(|ann| annotations::secret_name(ann, &self.secret_name_annotation))
    }

    /// DNS names the Service's certificate must carry
    pub fn dns_names(&self, identity: &ServiceIdentity, service: &Service) -> Vec<String> {
        let empty = BTreeMap::new();
        let ann = service.metadata.annotations.as_ref().unwrap_or(&empty);
        annotations::dns_names(identity, ann, &self.dns_name_prefix)
    }
}

impl Default for CertSettings {
    fn default() -> Self {
        Self::from(&ControllerConfig::default())
    }
}

/// Identity of a Service object, if it has both namespace and name
pub fn service_identity(service: &Service) -> Option<ServiceIdentity> {
    let namespace = service.metadata.namespace.as_deref()?;
    let name = service.metadata.name.as_deref()?;
    Some(ServiceIdentity::new(namespace, name))
}

/// PEM certificate bytes stored in a TLS Secret
pub fn secret_certificate(secret: &Secret) -> Option<&[u8]> {
    secret
        .data
        .as_ref()
        .and_then(|data| data.get(TLS_CERT_KEY))
        .map(|cert| cert.0.as_slice())
}

fn tls_data(issued: IssuedCertificate) -> BTreeMap<String, ByteString> {
    BTreeMap::from([
        (TLS_CERT_KEY.to_string(), ByteString(issued.cert_pem.into_bytes())),
        (TLS_KEY_KEY.to_string(), ByteString(issued.key_pem.into_bytes())),
    ])
}

/// Issues and rotates the TLS Secrets of opted-in Services
pub struct CertManager {
    secrets: Arc<dyn ObjectStore<Secret>>,
    locks: KeyedLock,
    settings: CertSettings,
}

impl CertManager {
    pub fn new(secrets: Arc<dyn ObjectStore<Secret>>, settings: CertSettings) -> Self {
        Self {
            secrets,
            locks: KeyedLock::new(),
            settings,
        }
    }

    pub fn settings(&self) -> &CertSettings {
        &self.settings
    }

    /// Make sure the Service's TLS Secret exists and is current
    ///
    /// Returns `None` for Services that did not opt in.
    pub async fn ensure_secret(&self, service: &Service) -> Result<Option<Secret>> {
        let Some(secret_name) = self.settings.secret_name(service) else {
            return Ok(None);
        };
        let Some(identity) = service_identity(service) else {
            return Err(KubeError::InvalidObject(
                "service is missing its namespace or name".to_string(),
            ));
        };
        let dns_names = self.settings.dns_names(&identity, service);
        let common_name = format!("{}-{}", identity.namespace, secret_name);

        let _guard = self.locks.lock(&identity.key()).await;

        let Some(existing) = self.secrets.cached(Some(&identity.namespace), secret_name) else {
            return self
                .create_secret(service, &identity, secret_name, &common_name, &dns_names)
                .await
                .map(Some);
        };

        let cert = secret_certificate(&existing).unwrap_or_default();
        let leaf = pki::parse_leaf(cert).map_err(|source| KubeError::InvalidCertificate {
            namespace: identity.namespace.clone(),
            name: secret_name.to_string(),
            source,
        })?;

        match leaf.rotation_reason(&dns_names, self.settings.renewal_window, pki::unix_now()) {
            None => {
                debug!(
                    "Secret {}/{} for service {} is current",
                    identity.namespace, secret_name, identity
                );
                Ok(Some(existing.as_ref().clone()))
            }
            Some(reason) => {
                info!(
                    "Rotating secret {}/{} for service {}: {}",
                    identity.namespace, secret_name, identity, reason
                );
                let issued = pki::issue_self_signed(&common_name, &dns_names, self.settings.validity)?;
                let mut rotated = existing.as_ref().clone();
                rotated.data = Some(tls_data(issued));
                self.secrets.update(&rotated).await.map(Some)
            }
        }
    }

    async fn create_secret(
        &self,
        service: &Service,
        identity: &ServiceIdentity,
        secret_name: &str,
        common_name: &str,
        dns_names: &[String],
    ) -> Result<Secret> {
        let issued = pki::issue_self_signed(common_name, dns_names, self.settings.validity)?;
        let secret = Secret {
            metadata: ObjectMeta {
                name: Some(secret_name.to_string()),
                namespace: Some(identity.namespace.clone()),
                labels: Some(BTreeMap::from([(
                    MANAGED_BY_LABEL.to_string(),
                    MANAGED_BY.to_string(),
                )])),
                owner_references: Some(vec![OwnerReference {
                    api_version: "v1".to_string(),
                    kind: "Service".to_string(),
                    name: identity.name.clone(),
                    uid: service.metadata.uid.clone().unwrap_or_default(),
                    ..Default::default()
                }]),
                ..Default::default()
            },
            type_: Some(TLS_SECRET_TYPE.to_string()),
            data: Some(tls_data(issued)),
            ..Default::default()
        };

        match self.secrets.create(&secret).await {
            Ok(created) => {
                info!(
                    "Created secret {}/{} for service {}",
                    identity.namespace, secret_name, identity
                );
                Ok(created)
            }
            Err(e) if e.is_already_exists() => {
                warn!(
                    "Secret {}/{} already exists (stale cache), reading it directly",
                    identity.namespace, secret_name
                );
                self.secrets.get(Some(&identity.namespace), secret_name).await
            }
            Err(e) => Err(e),
        }
    }

    /// Time until a Secret's certificate enters the renewal window
    ///
    /// `None` when the Secret has no parseable certificate.
    pub fn time_until_renewal(&self, secret: &Secret) -> Option<Duration> {
        let leaf = pki::parse_leaf(secret_certificate(secret)?).ok()?;
        let window = i64::try_from(self.settings.renewal_window.as_secs()).unwrap_or(i64::MAX);
        let due = leaf.not_after.saturating_sub(window);
        let remaining = due.saturating_sub(pki::unix_now()).max(0);
        Some(Duration::from_secs(remaining as u64))
    }
}
