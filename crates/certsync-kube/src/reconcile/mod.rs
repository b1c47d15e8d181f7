//! Change handlers
//!
//! Every handler receives the object from a notification, or `None` when the
//! object was deleted (a no-op). Handlers never call each other; a Service or
//! Secret change reaches the dependent objects only through [`Enqueue`].

mod target;

pub use target::{WebhookTarget, service_keys};

#[cfg(test)]
pub(crate) use target::fixtures;

use std::sync::Arc;

use certsync_core::{DependentKind, ServiceIndex};
use k8s_openapi::api::admissionregistration::v1::{
    MutatingWebhookConfiguration, ValidatingWebhookConfiguration,
};
use k8s_openapi::api::core::v1::{Secret, Service};
use k8s_openapi::apiextensions_apiserver::pkg::apis::apiextensions::v1::CustomResourceDefinition;
use tracing::{debug, info, warn};

use crate::error::Result;
use crate::manager::{CertManager, CertSettings, secret_certificate, service_identity};
use crate::store::{Enqueue, ObjectKey, ObjectStore};

/// Object access for every kind the handlers touch
#[derive(Clone)]
pub struct Stores {
    pub services: Arc<dyn ObjectStore<Service>>,
    pub secrets: Arc<dyn ObjectStore<Secret>>,
    pub mutating: Arc<dyn ObjectStore<MutatingWebhookConfiguration>>,
    pub validating: Arc<dyn ObjectStore<ValidatingWebhookConfiguration>>,
    pub crds: Arc<dyn ObjectStore<CustomResourceDefinition>>,
}

/// The five change handlers and their shared state
pub struct Handlers {
    certs: CertManager,
    stores: Stores,
    index: Arc<ServiceIndex>,
    queue: Arc<dyn Enqueue>,
}

impl Handlers {
    pub fn new(
        stores: Stores,
        settings: CertSettings,
        index: Arc<ServiceIndex>,
        queue: Arc<dyn Enqueue>,
    ) -> Self {
        Self {
            certs: CertManager::new(stores.secrets.clone(), settings),
            stores,
            index,
            queue,
        }
    }

    pub fn certs(&self) -> &CertManager {
        &self.certs
    }

    /// Ensure the Service's secret, then re-deliver every dependent object
    pub async fn on_service_change(&self, service: Option<&Service>) -> Result<Option<Secret>> {
        let Some(service) = service else {
            return Ok(None);
        };
        let secret = self.certs.ensure_secret(service).await?;

        if let Some(identity) = service_identity(service) {
            let key = identity.key();
            for kind in DependentKind::ALL {
                for name in self.index.dependents(kind, &key) {
                    self.queue.enqueue(ObjectKey::dependent(kind, name));
                }
            }
        }
        Ok(secret)
    }

    /// Re-deliver the Services owning a Secret
    pub fn on_secret_change(&self, secret: Option<&Secret>) {
        let Some(secret) = secret else {
            return;
        };
        let Some(namespace) = secret.metadata.namespace.as_deref() else {
            return;
        };

        let owners = secret.metadata.owner_references.iter().flatten();
        for owner in owners.filter(|o| o.kind == "Service" && o.api_version == "v1") {
            self.queue.enqueue(ObjectKey::service(namespace, &owner.name));
        }
    }

    pub async fn on_mutating_config_change(
        &self,
        config: Option<&MutatingWebhookConfiguration>,
    ) -> Result<Option<MutatingWebhookConfiguration>> {
        match config {
            Some(config) => self
                .reconcile_target(config, self.stores.mutating.as_ref())
                .await
                .map(Some),
            None => Ok(None),
        }
    }

    pub async fn on_validating_config_change(
        &self,
        config: Option<&ValidatingWebhookConfiguration>,
    ) -> Result<Option<ValidatingWebhookConfiguration>> {
        match config {
            Some(config) => self
                .reconcile_target(config, self.stores.validating.as_ref())
                .await
                .map(Some),
            None => Ok(None),
        }
    }

    pub async fn on_crd_change(
        &self,
        crd: Option<&CustomResourceDefinition>,
    ) -> Result<Option<CustomResourceDefinition>> {
        match crd {
            Some(crd) => self
                .reconcile_target(crd, self.stores.crds.as_ref())
                .await
                .map(Some),
            None => Ok(None),
        }
    }

    /// Bring every CA bundle of `original` in line with its service's certificate
    ///
    /// Bundles are compared against `original`; each differing slot is written
    /// separately, on top of the result of the previous write.
    async fn reconcile_target<T: WebhookTarget>(
        &self,
        original: &T,
        store: &dyn ObjectStore<T>,
    ) -> Result<T> {
        let name = original.object_name();
        let mut current = original.clone();

        for (slot, identity) in original.service_refs() {
            let Some(service) = self
                .stores
                .services
                .cached(Some(&identity.namespace), &identity.name)
            else {
                debug!("{} {}: service {} not found, skipping", T::KIND, name, identity);
                continue;
            };
            let Some(secret) = self.certs.ensure_secret(&service).await? else {
                debug!("{} {}: service {} is not managed", T::KIND, name, identity);
                continue;
            };
            let Some(cert) = secret_certificate(&secret) else {
                warn!("{} {}: secret for service {} has no certificate", T::KIND, name, identity);
                continue;
            };

            if original.ca_bundle(slot) == Some(cert) {
                continue;
            }

            let mut updated = current.clone();
            updated.set_ca_bundle(slot, cert.to_vec());
            current = store.update(&updated).await?;
            info!("Updated CA bundle of {} {} for service {}", T::KIND, name, identity);
        }

        Ok(current)
    }
}
