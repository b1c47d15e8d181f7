//! Objects that embed CA bundles for services
//!
//! Admission webhook configurations carry one CA bundle per webhook entry; a
//! CRD carries at most one, on its conversion webhook. Both are addressed by
//! slot so a single reconciler can handle every kind.

use certsync_core::{DependentKind, ServiceIdentity};
use k8s_openapi::ByteString;
use k8s_openapi::api::admissionregistration::v1::{
    MutatingWebhookConfiguration, ValidatingWebhookConfiguration, WebhookClientConfig,
};
use k8s_openapi::apiextensions_apiserver::pkg::apis::apiextensions::v1::CustomResourceDefinition;

/// A dependent object whose CA bundles follow service certificates
pub trait WebhookTarget: Clone + Send + Sync + 'static {
    /// Index table this kind is registered under
    const KIND: DependentKind;

    /// Object name (dependent kinds are cluster-scoped)
    fn object_name(&self) -> String;

    /// Slots that reference a service, with the referenced service
    fn service_refs(&self) -> Vec<(usize, ServiceIdentity)>;

    /// Current CA bundle of a slot
    fn ca_bundle(&self, slot: usize) -> Option<&[u8]>;

    /// Replace the CA bundle of a slot; unknown slots are ignored
    fn set_ca_bundle(&mut self, slot: usize, bundle: Vec<u8>);
}

/// Index function: service keys referenced by a dependent object
///
/// Objects without any service reference yield an empty list.
pub fn service_keys<T: WebhookTarget>(obj: &T) -> Vec<String> {
    obj.service_refs()
        .into_iter()
        .map(|(_, service)| service.key())
        .collect()
}

fn admission_service(config: &WebhookClientConfig) -> Option<ServiceIdentity> {
    config
        .service
        .as_ref()
        .map(|svc| ServiceIdentity::new(&svc.namespace, &svc.name))
}

fn bundle_bytes(bundle: &Option<ByteString>) -> Option<&[u8]> {
    bundle.as_ref().map(|b| b.0.as_slice())
}

/// Admission configurations: one slot per webhook entry
macro_rules! admission_target {
    ($config:ty, $kind:expr) => {
        impl WebhookTarget for $config {
            const KIND: DependentKind = $kind;

            fn object_name(&self) -> String {
                self.metadata.name.clone().unwrap_or_default()
            }

            fn service_refs(&self) -> Vec<(usize, ServiceIdentity)> {
                self.webhooks
                    .iter()
                    .flatten()
                    .enumerate()
                    .filter_map(|(slot, hook)| {
                        admission_service(&hook.client_config).map(|s| (slot, s))
                    })
                    .collect()
            }

            fn ca_bundle(&self, slot: usize) -> Option<&[u8]> {
                self.webhooks
                    .as_ref()?
                    .get(slot)
                    .and_then(|hook| bundle_bytes(&hook.client_config.ca_bundle))
            }

            fn set_ca_bundle(&mut self, slot: usize, bundle: Vec<u8>) {
                if let Some(hook) = self.webhooks.as_mut().and_then(|hooks| hooks.get_mut(slot)) {
                    hook.client_config.ca_bundle = Some(ByteString(bundle));
                }
            }
        }
    };
}

admission_target!(
    MutatingWebhookConfiguration,
    DependentKind::MutatingWebhookConfiguration
);
admission_target!(
    ValidatingWebhookConfiguration,
    DependentKind::ValidatingWebhookConfiguration
);

impl WebhookTarget for CustomResourceDefinition {
    const KIND: DependentKind = DependentKind::CustomResourceDefinition;

    fn object_name(&self) -> String {
        self.metadata.name.clone().unwrap_or_default()
    }

    fn service_refs(&self) -> Vec<(usize, ServiceIdentity)> {
        self.spec
            .conversion
            .as_ref()
            .and_then(|conversion| conversion.webhook.as_ref())
            .and_then(|webhook| webhook.client_config.as_ref())
            .and_then(|config| config.service.as_ref())
            .map(|svc| vec![(0, ServiceIdentity::new(&svc.namespace, &svc.name))])
            .unwrap_or_default()
    }

    fn ca_bundle(&self, slot: usize) -> Option<&[u8]> {
        if slot != 0 {
            return None;
        }
        let config = self
            .spec
            .conversion
            .as_ref()?
            .webhook
            .as_ref()?
            .client_config
            .as_ref()?;
        bundle_bytes(&config.ca_bundle)
    }

    fn set_ca_bundle(&mut self, slot: usize, bundle: Vec<u8>) {
        if slot != 0 {
            return;
        }
        let config = self
            .spec
            .conversion
            .as_mut()
            .and_then(|conversion| conversion.webhook.as_mut())
            .and_then(|webhook| webhook.client_config.as_mut());
        if let Some(config) = config {
            config.ca_bundle = Some(ByteString(bundle));
        }
    }
}

#[cfg(test)]
pub(crate) mod fixtures {
    use k8s_openapi::api::admissionregistration::v1::{
        MutatingWebhook, MutatingWebhookConfiguration, ServiceReference, ValidatingWebhook,
        ValidatingWebhookConfiguration, WebhookClientConfig,
    };
    use k8s_openapi::apiextensions_apiserver::pkg::apis::apiextensions::v1 as apiext;
    use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;

    fn client_config(service: Option<(&str, &str)>, ca_bundle: &[u8]) -> WebhookClientConfig {
        WebhookClientConfig {
            service: service.map(|(namespace, name)| ServiceReference {
                namespace: namespace.to_string(),
                name: name.to_string(),
                ..Default::default()
            }),
            url: service.is_none().then(|| "https://example.com/hook".to_string()),
            ca_bundle: (!ca_bundle.is_empty()).then(|| k8s_openapi::ByteString(ca_bundle.to_vec())),
        }
    }

    /// Mutating config with one webhook per entry; `None` means URL-based
    pub fn mutating(name: &str, entries: &[(Option<(&str, &str)>, &[u8])]) -> MutatingWebhookConfiguration {
        MutatingWebhookConfiguration {
            metadata: ObjectMeta {
                name: Some(name.to_string()),
                ..Default::default()
            },
            webhooks: Some(
                entries
                    .iter()
                    .enumerate()
                    .map(|(i, (service, bundle))| MutatingWebhook {
                        name: format!("hook{i}.example.com"),
                        client_config: client_config(*service, bundle),
                        admission_review_versions: vec!["v1".to_string()],
                        side_effects: "None".to_string(),
                        ..Default::default()
                    })
                    .collect(),
            ),
        }
    }

    pub fn validating(name: &str, entries: &[(Option<(&str, &str)>, &[u8])]) -> ValidatingWebhookConfiguration {
        ValidatingWebhookConfiguration {
            metadata: ObjectMeta {
                name: Some(name.to_string()),
                ..Default::default()
            },
            webhooks: Some(
                entries
                    .iter()
                    .enumerate()
                    .map(|(i, (service, bundle))| ValidatingWebhook {
                        name: format!("hook{i}.example.com"),
                        client_config: client_config(*service, bundle),
                        admission_review_versions: vec!["v1".to_string()],
                        side_effects: "None".to_string(),
                        ..Default::default()
                    })
                    .collect(),
            ),
        }
    }

    /// CRD, optionally with a conversion webhook pointing at `service`
    pub fn crd(name: &str, conversion: Option<Option<(&str, &str)>>) -> apiext::CustomResourceDefinition {
        apiext::CustomResourceDefinition {
            metadata: ObjectMeta {
                name: Some(name.to_string()),
                ..Default::default()
            },
            spec: apiext::CustomResourceDefinitionSpec {
                group: "example.com".to_string(),
                scope: "Namespaced".to_string(),
                names: apiext::CustomResourceDefinitionNames {
                    kind: "Widget".to_string(),
                    plural: "widgets".to_string(),
                    ..Default::default()
                },
                conversion: conversion.map(|service| apiext::CustomResourceConversion {
                    strategy: "Webhook".to_string(),
                    webhook: Some(apiext::WebhookConversion {
                        client_config: Some(apiext::WebhookClientConfig {
                            service: service.map(|(namespace, name)| apiext::ServiceReference {
                                namespace: namespace.to_string(),
                                name: name.to_string(),
                                ..Default::default()
                            }),
                            url: service.is_none().then(|| "https://example.com/convert".to_string()),
                            ca_bundle: None,
                        }),
                        conversion_review_versions: vec!["v1".to_string()],
                    }),
                }),
                ..Default::default()
            },
            status: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::fixtures::*;
    use super::*;

    #[test]
    fn test_mutating_index_keys() {
        let config = mutating(
            "hooks",
            &[(Some(("ns", "svc")), b""), (None, b""), (Some(("other", "api")), b"")],
        );
        assert_eq!(service_keys(&config), vec!["ns/svc", "other/api"]);

        let refs = config.service_refs();
        assert_eq!(refs[0].0, 0);
        assert_eq!(refs[1].0, 2);
    }

    #[test]
    fn test_validating_without_webhooks() {
        let mut config = validating("empty", &[]);
        config.webhooks = None;
        assert!(service_keys(&config).is_empty());
        assert_eq!(config.ca_bundle(0), None);
    }

    #[test]
    fn test_crd_index_keys() {
        assert_eq!(
            service_keys(&crd("widgets.example.com", Some(Some(("ns", "conv"))))),
            vec!["ns/conv"]
        );
        assert!(service_keys(&crd("widgets.example.com", Some(None))).is_empty());
        assert!(service_keys(&crd("widgets.example.com", None)).is_empty());
    }

    #[test]
    fn test_set_and_get_bundle() {
        let mut config = mutating("hooks", &[(Some(("ns", "svc")), b"old")]);
        assert_eq!(config.ca_bundle(0), Some(b"old".as_slice()));

        config.set_ca_bundle(0, b"new".to_vec());
        assert_eq!(config.ca_bundle(0), Some(b"new".as_slice()));

        // Out of range is ignored
        config.set_ca_bundle(5, b"x".to_vec());
        assert_eq!(config.webhooks.as_ref().unwrap().len(), 1);
    }

    #[test]
    fn test_admission_kinds_share_slot_layout() {
        let entries: &[(Option<(&str, &str)>, &[u8])] =
            &[(None, b""), (Some(("ns", "svc")), b"old")];
        let mut mutating_config = mutating("hooks", entries);
        let mut validating_config = validating("hooks", entries);

        assert_eq!(mutating_config.service_refs(), validating_config.service_refs());
        mutating_config.set_ca_bundle(1, b"new".to_vec());
        validating_config.set_ca_bundle(1, b"new".to_vec());
        assert_eq!(mutating_config.ca_bundle(1), Some(b"new".as_slice()));
        assert_eq!(validating_config.ca_bundle(1), Some(b"new".as_slice()));
        assert_eq!(
            <MutatingWebhookConfiguration as WebhookTarget>::KIND,
            DependentKind::MutatingWebhookConfiguration
        );
        assert_eq!(
            <ValidatingWebhookConfiguration as WebhookTarget>::KIND,
            DependentKind::ValidatingWebhookConfiguration
        );
    }

    #[test]
    fn test_crd_bundle_slot() {
        let mut obj = crd("widgets.example.com", Some(Some(("ns", "conv"))));
        assert_eq!(obj.ca_bundle(0), None);

        obj.set_ca_bundle(0, b"pem".to_vec());
        assert_eq!(obj.ca_bundle(0), Some(b"pem".as_slice()));
        assert_eq!(obj.ca_bundle(1), None);

        let mut plain = crd("plain.example.com", None);
        plain.set_ca_bundle(0, b"pem".to_vec());
        assert!(plain.spec.conversion.is_none());
    }
}
