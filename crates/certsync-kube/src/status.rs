//! Read-only overview of managed certificates

use std::collections::HashMap;

use certsync_core::{DependentKind, ServiceIndex, pki};
use chrono::{DateTime, Utc};
use k8s_openapi::api::admissionregistration::v1::{
    MutatingWebhookConfiguration, ValidatingWebhookConfiguration,
};
use k8s_openapi::api::core::v1::{Secret, Service};
use k8s_openapi::apiextensions_apiserver::pkg::apis::apiextensions::v1::CustomResourceDefinition;
use kube::api::ListParams;
use kube::{Api, Client, ResourceExt};
use serde::Serialize;

use crate::error::Result;
use crate::manager::{CertSettings, secret_certificate, service_identity};
use crate::reconcile::{WebhookTarget, service_keys};

/// State of a Service's TLS Secret
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase", tag = "state")]
pub enum SecretState {
    /// Not created yet
    Missing,
    /// Valid and matching the Service
    Current,
    /// Will be reissued on the next reconcile
    RotationDue { reason: String },
    /// Holds no usable certificate
    Invalid { error: String },
}

/// Dependent object pointing at a Service
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DependentRef {
    pub kind: DependentKind,
    pub name: String,
}

/// Certificate status of one opted-in Service
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ServiceStatus {
    pub namespace: String,
    pub service: String,
    pub secret: String,
    #[serde(flatten)]
    pub state: SecretState,
    /// DNS names the certificate should carry
    pub dns_names: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub not_after: Option<DateTime<Utc>>,
    pub dependents: Vec<DependentRef>,
}

fn index_dependents<T: WebhookTarget>(index: &ServiceIndex, objects: &[T]) {
    for obj in objects {
        index.observe(T::KIND, &obj.object_name(), service_keys(obj));
    }
}

/// Build an index over the given dependent objects
pub fn build_index(
    mutating: &[MutatingWebhookConfiguration],
    validating: &[ValidatingWebhookConfiguration],
    crds: &[CustomResourceDefinition],
) -> ServiceIndex {
    let index = ServiceIndex::new();
    index_dependents(&index, mutating);
    index_dependents(&index, validating);
    index_dependents(&index, crds);
    index
}

/// Status of every opted-in Service, sorted by namespace and name
pub fn summarize(
    services: &[Service],
    secrets: &[Secret],
    index: &ServiceIndex,
    settings: &CertSettings,
    now: i64,
) -> Vec<ServiceStatus> {
    let secrets: HashMap<(String, String), &Secret> = secrets
        .iter()
        .filter_map(|s| Some(((s.namespace()?, s.name_any()), s)))
        .collect();

    let mut statuses: Vec<ServiceStatus> = services
        .iter()
        .filter_map(|service| {
            let secret_name = settings.secret_name(service)?;
            let identity = service_identity(service)?;
            let dns_names = settings.dns_names(&identity, service);

            let secret = secrets.get(&(identity.namespace.clone(), secret_name.to_string()));
            let (state, not_after) = match secret {
                None => (SecretState::Missing, None),
                Some(secret) => match pki::parse_leaf(secret_certificate(secret).unwrap_or_default()) {
                    Err(e) => (SecretState::Invalid { error: e.to_string() }, None),
                    Ok(leaf) => {
                        let state = match leaf.rotation_reason(&dns_names, settings.renewal_window, now) {
                            Some(reason) => SecretState::RotationDue {
                                reason: reason.to_string(),
                            },
                            None => SecretState::Current,
                        };
                        (state, DateTime::from_timestamp(leaf.not_after, 0))
                    }
                },
            };

            let key = identity.key();
            let dependents = DependentKind::ALL
                .into_iter()
                .flat_map(|kind| {
                    index
                        .dependents(kind, &key)
                        .into_iter()
                        .map(move |name| DependentRef { kind, name })
                })
                .collect();

            Some(ServiceStatus {
                namespace: identity.namespace,
                service: identity.name,
                secret: secret_name.to_string(),
                state,
                dns_names,
                not_after,
                dependents,
            })
        })
        .collect();

    statuses.sort_by(|a, b| (&a.namespace, &a.service).cmp(&(&b.namespace, &b.service)));
    statuses
}

/// List the cluster and summarize it
pub async fn collect(
    client: Client,
    namespace: Option<&str>,
    settings: &CertSettings,
) -> Result<Vec<ServiceStatus>> {
    let (services_api, secrets_api): (Api<Service>, Api<Secret>) = match namespace {
        Some(ns) => (
            Api::namespaced(client.clone(), ns),
            Api::namespaced(client.clone(), ns),
        ),
        None => (Api::all(client.clone()), Api::all(client.clone())),
    };
    let mutating_api: Api<MutatingWebhookConfiguration> = Api::all(client.clone());
    let validating_api: Api<ValidatingWebhookConfiguration> = Api::all(client.clone());
    let crds_api: Api<CustomResourceDefinition> = Api::all(client);

    let lp = ListParams::default();
    let services = services_api.list(&lp).await?.items;
    let secrets = secrets_api.list(&lp).await?.items;
    let mutating = mutating_api.list(&lp).await?.items;
    let validating = validating_api.list(&lp).await?.items;
    let crds = crds_api.list(&lp).await?.items;

    let index = build_index(&mutating, &validating, &crds);
    Ok(summarize(&services, &secrets, &index, settings, pki::unix_now()))
}
