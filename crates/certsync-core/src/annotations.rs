//! Service annotation parsing
//!
//! Management is opt-in: a Service is only handled when it carries the
//! secret-name annotation. Extra DNS names are supplied through any number of
//! annotations sharing the DNS-name prefix, e.g.
//!
//! ```yaml
//! metadata:
//!   annotations:
//!     certsync.io/secret-name: webhook-tls
//!     certsync.io/dns-name: webhook.example.com
//!     certsync.io/dns-name-internal: webhook.internal
//! ```

use std::collections::{BTreeMap, BTreeSet};

use crate::identity::ServiceIdentity;

/// Default annotation naming the Secret that holds the keypair
pub const SECRET_NAME: &str = "certsync.io/secret-name";

/// Default prefix for annotations that add a DNS SAN
pub const DNS_NAME_PREFIX: &str = "certsync.io/dns-name";

/// Cluster DNS suffix appended to the fully qualified service name
pub const CLUSTER_DOMAIN: &str = "cluster.local";

/// Get the managed secret name, if the service opted in
pub fn secret_name<'a>(annotations: &'a BTreeMap<String, String>, key: &str) -> Option<&'a str> {
    annotations
        .get(key)
        .map(|s| s.trim())
        .filter(|s| !s.is_empty())
}

/// Values of every annotation whose key starts with `prefix`
pub fn extra_dns_names<'a>(
    annotations: &'a BTreeMap<String, String>,
    prefix: &'a str,
) -> impl Iterator<Item = &'a str> + 'a {
    annotations
        .iter()
        .filter(move |(k, _)| k.starts_with(prefix))
        .map(|(_, v)| v.trim())
        .filter(|v| !v.is_empty())
}

/// Compute the DNS names a service's certificate must carry
///
/// The canonical in-cluster names are unioned with the extra annotation
/// values, deduplicated and sorted.
pub fn dns_names(
    service: &ServiceIdentity,
    annotations: &BTreeMap<String, String>,
    prefix: &str,
) -> Vec<String> {
    let ServiceIdentity { namespace, name } = service;
    let mut names: BTreeSet<String> = BTreeSet::new();
    names.insert(format!("{name}.{namespace}"));
    names.insert(format!("{name}.{namespace}.svc"));
    names.insert(format!("{name}.{namespace}.svc.{CLUSTER_DOMAIN}"));
    names.extend(extra_dns_names(annotations, prefix).map(str::to_string));
    names.into_iter().collect()
}
