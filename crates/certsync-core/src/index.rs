//! Secondary index from services to the objects that reference them
//!
//! Each dependent kind has its own table keyed by `"{namespace}/{name}"`.
//! Whenever a dependent object is observed its entries are recomputed from
//! scratch: the keys it referenced before are dropped and the keys it
//! references now are inserted.

use serde::Serialize;
use std::collections::{BTreeSet, HashMap};
use std::fmt;
use std::sync::RwLock;

/// Object kinds whose CA bundles point at services
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub enum DependentKind {
    MutatingWebhookConfiguration,
    ValidatingWebhookConfiguration,
    CustomResourceDefinition,
}

impl DependentKind {
    pub const ALL: [DependentKind; 3] = [
        DependentKind::MutatingWebhookConfiguration,
        DependentKind::ValidatingWebhookConfiguration,
        DependentKind::CustomResourceDefinition,
    ];

    fn slot(self) -> usize {
        match self {
            DependentKind::MutatingWebhookConfiguration => 0,
            DependentKind::ValidatingWebhookConfiguration => 1,
            DependentKind::CustomResourceDefinition => 2,
        }
    }
}

impl fmt::Display for DependentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kind = match self {
            DependentKind::MutatingWebhookConfiguration => "MutatingWebhookConfiguration",
            DependentKind::ValidatingWebhookConfiguration => "ValidatingWebhookConfiguration",
            DependentKind::CustomResourceDefinition => "CustomResourceDefinition",
        };
        f.write_str(kind)
    }
}

#[derive(Debug, Default)]
struct Table {
    /// service key -> dependent object names
    by_service: HashMap<String, BTreeSet<String>>,
    /// dependent object name -> service keys it referenced when last observed
    by_object: HashMap<String, BTreeSet<String>>,
}

impl Table {
    fn remove_object(&mut self, object: &str) {
        let Some(keys) = self.by_object.remove(object) else {
            return;
        };
        for key in keys {
            if let Some(names) = self.by_service.get_mut(&key) {
                names.remove(object);
                if names.is_empty() {
                    self.by_service.remove(&key);
                }
            }
        }
    }
}

/// Service → dependents lookup, one table per [`DependentKind`]
#[derive(Debug, Default)]
pub struct ServiceIndex {
    tables: [RwLock<Table>; 3],
}

impl ServiceIndex {
    pub fn new() -> Self {
        Self::default()
    }

    fn table(&self, kind: DependentKind) -> &RwLock<Table> {
        &self.tables[kind.slot()]
    }

    /// Replace the entries of `object` with `service_keys`
    pub fn observe<I, S>(&self, kind: DependentKind, object: &str, service_keys: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let keys: BTreeSet<String> = service_keys.into_iter().map(Into::into).collect();
        let mut table = self.table(kind).write().unwrap_or_else(|e| e.into_inner());

        table.remove_object(object);
        if keys.is_empty() {
            return;
        }
        for key in &keys {
            table
                .by_service
                .entry(key.clone())
                .or_default()
                .insert(object.to_string());
        }
        table.by_object.insert(object.to_string(), keys);
    }

    /// Drop every entry of a deleted object
    pub fn forget(&self, kind: DependentKind, object: &str) {
        let mut table = self.table(kind).write().unwrap_or_else(|e| e.into_inner());
        table.remove_object(object);
    }

    /// Drop every entry for `kind`, ahead of a relist
    pub fn clear(&self, kind: DependentKind) {
        let mut table = self.table(kind).write().unwrap_or_else(|e| e.into_inner());
        *table = Table::default();
    }

    /// Names of `kind` objects that reference `service_key`, sorted
    pub fn dependents(&self, kind: DependentKind, service_key: &str) -> Vec<String> {
        let table = self.table(kind).read().unwrap_or_else(|e| e.into_inner());
        table
            .by_service
            .get(service_key)
            .map(|names| names.iter().cloned().collect())
            .unwrap_or_default()
    }

    #[cfg(test)]
    fn object_count(&self, kind: DependentKind) -> usize {
        let table = self.table(kind).read().unwrap_or_else(|e| e.into_inner());
        table.by_object.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MUT: DependentKind = DependentKind::MutatingWebhookConfiguration;
    const VAL: DependentKind = DependentKind::ValidatingWebhookConfiguration;
    const CRD: DependentKind = DependentKind::CustomResourceDefinition;

    #[test]
    fn test_observe_and_lookup() {
        let index = ServiceIndex::new();
        index.observe(MUT, "hooks-a", ["ns/svc"]);
        index.observe(MUT, "hooks-b", ["ns/svc", "ns/other"]);

        assert_eq!(index.dependents(MUT, "ns/svc"), vec!["hooks-a", "hooks-b"]);
        assert_eq!(index.dependents(MUT, "ns/other"), vec!["hooks-b"]);
        assert!(index.dependents(MUT, "ns/missing").is_empty());
    }

    #[test]
    fn test_tables_are_independent() {
        let index = ServiceIndex::new();
        index.observe(MUT, "same-name", ["ns/svc"]);

        assert!(index.dependents(VAL, "ns/svc").is_empty());
        assert!(index.dependents(CRD, "ns/svc").is_empty());
    }

    #[test]
    fn test_reobserve_replaces_previous_keys() {
        let index = ServiceIndex::new();
        index.observe(VAL, "hooks", ["ns/old"]);
        index.observe(VAL, "hooks", ["ns/new"]);

        assert!(index.dependents(VAL, "ns/old").is_empty());
        assert_eq!(index.dependents(VAL, "ns/new"), vec!["hooks"]);
        assert_eq!(index.object_count(VAL), 1);
    }

    #[test]
    fn test_observe_without_keys_clears() {
        let index = ServiceIndex::new();
        index.observe(CRD, "widgets.example.com", ["ns/svc"]);
        index.observe(CRD, "widgets.example.com", Vec::<String>::new());

        assert!(index.dependents(CRD, "ns/svc").is_empty());
        assert_eq!(index.object_count(CRD), 0);
    }

    #[test]
    fn test_duplicate_keys_collapse() {
        let index = ServiceIndex::new();
        index.observe(MUT, "hooks", ["ns/svc", "ns/svc"]);
        assert_eq!(index.dependents(MUT, "ns/svc"), vec!["hooks"]);
    }

    #[test]
    fn test_forget() {
        let index = ServiceIndex::new();
        index.observe(MUT, "hooks", ["ns/svc"]);
        index.forget(MUT, "hooks");
        index.forget(MUT, "never-seen");

        assert!(index.dependents(MUT, "ns/svc").is_empty());
    }

    #[test]
    fn test_clear_only_touches_one_kind() {
        let index = ServiceIndex::new();
        index.observe(MUT, "hooks", ["ns/svc"]);
        index.observe(VAL, "hooks", ["ns/svc"]);
        index.clear(MUT);

        assert_eq!(index.object_count(MUT), 0);
        assert_eq!(index.dependents(VAL, "ns/svc"), vec!["hooks"]);
    }
}
