//! Kubernetes-backed object store
//!
//! Cached reads come from a kube-runtime reflector [`Store`] that the
//! controller keeps up to date; everything else goes straight to the API
//! server.

use async_trait::async_trait;
use k8s_openapi::{ClusterResourceScope, NamespaceResourceScope};
use kube::api::{Api, PostParams};
use kube::runtime::reflector::{ObjectRef, Store};
use kube::{Client, Resource, ResourceExt};
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::fmt::Debug;
use std::sync::Arc;

use super::ObjectStore;
use crate::error::{KubeError, Result};

type ApiFor<K> = fn(Client, Option<&str>) -> Api<K>;

/// [`ObjectStore`] over a reflector cache and the Kubernetes API
pub struct KubeStore<K>
where
    K: Resource<DynamicType = ()> + 'static,
{
    client: Client,
    cache: Store<K>,
    api_for: ApiFor<K>,
}

impl<K> KubeStore<K>
where
    K: Resource<DynamicType = (), Scope = NamespaceResourceScope> + Clone + 'static,
{
    /// Store for a namespaced kind
    pub fn namespaced(client: Client, cache: Store<K>) -> Self {
        Self {
            client,
            cache,
            api_for: |client, namespace| match namespace {
                Some(ns) => Api::namespaced(client, ns),
                None => Api::default_namespaced(client),
            },
        }
    }
}

impl<K> KubeStore<K>
where
    K: Resource<DynamicType = (), Scope = ClusterResourceScope> + Clone + 'static,
{
    /// Store for a cluster-scoped kind
    pub fn cluster(client: Client, cache: Store<K>) -> Self {
        Self {
            client,
            cache,
            api_for: |client, _| Api::all(client),
        }
    }
}

impl<K> KubeStore<K>
where
    K: Resource<DynamicType = ()> + Clone + 'static,
{
    fn api(&self, namespace: Option<&str>) -> Api<K> {
        (self.api_for)(self.client.clone(), namespace)
    }

    /// Translate 404/409 responses into structured errors
    fn classify(err: kube::Error, namespace: Option<&str>, name: &str) -> KubeError {
        match &err {
            kube::Error::Api(resp) if resp.code == 404 => KubeError::NotFound {
                kind: K::kind(&()).to_string(),
                namespace: namespace.map(str::to_string),
                name: name.to_string(),
            },
            kube::Error::Api(resp) if resp.code == 409 && resp.reason == "AlreadyExists" => {
                KubeError::AlreadyExists {
                    kind: K::kind(&()).to_string(),
                    namespace: namespace.map(str::to_string),
                    name: name.to_string(),
                }
            }
            _ => KubeError::Api(err),
        }
    }
}

#[async_trait]
impl<K> ObjectStore<K> for KubeStore<K>
where
    K: Resource<DynamicType = ()>
        + Clone
        + Debug
        + Serialize
        + DeserializeOwned
        + Send
        + Sync
        + 'static,
{
    fn cached(&self, namespace: Option<&str>, name: &str) -> Option<Arc<K>> {
        let mut key = ObjectRef::<K>::new(name);
        if let Some(ns) = namespace {
            key = key.within(ns);
        }
        self.cache.get(&key)
    }

    async fn get(&self, namespace: Option<&str>, name: &str) -> Result<K> {
        self.api(namespace)
            .get(name)
            .await
            .map_err(|e| Self::classify(e, namespace, name))
    }

    async fn create(&self, obj: &K) -> Result<K> {
        let namespace = obj.namespace();
        let name = obj.name_any();
        self.api(namespace.as_deref())
            .create(&PostParams::default(), obj)
            .await
            .map_err(|e| Self::classify(e, namespace.as_deref(), &name))
    }

    async fn update(&self, obj: &K) -> Result<K> {
        let namespace = obj.namespace();
        let name = obj.name_any();
        self.api(namespace.as_deref())
            .replace(&name, &PostParams::default(), obj)
            .await
            .map_err(|e| Self::classify(e, namespace.as_deref(), &name))
    }
}
