//! Mock object store for testing
//!
//! Keeps objects in memory, useful for unit tests without requiring a
//! Kubernetes cluster. The cache can be made to lag behind writes to
//! reproduce races against a stale informer.

use async_trait::async_trait;
use kube::{Resource, ResourceExt};
use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use super::ObjectStore;
use crate::error::{KubeError, Result};

type Key = (Option<String>, String);

/// In-memory object store for testing
pub struct MockObjectStore<K> {
    /// Source of truth: (namespace, name) -> object
    store: Arc<RwLock<HashMap<Key, K>>>,
    /// What `cached()` sees; equals `store` unless the cache is lagging
    cache: Arc<RwLock<HashMap<Key, Arc<K>>>>,
    /// When set, writes do not reach the cache
    cache_lag: Arc<RwLock<bool>>,
    /// When set, create and update fail with this message
    write_failure: Arc<RwLock<Option<String>>>,
    /// Track operation counts for assertions
    operations: Arc<RwLock<OperationCounts>>,
}

/// Counts of operations performed for testing assertions
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct OperationCounts {
    pub cache_reads: usize,
    pub gets: usize,
    /// Successful creates
    pub creates: usize,
    /// Creates rejected because the name was taken
    pub create_conflicts: usize,
    pub updates: usize,
}

impl OperationCounts {
    /// Successful writes of any kind
    pub fn writes(&self) -> usize {
        self.creates + self.updates
    }
}

fn key_of<K: Resource>(obj: &K) -> Key {
    (obj.namespace(), obj.name_any())
}

impl<K> MockObjectStore<K>
where
    K: Resource<DynamicType = ()> + Clone,
{
    /// Create a new empty mock store
    pub fn new() -> Self {
        Self {
            store: Arc::new(RwLock::new(HashMap::new())),
            cache: Arc::new(RwLock::new(HashMap::new())),
            cache_lag: Arc::new(RwLock::new(false)),
            write_failure: Arc::new(RwLock::new(None)),
            operations: Arc::new(RwLock::new(OperationCounts::default())),
        }
    }

    /// Create with pre-populated objects (visible in the cache too)
    pub fn with_objects(objects: impl IntoIterator<Item = K>) -> Self {
        let mock = Self::new();
        for obj in objects {
            mock.insert(obj);
        }
        mock
    }

    /// Put an object in both the store and the cache, bypassing counters
    pub fn insert(&self, obj: K) {
        let key = key_of(&obj);
        self.cache
            .write()
            .unwrap()
            .insert(key.clone(), Arc::new(obj.clone()));
        self.store.write().unwrap().insert(key, obj);
    }

    /// Stop propagating writes to the cache
    pub fn set_cache_lag(&self, lag: bool) {
        *self.cache_lag.write().unwrap() = lag;
    }

    /// Make every following create/update fail
    pub fn fail_writes(&self, message: impl Into<String>) {
        *self.write_failure.write().unwrap() = Some(message.into());
    }

    /// Fetch an object from the source of truth without counting it
    pub fn object(&self, namespace: Option<&str>, name: &str) -> Option<K> {
        let key = (namespace.map(str::to_string), name.to_string());
        self.store.read().unwrap().get(&key).cloned()
    }

    /// Number of stored objects
    pub fn len(&self) -> usize {
        self.store.read().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Get operation counts for assertions
    pub fn operation_counts(&self) -> OperationCounts {
        self.operations.read().unwrap().clone()
    }

    /// Reset operation counts
    pub fn reset_counts(&self) {
        *self.operations.write().unwrap() = OperationCounts::default();
    }

    fn check_writable(&self) -> Result<()> {
        match self.write_failure.read().unwrap().as_ref() {
            Some(message) => Err(KubeError::InvalidObject(message.clone())),
            None => Ok(()),
        }
    }

    fn write_through(&self, key: Key, obj: &K) {
        if !*self.cache_lag.read().unwrap() {
            self.cache
                .write()
                .unwrap()
                .insert(key, Arc::new(obj.clone()));
        }
    }
}

impl<K> Default for MockObjectStore<K>
where
    K: Resource<DynamicType = ()> + Clone,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<K> Clone for MockObjectStore<K> {
    fn clone(&self) -> Self {
        Self {
            store: self.store.clone(),
            cache: self.cache.clone(),
            cache_lag: self.cache_lag.clone(),
            write_failure: self.write_failure.clone(),
            operations: self.operations.clone(),
        }
    }
}

#[async_trait]
impl<K> ObjectStore<K> for MockObjectStore<K>
where
    K: Resource<DynamicType = ()> + Clone + Send + Sync + 'static,
{
    fn cached(&self, namespace: Option<&str>, name: &str) -> Option<Arc<K>> {
        self.operations.write().unwrap().cache_reads += 1;

        let key = (namespace.map(str::to_string), name.to_string());
        self.cache.read().unwrap().get(&key).cloned()
    }

    async fn get(&self, namespace: Option<&str>, name: &str) -> Result<K> {
        self.operations.write().unwrap().gets += 1;

        self.object(namespace, name)
            .ok_or_else(|| KubeError::NotFound {
                kind: K::kind(&()).to_string(),
                namespace: namespace.map(str::to_string),
                name: name.to_string(),
            })
    }

    async fn create(&self, obj: &K) -> Result<K> {
        self.check_writable()?;
        let key = key_of(obj);

        {
            let mut store = self.store.write().unwrap();
            if store.contains_key(&key) {
                self.operations.write().unwrap().create_conflicts += 1;
                return Err(KubeError::AlreadyExists {
                    kind: K::kind(&()).to_string(),
                    namespace: key.0.clone(),
                    name: key.1.clone(),
                });
            }
            store.insert(key.clone(), obj.clone());
        }

        self.operations.write().unwrap().creates += 1;
        self.write_through(key, obj);
        Ok(obj.clone())
    }

    async fn update(&self, obj: &K) -> Result<K> {
        self.check_writable()?;
        let key = key_of(obj);

        {
            let mut store = self.store.write().unwrap();
            if !store.contains_key(&key) {
                return Err(KubeError::NotFound {
                    kind: K::kind(&()).to_string(),
                    namespace: key.0.clone(),
                    name: key.1.clone(),
                });
            }
            store.insert(key.clone(), obj.clone());
        }

        self.operations.write().unwrap().updates += 1;
        self.write_through(key, obj);
        Ok(obj.clone())
    }
}
