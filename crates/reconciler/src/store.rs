//! Object store trait and implementations.
//!
//! The store of record lives outside the operator (normally the Kubernetes
//! API server). Reads and writes are independent round trips: nothing holds
//! a lock between a `get` and the `update` that follows it. An update carries
//! the `resourceVersion` it was read at, so a concurrent writer in that window
//! surfaces as [`StoreError::Conflict`] rather than a lost write. Stores that
//! ignore resource versions make the update last-writer-wins.

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::error::{StoreError, StoreResult};
use crate::object::{Managed, ManagedObject, ObjectKey, ObjectKind};

/// Trait for object storage backends.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Read an object. Absence is `Ok(None)`, never an error.
    async fn get(&self, kind: ObjectKind, key: &ObjectKey) -> StoreResult<Option<ManagedObject>>;

    /// Create an object. Fails with `AlreadyExists` if the key is taken.
    async fn create(&self, object: ManagedObject) -> StoreResult<()>;

    /// Replace an existing object.
    async fn update(&self, object: ManagedObject) -> StoreResult<()>;
}

/// Store operation, used to target injected failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreOp {
    Get,
    Create,
    Update,
}

/// A write recorded by [`InMemoryStore`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Mutation {
    pub op: StoreOp,
    pub kind: ObjectKind,
    pub key: ObjectKey,
}

impl Mutation {
    fn new(op: StoreOp, kind: ObjectKind, key: ObjectKey) -> Self {
        Self { op, kind, key }
    }
}

type Slot = (ObjectKind, ObjectKey);

#[derive(Default)]
struct Inner {
    objects: BTreeMap<Slot, ManagedObject>,
    journal: Vec<Mutation>,
    failures: Vec<(StoreOp, ObjectKind, StoreError)>,
    version: u64,
}

impl Inner {
    fn next_version(&mut self) -> String {
        self.version = self.version.saturating_add(1);
        self.version.to_string()
    }

    fn take_failure(&mut self, op: StoreOp, kind: ObjectKind) -> Option<StoreError> {
        let pos = self
            .failures
            .iter()
            .position(|(o, k, _)| *o == op && *k == kind)?;
        Some(self.failures.remove(pos).2)
    }
}

fn require_key(object: &ManagedObject) -> StoreResult<ObjectKey> {
    object.key().ok_or_else(|| {
        StoreError::invalid(
            object.kind(),
            ObjectKey::new("", ""),
            "metadata.name and metadata.namespace are required",
        )
    })
}

/// In-memory object store.
///
/// Behaves like the API server where it matters to the reconciler: uids and
/// resource versions are assigned on write, creates collide on existing keys,
/// and updates carrying a stale resource version are rejected. Every write
/// through the [`ObjectStore`] interface is journaled.
#[derive(Default)]
pub struct InMemoryStore {
    inner: RwLock<Inner>,
}

impl InMemoryStore {
    /// Create a new in-memory store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a new in-memory store wrapped in an Arc.
    pub fn new_arc() -> Arc<Self> {
        Arc::new(Self::new())
    }

    /// Insert or overwrite an object as an external actor would.
    ///
    /// Not journaled. Assigns a uid if the object has none.
    pub async fn put(&self, object: impl Managed) {
        let mut object = object.into_object();
        let Some(key) = object.key() else {
            return;
        };
        let mut inner = self.inner.write().await;
        let version = inner.next_version();
        let meta = object.meta_mut();
        if meta.uid.is_none() {
            meta.uid = Some(format!("uid-{version}"));
        }
        meta.resource_version = Some(version);
        inner.objects.insert((object.kind(), key), object);
    }

    /// Remove an object as an external actor would. Not journaled.
    pub async fn remove(&self, kind: ObjectKind, key: &ObjectKey) -> Option<ManagedObject> {
        let mut inner = self.inner.write().await;
        inner.objects.remove(&(kind, key.clone()))
    }

    /// Typed read for inspection.
    pub async fn get_as<K: Managed>(&self, key: &ObjectKey) -> Option<K> {
        let inner = self.inner.read().await;
        inner
            .objects
            .get(&(K::KIND, key.clone()))
            .cloned()
            .and_then(|o| K::from_object(o).ok())
    }

    /// Whether an object exists.
    pub async fn contains(&self, kind: ObjectKind, key: &ObjectKey) -> bool {
        let inner = self.inner.read().await;
        inner.objects.contains_key(&(kind, key.clone()))
    }

    /// Number of stored objects.
    pub async fn len(&self) -> usize {
        self.inner.read().await.objects.len()
    }

    /// Check if the store is empty.
    pub async fn is_empty(&self) -> bool {
        self.inner.read().await.objects.is_empty()
    }

    /// Writes performed through the store interface, oldest first.
    pub async fn journal(&self) -> Vec<Mutation> {
        self.inner.read().await.journal.clone()
    }

    /// Forget recorded writes.
    pub async fn clear_journal(&self) {
        self.inner.write().await.journal.clear();
    }

    /// Make the next `op` on `kind` fail with `error`.
    pub async fn fail_next(&self, op: StoreOp, kind: ObjectKind, error: StoreError) {
        self.inner.write().await.failures.push((op, kind, error));
    }
}

#[async_trait]
impl ObjectStore for InMemoryStore {
    async fn get(&self, kind: ObjectKind, key: &ObjectKey) -> StoreResult<Option<ManagedObject>> {
        let mut inner = self.inner.write().await;
        if let Some(err) = inner.take_failure(StoreOp::Get, kind) {
            return Err(err);
        }
        Ok(inner.objects.get(&(kind, key.clone())).cloned())
    }

    async fn create(&self, mut object: ManagedObject) -> StoreResult<()> {
        let kind = object.kind();
        let key = require_key(&object)?;

        let mut inner = self.inner.write().await;
        if let Some(err) = inner.take_failure(StoreOp::Create, kind) {
            return Err(err);
        }
        let slot = (kind, key.clone());
        if inner.objects.contains_key(&slot) {
            return Err(StoreError::already_exists(kind, key));
        }

        let version = inner.next_version();
        let meta = object.meta_mut();
        meta.uid = Some(format!("uid-{version}"));
        meta.resource_version = Some(version);

        inner.objects.insert(slot, object);
        inner.journal.push(Mutation::new(StoreOp::Create, kind, key));
        Ok(())
    }

    async fn update(&self, mut object: ManagedObject) -> StoreResult<()> {
        let kind = object.kind();
        let key = require_key(&object)?;

        let mut inner = self.inner.write().await;
        if let Some(err) = inner.take_failure(StoreOp::Update, kind) {
            return Err(err);
        }
        let slot = (kind, key.clone());
        let (uid, stored_version) = match inner.objects.get(&slot) {
            Some(current) => (
                current.meta().uid.clone(),
                current.meta().resource_version.clone(),
            ),
            None => return Err(StoreError::not_found(kind, key)),
        };

        let offered = object.meta().resource_version.clone();
        if offered.is_some() && offered != stored_version {
            return Err(StoreError::conflict(
                kind,
                key,
                format!(
                    "resourceVersion {} is stale, current is {}",
                    offered.unwrap_or_default(),
                    stored_version.unwrap_or_default()
                ),
            ));
        }

        let version = inner.next_version();
        let meta = object.meta_mut();
        meta.uid = uid;
        meta.resource_version = Some(version);

        inner.objects.insert(slot, object);
        inner.journal.push(Mutation::new(StoreOp::Update, kind, key));
        Ok(())
    }
}

/// A wrapper that adds tracing to an object store.
pub struct TracingStore<S: ObjectStore> {
    inner: S,
}

impl<S: ObjectStore> TracingStore<S> {
    /// Create a new tracing store.
    pub fn new(inner: S) -> Self {
        Self { inner }
    }
}

#[async_trait]
impl<S: ObjectStore> ObjectStore for TracingStore<S> {
    async fn get(&self, kind: ObjectKind, key: &ObjectKey) -> StoreResult<Option<ManagedObject>> {
        tracing::trace!(kind = %kind, object = %key, "Reading object");
        let result = self.inner.get(kind, key).await;
        if let Ok(None) = result {
            tracing::debug!(kind = %kind, object = %key, "Object not found");
        }
        result
    }

    async fn create(&self, object: ManagedObject) -> StoreResult<()> {
        let kind = object.kind();
        let key = object.key();
        tracing::debug!(kind = %kind, object = ?key, "Creating object");
        let result = self.inner.create(object).await;
        if let Err(ref err) = result {
            tracing::debug!(kind = %kind, object = ?key, error = %err, "Create failed");
        }
        result
    }

    async fn update(&self, object: ManagedObject) -> StoreResult<()> {
        let kind = object.kind();
        let key = object.key();
        tracing::debug!(kind = %kind, object = ?key, "Updating object");
        let result = self.inner.update(object).await;
        if let Err(ref err) = result {
            tracing::debug!(kind = %kind, object = ?key, error = %err, "Update failed");
        }
        result
    }
}

#[cfg(test)]
#[allow(clippy::expect_used, clippy::unwrap_used)]
mod tests {
    use super::*;
    use k8s_openapi::api::core::v1::ConfigMap;
    use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;

    fn config_map(data: &str) -> ConfigMap {
        ConfigMap {
            metadata: ObjectMeta {
                namespace: Some("ns".to_string()),
                name: Some("cam1-configmap".to_string()),
                ..Default::default()
            },
            data: Some([("k8s.conf".to_string(), data.to_string())].into()),
            ..Default::default()
        }
    }

    fn key() -> ObjectKey {
        ObjectKey::new("ns", "cam1-configmap")
    }

    #[tokio::test]
    async fn test_create_and_get() {
        let store = InMemoryStore::new();
        store.create(config_map("a").into_object()).await.unwrap();

        let object = store.get(ObjectKind::ConfigMap, &key()).await.unwrap();
        let meta = object.as_ref().map(ManagedObject::meta);
        assert!(meta.and_then(|m| m.uid.as_ref()).is_some());
        assert!(meta.and_then(|m| m.resource_version.as_ref()).is_some());
    }

    #[tokio::test]
    async fn test_get_missing_is_none() {
        let store = InMemoryStore::new();
        let object = store.get(ObjectKind::ConfigMap, &key()).await;
        assert_eq!(object, Ok(None));
    }

    #[tokio::test]
    async fn test_create_twice_collides() {
        let store = InMemoryStore::new();
        store.create(config_map("a").into_object()).await.unwrap();

        let result = store.create(config_map("b").into_object()).await;
        assert_eq!(
            result,
            Err(StoreError::already_exists(ObjectKind::ConfigMap, key()))
        );
    }

    #[tokio::test]
    async fn test_update_missing_is_not_found() {
        let store = InMemoryStore::new();
        let result = store.update(config_map("a").into_object()).await;
        assert_eq!(result, Err(StoreError::not_found(ObjectKind::ConfigMap, key())));
    }

    #[tokio::test]
    async fn test_stale_update_conflicts() {
        let store = InMemoryStore::new();
        store.create(config_map("a").into_object()).await.unwrap();
        let read: ConfigMap = store.get_as(&key()).await.unwrap();

        // Someone else writes in between.
        store.update(read.clone().into_object()).await.unwrap();

        let result = store.update(read.into_object()).await;
        assert!(matches!(result, Err(StoreError::Conflict { .. })));
    }

    #[tokio::test]
    async fn test_update_keeps_uid() {
        let store = InMemoryStore::new();
        store.create(config_map("a").into_object()).await.unwrap();
        let before: ConfigMap = store.get_as(&key()).await.unwrap();

        let mut changed = before.clone();
        changed.data = Some([("k8s.conf".to_string(), "b".to_string())].into());
        store.update(changed.into_object()).await.unwrap();

        let after: ConfigMap = store.get_as(&key()).await.unwrap();
        assert_eq!(after.metadata.uid, before.metadata.uid);
        assert_ne!(after.metadata.resource_version, before.metadata.resource_version);
    }

    #[tokio::test]
    async fn test_journal_records_writes_only() {
        let store = InMemoryStore::new();
        store.put(config_map("seed")).await;
        store.get(ObjectKind::ConfigMap, &key()).await.unwrap();
        let read: ConfigMap = store.get_as(&key()).await.unwrap();
        store.update(read.into_object()).await.unwrap();

        let journal = store.journal().await;
        assert_eq!(
            journal,
            vec![Mutation::new(StoreOp::Update, ObjectKind::ConfigMap, key())]
        );
    }

    #[tokio::test]
    async fn test_injected_failure_fires_once() {
        let store = InMemoryStore::new();
        store
            .fail_next(StoreOp::Get, ObjectKind::ConfigMap, StoreError::transient("timeout"))
            .await;

        let first = store.get(ObjectKind::ConfigMap, &key()).await;
        assert_eq!(first, Err(StoreError::transient("timeout")));

        let second = store.get(ObjectKind::ConfigMap, &key()).await;
        assert_eq!(second, Ok(None));
    }

    #[tokio::test]
    async fn test_injected_failure_targets_kind() {
        let store = InMemoryStore::new();
        store
            .fail_next(StoreOp::Get, ObjectKind::Secret, StoreError::transient("timeout"))
            .await;

        let result = store.get(ObjectKind::ConfigMap, &key()).await;
        assert_eq!(result, Ok(None));
    }

    #[tokio::test]
    async fn test_tracing_store_delegates() {
        let store = TracingStore::new(InMemoryStore::new());
        store.create(config_map("a").into_object()).await.unwrap();

        let object = store.get(ObjectKind::ConfigMap, &key()).await.unwrap();
        assert_eq!(object.map(|o| o.kind()), Some(ObjectKind::ConfigMap));
    }
}
