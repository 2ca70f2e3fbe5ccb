//! [`ObjectStore`] backed by the Kubernetes API server.

use std::fmt::Debug;

use async_trait::async_trait;
use k8s_openapi::NamespaceResourceScope;
use k8s_openapi::api::apps::v1::DaemonSet;
use k8s_openapi::api::core::v1::{ConfigMap, Secret, ServiceAccount};
use k8s_openapi::api::rbac::v1::{Role, RoleBinding};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use kube::api::{Api, PostParams};
use kube::{Client, Resource};
use mso_api::MediaServer;
use mso_reconciler::{
    Managed, ManagedObject, ObjectKey, ObjectKind, ObjectStore, StoreError, StoreResult,
};
use serde::Serialize;
use serde::de::DeserializeOwned;

/// Kinds the store can address through a namespaced [`Api`].
trait NamespacedKind:
    Managed
    + Resource<DynamicType = (), Scope = NamespaceResourceScope>
    + DeserializeOwned
    + Serialize
    + Debug
{
}

impl<K> NamespacedKind for K where
    K: Managed
        + Resource<DynamicType = (), Scope = NamespaceResourceScope>
        + DeserializeOwned
        + Serialize
        + Debug
{
}

/// Reads and writes through the API server.
///
/// Updates are full replaces carrying the `resourceVersion` they were read
/// at, so a concurrent writer surfaces as [`StoreError::Conflict`].
#[derive(Clone)]
pub struct KubeStore {
    client: Client,
}

impl KubeStore {
    pub const fn new(client: Client) -> Self {
        Self { client }
    }

    fn api<K: NamespacedKind>(&self, namespace: &str) -> Api<K> {
        Api::namespaced(self.client.clone(), namespace)
    }

    async fn get_as<K: NamespacedKind>(
        &self,
        key: &ObjectKey,
    ) -> StoreResult<Option<ManagedObject>> {
        self.api::<K>(&key.namespace)
            .get_opt(&key.name)
            .await
            .map(|found| found.map(Managed::into_object))
            .map_err(|e| classify(K::KIND, key, e))
    }

    async fn create_as<K: NamespacedKind>(&self, object: K) -> StoreResult<()> {
        let key = require_key(K::KIND, object.metadata())?;
        self.api::<K>(&key.namespace)
            .create(&PostParams::default(), &object)
            .await
            .map(|_| ())
            .map_err(|e| classify(K::KIND, &key, e))
    }

    async fn replace_as<K: NamespacedKind>(&self, object: K) -> StoreResult<()> {
        let key = require_key(K::KIND, object.metadata())?;
        self.api::<K>(&key.namespace)
            .replace(&key.name, &PostParams::default(), &object)
            .await
            .map(|_| ())
            .map_err(|e| classify(K::KIND, &key, e))
    }
}

#[async_trait]
impl ObjectStore for KubeStore {
    async fn get(&self, kind: ObjectKind, key: &ObjectKey) -> StoreResult<Option<ManagedObject>> {
        match kind {
            ObjectKind::MediaServer => self.get_as::<MediaServer>(key).await,
            ObjectKind::ServiceAccount => self.get_as::<ServiceAccount>(key).await,
            ObjectKind::Role => self.get_as::<Role>(key).await,
            ObjectKind::RoleBinding => self.get_as::<RoleBinding>(key).await,
            ObjectKind::Secret => self.get_as::<Secret>(key).await,
            ObjectKind::ConfigMap => self.get_as::<ConfigMap>(key).await,
            ObjectKind::DaemonSet => self.get_as::<DaemonSet>(key).await,
        }
    }

    async fn create(&self, object: ManagedObject) -> StoreResult<()> {
        match object {
            ManagedObject::MediaServer(o) => self.create_as(*o).await,
            ManagedObject::ServiceAccount(o) => self.create_as(o).await,
            ManagedObject::Role(o) => self.create_as(o).await,
            ManagedObject::RoleBinding(o) => self.create_as(o).await,
            ManagedObject::Secret(o) => self.create_as(o).await,
            ManagedObject::ConfigMap(o) => self.create_as(o).await,
            ManagedObject::DaemonSet(o) => self.create_as(*o).await,
        }
    }

    async fn update(&self, object: ManagedObject) -> StoreResult<()> {
        match object {
            ManagedObject::MediaServer(o) => self.replace_as(*o).await,
            ManagedObject::ServiceAccount(o) => self.replace_as(o).await,
            ManagedObject::Role(o) => self.replace_as(o).await,
            ManagedObject::RoleBinding(o) => self.replace_as(o).await,
            ManagedObject::Secret(o) => self.replace_as(o).await,
            ManagedObject::ConfigMap(o) => self.replace_as(o).await,
            ManagedObject::DaemonSet(o) => self.replace_as(*o).await,
        }
    }
}

fn require_key(kind: ObjectKind, meta: &ObjectMeta) -> StoreResult<ObjectKey> {
    ObjectKey::of(meta).ok_or_else(|| {
        StoreError::invalid(
            kind,
            ObjectKey::new(
                meta.namespace.clone().unwrap_or_default(),
                meta.name.clone().unwrap_or_default(),
            ),
            "metadata.name and metadata.namespace are required",
        )
    })
}

/// Map an API error onto the store taxonomy.
fn classify(kind: ObjectKind, key: &ObjectKey, error: kube::Error) -> StoreError {
    match error {
        kube::Error::Api(response) => match response.code {
            404 => StoreError::not_found(kind, key.clone()),
            409 if response.reason == "AlreadyExists" => {
                StoreError::already_exists(kind, key.clone())
            }
            409 => StoreError::conflict(kind, key.clone(), response.message),
            400 | 422 => StoreError::invalid(kind, key.clone(), response.message),
            code => StoreError::transient(format!(
                "{code} {}: {}",
                response.reason, response.message
            )),
        },
        other => StoreError::transient(other.to_string()),
    }
}
