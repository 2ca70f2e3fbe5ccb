//! Get-or-create-or-patch for any managed kind.

use futures::future::BoxFuture;
use tracing::{debug, info};

use crate::error::{Error, Result, StoreError};
use crate::object::{Managed, ObjectKey};
use crate::store::ObjectStore;
use crate::types::StepOutcome;

/// How an existing object is brought back in line with its derived shape.
pub enum Drift<K> {
    /// Never touch the object once it exists.
    WriteOnce,
    /// Copy the operator-owned fields from the desired object (second
    /// argument) onto the stored one (first argument).
    Patch(fn(&mut K, &K)),
}

/// Typed read through the kind-erased store.
///
/// # Errors
///
/// Store failures, or `KindMismatch` if the store answers with another kind.
pub async fn fetch<K: Managed>(store: &dyn ObjectStore, key: &ObjectKey) -> Result<Option<K>> {
    match store.get(K::KIND, key).await? {
        None => Ok(None),
        Some(object) => K::from_object(object)
            .map(Some)
            .map_err(|other| Error::kind_mismatch(K::KIND, other.kind())),
    }
}

/// Make sure `desired` exists, and repair drift according to `drift`.
///
/// Creating returns [`StepOutcome::Restart`] so the next pass observes the
/// store after the write. A create that loses a race to another writer counts
/// as a create. A patch that changes nothing is not written.
///
/// # Errors
///
/// Any store failure other than `AlreadyExists` on create.
pub async fn ensure<K: Managed>(
    store: &dyn ObjectStore,
    desired: K,
    drift: Drift<K>,
) -> Result<StepOutcome> {
    let key = ObjectKey::of(desired.metadata())
        .ok_or(Error::missing_metadata(K::KIND, "metadata.name or metadata.namespace"))?;

    let Some(existing) = fetch::<K>(store, &key).await? else {
        info!(kind = %K::KIND, object = %key, "Creating object");
        return match store.create(desired.into_object()).await {
            Ok(()) => Ok(StepOutcome::Restart),
            Err(StoreError::AlreadyExists { .. }) => {
                debug!(kind = %K::KIND, object = %key, "Object appeared concurrently");
                Ok(StepOutcome::Restart)
            }
            Err(err) => Err(err.into()),
        };
    };

    let Drift::Patch(patch) = drift else {
        return Ok(StepOutcome::Continue);
    };

    let mut patched = existing.clone();
    patch(&mut patched, &desired);
    if patched == existing {
        debug!(kind = %K::KIND, object = %key, "Object converged");
        return Ok(StepOutcome::Continue);
    }

    info!(kind = %K::KIND, object = %key, "Patching drifted object");
    store.update(patched.into_object()).await?;
    Ok(StepOutcome::Continue)
}

/// Run steps in order, stopping at the first that does not continue.
///
/// Steps are futures that have not been polled yet, so nothing after the
/// stopping point touches the store.
///
/// # Errors
///
/// The first step failure.
pub async fn run_in_order(steps: Vec<BoxFuture<'_, Result<StepOutcome>>>) -> Result<StepOutcome> {
    for step in steps {
        let outcome = step.await?;
        if outcome.is_restart() {
            return Ok(outcome);
        }
    }
    Ok(StepOutcome::Continue)
}

#[cfg(test)]
#[allow(clippy::expect_used, clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::error::StoreResult;
    use crate::object::{ManagedObject, ObjectKind};
    use crate::store::{InMemoryStore, StoreOp};
    use futures::FutureExt;
    use k8s_openapi::api::core::v1::{ConfigMap, Secret};
    use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
    use std::collections::BTreeMap;

    fn config_map(data: &[(&str, &str)]) -> ConfigMap {
        ConfigMap {
            metadata: ObjectMeta {
                namespace: Some("ns".to_string()),
                name: Some("cam1-configmap".to_string()),
                ..Default::default()
            },
            data: Some(
                data.iter()
                    .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
                    .collect::<BTreeMap<_, _>>(),
            ),
            ..Default::default()
        }
    }

    fn replace_data(existing: &mut ConfigMap, desired: &ConfigMap) {
        existing.data.clone_from(&desired.data);
    }

    fn key() -> ObjectKey {
        ObjectKey::new("ns", "cam1-configmap")
    }

    #[tokio::test]
    async fn test_absent_object_is_created_and_restarts() {
        let store = InMemoryStore::new();
        let outcome = ensure(&store, config_map(&[("a", "1")]), Drift::WriteOnce).await;

        assert_eq!(outcome, Ok(StepOutcome::Restart));
        assert!(store.contains(ObjectKind::ConfigMap, &key()).await);
    }

    #[tokio::test]
    async fn test_write_once_leaves_existing_alone() {
        let store = InMemoryStore::new();
        store.put(config_map(&[("a", "external")])).await;

        let outcome = ensure(&store, config_map(&[("a", "1")]), Drift::WriteOnce).await;

        assert_eq!(outcome, Ok(StepOutcome::Continue));
        assert!(store.journal().await.is_empty());
        let stored: ConfigMap = store.get_as(&key()).await.unwrap();
        assert_eq!(stored.data.unwrap().get("a").map(String::as_str), Some("external"));
    }

    #[tokio::test]
    async fn test_patch_repairs_drift_without_restart() {
        let store = InMemoryStore::new();
        store.put(config_map(&[("old", "x")])).await;

        let outcome = ensure(&store, config_map(&[("a", "1")]), Drift::Patch(replace_data)).await;

        assert_eq!(outcome, Ok(StepOutcome::Continue));
        let stored: ConfigMap = store.get_as(&key()).await.unwrap();
        let data = stored.data.unwrap();
        assert_eq!(data.len(), 1);
        assert_eq!(data.get("a").map(String::as_str), Some("1"));
    }

    #[tokio::test]
    async fn test_converged_patch_is_not_written() {
        let store = InMemoryStore::new();
        store.put(config_map(&[("a", "1")])).await;

        let outcome = ensure(&store, config_map(&[("a", "1")]), Drift::Patch(replace_data)).await;

        assert_eq!(outcome, Ok(StepOutcome::Continue));
        assert!(store.journal().await.is_empty());
    }

    #[tokio::test]
    async fn test_lost_create_race_still_restarts() {
        let store = InMemoryStore::new();
        store
            .fail_next(
                StoreOp::Create,
                ObjectKind::ConfigMap,
                StoreError::already_exists(ObjectKind::ConfigMap, key()),
            )
            .await;

        let outcome = ensure(&store, config_map(&[]), Drift::WriteOnce).await;
        assert_eq!(outcome, Ok(StepOutcome::Restart));
    }

    #[tokio::test]
    async fn test_read_failure_propagates() {
        let store = InMemoryStore::new();
        store
            .fail_next(StoreOp::Get, ObjectKind::ConfigMap, StoreError::transient("timeout"))
            .await;

        let outcome = ensure(&store, config_map(&[]), Drift::WriteOnce).await;
        assert_eq!(outcome, Err(Error::Store(StoreError::transient("timeout"))));
        assert!(store.journal().await.is_empty());
    }

    #[tokio::test]
    async fn test_fetch_rejects_wrong_kind() {
        struct Liar;

        #[async_trait::async_trait]
        impl ObjectStore for Liar {
            async fn get(
                &self,
                _kind: ObjectKind,
                _key: &ObjectKey,
            ) -> StoreResult<Option<ManagedObject>> {
                Ok(Some(Secret::default().into_object()))
            }
            async fn create(&self, _object: ManagedObject) -> StoreResult<()> {
                Ok(())
            }
            async fn update(&self, _object: ManagedObject) -> StoreResult<()> {
                Ok(())
            }
        }

        let result = fetch::<ConfigMap>(&Liar, &key()).await;
        assert_eq!(
            result,
            Err(Error::kind_mismatch(ObjectKind::ConfigMap, ObjectKind::Secret))
        );
    }

    #[tokio::test]
    async fn test_run_in_order_stops_at_restart() {
        let store = InMemoryStore::new();
        store.put(config_map(&[("a", "1")])).await;
        let secret = Secret {
            metadata: ObjectMeta {
                namespace: Some("ns".to_string()),
                name: Some("cam1-license-storage".to_string()),
                ..Default::default()
            },
            ..Default::default()
        };
        let second = Secret {
            metadata: ObjectMeta {
                name: Some("other".to_string()),
                ..secret.metadata.clone()
            },
            ..Default::default()
        };

        let outcome = run_in_order(vec![
            ensure(&store, config_map(&[("a", "1")]), Drift::WriteOnce).boxed(),
            ensure(&store, secret, Drift::WriteOnce).boxed(),
            ensure(&store, second, Drift::WriteOnce).boxed(),
        ])
        .await;

        assert_eq!(outcome, Ok(StepOutcome::Restart));
        let license = ObjectKey::new("ns", "cam1-license-storage");
        assert!(store.contains(ObjectKind::Secret, &license).await);
        assert!(!store.contains(ObjectKind::Secret, &ObjectKey::new("ns", "other")).await);
    }
}
