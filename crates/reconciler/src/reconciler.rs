//! Reconciler implementation.

use std::sync::Arc;

use futures::FutureExt;
use mso_api::MediaServer;
use tracing::{Instrument, debug, info, info_span, warn};
use ulid::Ulid;

use crate::desired::Blueprint;
use crate::ensure::{fetch, run_in_order};
use crate::error::{Error, Result};
use crate::object::ObjectKey;
use crate::steps::{ensure_permissions, ensure_workload};
use crate::store::ObjectStore;
use crate::types::ReconcileOutcome;

/// Source of per-pass correlation ids, attached to every log line of a pass.
pub trait CorrelationIds: Send + Sync {
    /// A fresh id.
    fn next_id(&self) -> String;
}

/// ULID-based correlation ids.
#[derive(Debug, Default, Clone, Copy)]
pub struct UlidIds;

impl CorrelationIds for UlidIds {
    fn next_id(&self) -> String {
        Ulid::new().to_string()
    }
}

/// Drives the dependents of one MediaServer toward their derived shape.
///
/// Holds no per-server state: concurrent passes for different servers are
/// independent, and the dispatcher keeps passes for one server sequential.
pub struct Reconciler {
    /// Store of record.
    store: Arc<dyn ObjectStore>,
    /// Correlation id source.
    ids: Arc<dyn CorrelationIds>,
}

impl Reconciler {
    /// Create a new reconciler.
    pub fn new(store: Arc<dyn ObjectStore>, ids: Arc<dyn CorrelationIds>) -> Self {
        Self { store, ids }
    }

    /// Create a reconciler with ULID correlation ids.
    pub fn with_ulid_ids(store: Arc<dyn ObjectStore>) -> Self {
        Self::new(store, Arc::new(UlidIds))
    }

    /// Run one pass for the MediaServer at `key`.
    ///
    /// Stops at the first create and asks to be requeued, so permissions
    /// always exist before the daemon set that uses them is created.
    ///
    /// # Errors
    ///
    /// Store failures and MediaServers that cannot be materialized. The
    /// caller retries later; nothing is retried here.
    pub async fn reconcile(&self, key: &ObjectKey) -> Result<ReconcileOutcome> {
        let span = info_span!(
            "reconcile",
            media_server = %key,
            reconcile_id = %self.ids.next_id()
        );
        self.reconcile_pass(key).instrument(span).await
    }

    async fn reconcile_pass(&self, key: &ObjectKey) -> Result<ReconcileOutcome> {
        info!("Processing MediaServer");

        let server = match fetch::<MediaServer>(self.store.as_ref(), key).await {
            Ok(Some(server)) => server,
            Ok(None) => {
                info!("MediaServer not found, ignoring further work");
                return Ok(ReconcileOutcome::Done);
            }
            Err(e) => {
                warn!(error = %e, "Error getting MediaServer");
                return Err(e);
            }
        };

        if server.metadata.deletion_timestamp.is_some() {
            info!("MediaServer is being deleted, leaving cleanup to owner references");
            return Ok(ReconcileOutcome::Done);
        }

        let blueprint = Blueprint::from_server(&server).inspect_err(|e| {
            warn!(error = %e, "MediaServer cannot be materialized");
        })?;

        let store = self.store.as_ref();
        let outcome = run_in_order(vec![
            ensure_permissions(store, &blueprint).boxed(),
            ensure_workload(store, &blueprint).boxed(),
        ])
        .await
        .inspect_err(|e| warn!(error = %e, "Reconciliation failed"))?;

        let outcome = ReconcileOutcome::from(outcome);
        match outcome {
            ReconcileOutcome::Done => info!("MediaServer converged"),
            ReconcileOutcome::Requeue => debug!("Created an object, requeueing"),
        }
        Ok(outcome)
    }

    /// Get the store.
    pub fn store(&self) -> &Arc<dyn ObjectStore> {
        &self.store
    }
}

/// Builder for Reconciler.
pub struct ReconcilerBuilder {
    store: Option<Arc<dyn ObjectStore>>,
    ids: Option<Arc<dyn CorrelationIds>>,
}

impl ReconcilerBuilder {
    /// Create a new builder.
    pub fn new() -> Self {
        Self {
            store: None,
            ids: None,
        }
    }

    /// Set the store.
    pub fn with_store(mut self, store: Arc<dyn ObjectStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// Set a custom correlation id source.
    pub fn with_ids(mut self, ids: Arc<dyn CorrelationIds>) -> Self {
        self.ids = Some(ids);
        self
    }

    /// Build the reconciler.
    ///
    /// # Errors
    ///
    /// `InvalidConfig` if no store was set.
    pub fn build(self) -> Result<Reconciler> {
        let store = self
            .store
            .ok_or_else(|| Error::invalid_config("Object store is required"))?;

        let ids = self.ids.unwrap_or_else(|| Arc::new(UlidIds));

        Ok(Reconciler::new(store, ids))
    }
}

impl Default for ReconcilerBuilder {
    fn default() -> Self {
        Self::new()
    }
}
