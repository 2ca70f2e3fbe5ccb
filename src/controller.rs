//! Controller wiring: watches, requeue policy and shutdown.

use std::sync::Arc;
use std::time::Duration;

use futures::StreamExt;
use k8s_openapi::api::apps::v1::DaemonSet;
use k8s_openapi::api::core::v1::ConfigMap;
use kube::Client;
use kube::api::{Api, ListParams};
use kube::runtime::controller::{Action, Controller};
use kube::runtime::watcher;
use mso_api::MediaServer;
use mso_reconciler::{
    Error, ObjectKey, ObjectKind, ObjectStore, ReconcileOutcome, Reconciler, TracingStore,
};
use tracing::{debug, info, warn};

use crate::kube_store::KubeStore;

/// Requeue timing and watch scope.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ControllerConfig {
    /// Namespace to watch. `None` watches all namespaces.
    pub namespace: Option<String>,
    /// Delay before the follow-up pass after an object was created.
    pub requeue_delay: Duration,
    /// Delay before retrying a failed pass.
    pub error_backoff: Duration,
    /// Interval between drift checks of a converged server. Zero waits for changes.
    pub resync_interval: Duration,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            namespace: None,
            requeue_delay: Duration::from_millis(500),
            error_backoff: Duration::from_secs(5),
            resync_interval: Duration::from_secs(300),
        }
    }
}

impl ControllerConfig {
    /// What the controller does after a successful pass.
    pub fn action_for(&self, outcome: ReconcileOutcome) -> Action {
        match outcome {
            ReconcileOutcome::Requeue => Action::requeue(self.requeue_delay),
            ReconcileOutcome::Done if self.resync_interval.is_zero() => Action::await_change(),
            ReconcileOutcome::Done => Action::requeue(self.resync_interval),
        }
    }

    /// What the controller does after a failed pass.
    pub fn action_on_error(&self, error: &Error) -> Action {
        match error {
            Error::InvalidDocument { .. } | Error::MissingMetadata { .. } => Action::await_change(),
            _ => Action::requeue(self.error_backoff),
        }
    }
}

/// Shared state handed to every reconcile call.
pub struct Context {
    reconciler: Reconciler,
    config: ControllerConfig,
}

impl Context {
    pub const fn new(reconciler: Reconciler, config: ControllerConfig) -> Self {
        Self { reconciler, config }
    }
}

/// Reconcile one MediaServer.
///
/// # Errors
///
/// Whatever the pass failed with; see [`error_policy`].
pub async fn reconcile(server: Arc<MediaServer>, ctx: Arc<Context>) -> Result<Action, Error> {
    let key = ObjectKey::of(&server.metadata)
        .ok_or(Error::missing_metadata(ObjectKind::MediaServer, "metadata.namespace"))?;
    let outcome = ctx.reconciler.reconcile(&key).await?;
    Ok(ctx.config.action_for(outcome))
}

/// Requeue policy for failed passes.
pub fn error_policy(server: Arc<MediaServer>, error: &Error, ctx: Arc<Context>) -> Action {
    let action = ctx.config.action_on_error(error);
    warn!(
        media_server = server.metadata.name.as_deref().unwrap_or_default(),
        error = %error,
        "Reconciliation failed"
    );
    action
}

/// Watch MediaServers and their owned objects until a shutdown signal.
///
/// # Errors
///
/// Fails fast if the MediaServer resource cannot be listed, which usually
/// means the CRD is not installed.
pub async fn run(client: Client, config: ControllerConfig) -> anyhow::Result<()> {
    use anyhow::Context as _;

    let (servers, daemon_sets, config_maps) = match config.namespace.as_deref() {
        Some(ns) => (
            Api::<MediaServer>::namespaced(client.clone(), ns),
            Api::<DaemonSet>::namespaced(client.clone(), ns),
            Api::<ConfigMap>::namespaced(client.clone(), ns),
        ),
        None => (
            Api::<MediaServer>::all(client.clone()),
            Api::<DaemonSet>::all(client.clone()),
            Api::<ConfigMap>::all(client.clone()),
        ),
    };

    servers
        .list(&ListParams::default().limit(1))
        .await
        .context(
            "MediaServer CRD is not queryable; \
             install it with `media-server-operator crd | kubectl apply -f -`",
        )?;

    info!(
        namespace = config.namespace.as_deref().unwrap_or("*"),
        requeue_delay_ms = config.requeue_delay.as_millis(),
        error_backoff_secs = config.error_backoff.as_secs(),
        resync_secs = config.resync_interval.as_secs(),
        "Starting MediaServer controller"
    );

    let store: Arc<dyn ObjectStore> = Arc::new(TracingStore::new(KubeStore::new(client)));
    let ctx = Arc::new(Context::new(Reconciler::with_ulid_ids(store), config));

    Controller::new(servers, watcher::Config::default())
        .owns(daemon_sets, watcher::Config::default())
        .owns(config_maps, watcher::Config::default())
        .shutdown_on_signal()
        .run(reconcile, error_policy, ctx)
        .for_each(|result| async move {
            match result {
                Ok((object, action)) => debug!(object = %object, action = ?action, "Reconciled"),
                Err(e) => warn!(error = %e, "Controller error"),
            }
        })
        .await;

    info!("MediaServer controller stopped");
    Ok(())
}
