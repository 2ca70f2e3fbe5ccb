//! Convergence steps, in the order a pass runs them.

use futures::FutureExt;
use k8s_openapi::api::apps::v1::DaemonSet;
use k8s_openapi::api::core::v1::{ConfigMap, Container, EnvVar, PodSpec, Volume};

use crate::desired::Blueprint;
use crate::ensure::{Drift, ensure, run_in_order};
use crate::error::Result;
use crate::store::ObjectStore;
use crate::types::StepOutcome;

/// Service account, role and role binding.
///
/// All three are write-once: drift in permissions is not repaired.
///
/// # Errors
///
/// The first store failure.
pub async fn ensure_permissions(
    store: &dyn ObjectStore,
    blueprint: &Blueprint,
) -> Result<StepOutcome> {
    run_in_order(vec![
        ensure(store, blueprint.service_account(), Drift::WriteOnce).boxed(),
        ensure(store, blueprint.role(), Drift::WriteOnce).boxed(),
        ensure(store, blueprint.role_binding(), Drift::WriteOnce).boxed(),
    ])
    .await
}

/// License secret, config map and streamer daemon set.
///
/// The secret is never rewritten since the streamer stores its license in it.
/// The config map is replaced wholesale whenever it differs, and the daemon
/// set has a fixed set of fields repaired (see [`patch_daemon_set`]).
///
/// # Errors
///
/// The first store failure.
pub async fn ensure_workload(
    store: &dyn ObjectStore,
    blueprint: &Blueprint,
) -> Result<StepOutcome> {
    run_in_order(vec![
        ensure(store, blueprint.license_secret(), Drift::WriteOnce).boxed(),
        ensure(store, blueprint.config_map(), Drift::Patch(patch_config_map)).boxed(),
        ensure(store, blueprint.daemon_set(), Drift::Patch(patch_daemon_set)).boxed(),
    ])
    .await
}

/// Replace the fragment mapping. Keys the operator no longer derives are dropped.
pub fn patch_config_map(existing: &mut ConfigMap, desired: &ConfigMap) {
    existing.data.clone_from(&desired.data);
}

/// Repair the operator-owned fields of the streamer daemon set.
///
/// Node selector, volumes (including the fragment file list), image, host
/// ports, volume mounts and environment follow the MediaServer. Labels,
/// selector, probes and update strategy keep whatever they were created with.
pub fn patch_daemon_set(existing: &mut DaemonSet, desired: &DaemonSet) {
    let Some(want) = desired
        .spec
        .as_ref()
        .and_then(|s| s.template.spec.as_ref())
    else {
        return;
    };

    let Some(spec) = existing.spec.as_mut() else {
        existing.spec.clone_from(&desired.spec);
        return;
    };

    match spec.template.spec.as_mut() {
        Some(pod) => patch_pod_spec(pod, want),
        None => spec.template.spec = Some(want.clone()),
    }
}

fn patch_pod_spec(pod: &mut PodSpec, want: &PodSpec) {
    pod.node_selector.clone_from(&want.node_selector);
    if without_defaults(pod.volumes.as_deref(), volume_defaults)
        != without_defaults(want.volumes.as_deref(), volume_defaults)
    {
        pod.volumes.clone_from(&want.volumes);
    }

    let Some(want_container) = want.containers.first() else {
        return;
    };
    match pod.containers.first_mut() {
        Some(container) => patch_container(container, want_container),
        None => pod.containers.push(want_container.clone()),
    }
}

fn patch_container(container: &mut Container, want: &Container) {
    container.image.clone_from(&want.image);
    container.volume_mounts.clone_from(&want.volume_mounts);
    if without_defaults(container.env.as_deref(), env_defaults)
        != without_defaults(want.env.as_deref(), env_defaults)
    {
        container.env.clone_from(&want.env);
    }

    let want_ports = want.ports.as_deref().unwrap_or_default();
    let ports = container.ports.get_or_insert_with(Vec::new);
    for (i, want_port) in want_ports.iter().enumerate() {
        match ports.get_mut(i) {
            Some(port) => port.host_port = want_port.host_port,
            None => ports.push(want_port.clone()),
        }
    }
}

/// API server default for volume file modes (0644).
const DEFAULT_FILE_MODE: i32 = 0o644;

/// Copies of `items` with the values the API server fills in on write cleared.
fn without_defaults<T: Clone>(items: Option<&[T]>, clear: fn(&mut T)) -> Vec<T> {
    items
        .unwrap_or_default()
        .iter()
        .cloned()
        .map(|mut item| {
            clear(&mut item);
            item
        })
        .collect()
}

fn clear_default_mode(mode: &mut Option<i32>) {
    if *mode == Some(DEFAULT_FILE_MODE) {
        *mode = None;
    }
}

fn volume_defaults(volume: &mut Volume) {
    if let Some(host_path) = volume.host_path.as_mut() {
        if host_path.type_.as_deref() == Some("") {
            host_path.type_ = None;
        }
    }
    if let Some(source) = volume.config_map.as_mut() {
        clear_default_mode(&mut source.default_mode);
    }
    if let Some(source) = volume.secret.as_mut() {
        clear_default_mode(&mut source.default_mode);
    }
    if let Some(source) = volume.downward_api.as_mut() {
        clear_default_mode(&mut source.default_mode);
    }
    if let Some(source) = volume.projected.as_mut() {
        clear_default_mode(&mut source.default_mode);
    }
}

fn env_defaults(var: &mut EnvVar) {
    if let Some(field) = var.value_from.as_mut().and_then(|v| v.field_ref.as_mut()) {
        if field.api_version.as_deref() == Some("v1") {
            field.api_version = None;
        }
    }
}
