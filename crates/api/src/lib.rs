//! Schema for the `MediaServer` custom resource.
//!
//! A `MediaServer` declares one fleet of Flussonic streamer instances, one per
//! eligible node. The operator derives every dependent object (service
//! account, role, binding, license secret, config map and daemon set) from
//! the fields declared here.
//!
//! The wire format (`media.flussonic.com/v1alpha1`) is shared with manifests
//! written for earlier releases of the operator, so field names are fixed.

#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![forbid(clippy::panic)]

use std::collections::BTreeMap;

use k8s_openapi::api::core::v1::{EnvVar, Volume};
use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

pub use kube::CustomResourceExt;

/// API group of the custom resource.
pub const GROUP: &str = "media.flussonic.com";

/// API version of the custom resource.
pub const VERSION: &str = "v1alpha1";

/// Desired state of one streamer fleet.
#[derive(CustomResource, Deserialize, Serialize, Clone, Debug, Default, PartialEq, JsonSchema)]
#[kube(
    group = "media.flussonic.com",
    version = "v1alpha1",
    kind = "MediaServer",
    plural = "mediaservers",
    shortname = "ms",
    namespaced,
    status = "MediaServerStatus",
    derive = "PartialEq",
    derive = "Default"
)]
#[serde(rename_all = "camelCase")]
pub struct MediaServerSpec {
    /// Container image of the streamer.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub image: String,

    /// Extra environment variables, appended after the ones the operator injects.
    #[serde(default, rename = "env", skip_serializing_if = "Vec::is_empty")]
    pub env: Vec<EnvVar>,

    /// Nodes that should run a streamer. One instance is placed on every match.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub node_selector: BTreeMap<String, String>,

    /// Host port bound to the streaming port. `0` leaves it unexposed.
    #[serde(default, skip_serializing_if = "is_zero")]
    pub host_port: i32,

    /// Host port bound to the admin API. `0` leaves it unexposed.
    #[serde(default, skip_serializing_if = "is_zero")]
    pub admin_host_port: i32,

    /// Additional files for `/etc/flussonic/flussonic.conf.d`, keyed by file name.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub config_extra: BTreeMap<String, String>,

    /// Additional volumes mounted into the streamer container.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub volumes: Vec<MediaServerVolume>,
}

/// A volume together with the path it is mounted at.
///
/// The volume source is inlined, so a manifest entry reads
/// `{name: media, mountPath: /storage, hostPath: {path: /mnt/media}}`.
#[derive(Deserialize, Serialize, Clone, Debug, Default, PartialEq, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct MediaServerVolume {
    /// Mount path inside the streamer container.
    pub mount_path: String,

    /// Volume name and source.
    #[serde(flatten)]
    pub volume: Volume,
}

impl MediaServerVolume {
    /// Create a volume entry mounted at `mount_path`.
    pub fn new(volume: Volume, mount_path: impl Into<String>) -> Self {
        Self {
            mount_path: mount_path.into(),
            volume,
        }
    }

    /// Name shared by the volume and its mount.
    pub fn name(&self) -> &str {
        &self.volume.name
    }
}

/// Observed state. Nothing is reported yet.
#[derive(Deserialize, Serialize, Clone, Debug, Default, PartialEq, JsonSchema)]
pub struct MediaServerStatus {}

#[allow(clippy::trivially_copy_pass_by_ref)]
fn is_zero(port: &i32) -> bool {
    *port == 0
}
