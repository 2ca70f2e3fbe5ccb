//! Canonical shape of every object derived from a MediaServer.
//!
//! Everything here is pure: the same MediaServer always yields the same
//! objects, which is what lets every pass compare and patch without keeping
//! state between passes.

use std::collections::BTreeMap;

use itertools::Itertools;
use k8s_openapi::api::apps::v1::{DaemonSet, DaemonSetSpec};
use k8s_openapi::api::core::v1::{
    ConfigMap, ConfigMapVolumeSource, Container, ContainerPort, EnvVar, EnvVarSource,
    HTTPGetAction, KeyToPath, ObjectFieldSelector, PodSpec, PodTemplateSpec, Probe, Secret,
    ServiceAccount, Volume, VolumeMount,
};
use k8s_openapi::api::rbac::v1::{PolicyRule, Role, RoleBinding, RoleRef, Subject};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::{LabelSelector, ObjectMeta, OwnerReference};
use k8s_openapi::apimachinery::pkg::util::intstr::IntOrString;
use kube::Resource;
use mso_api::{MediaServer, MediaServerSpec};

use crate::error::{Error, Result};
use crate::names::ChildNames;
use crate::object::{ObjectKey, ObjectKind};

/// File name of the built-in config fragment.
pub const BUILTIN_FRAGMENT_NAME: &str = "k8s.conf";

/// Built-in config fragment: streaming on 80, admin API on 81.
pub const BUILTIN_FRAGMENT: &str = "http 80 {api false;} http 81;";

/// Directory the streamer reads config fragments from.
pub const CONFIG_DIR: &str = "/etc/flussonic/flussonic.conf.d";

pub const CONTAINER_NAME: &str = "mediaserver";
pub const DATA_PORT: i32 = 80;
pub const ADMIN_PORT: i32 = 81;

pub const LIVENESS_PATH: &str = "/streamer/api/v3/monitoring/liveness";
pub const READINESS_PATH: &str = "/streamer/api/v3/monitoring/readiness";

/// Mode of the mounted config fragments (0440).
const CONFIG_FILE_MODE: i32 = 0o440;

const IMAGE_PULL_POLICY: &str = "IfNotPresent";

/// Content written to a fresh license secret. The streamer replaces it.
const SECRET_PLACEHOLDER: (&str, &str) = ("initial", "value");

/// Everything needed to derive the dependent objects of one MediaServer.
#[derive(Debug, Clone)]
pub struct Blueprint {
    key: ObjectKey,
    names: ChildNames,
    owner: OwnerReference,
    spec: MediaServerSpec,
}

impl Blueprint {
    /// Capture a MediaServer for one pass.
    ///
    /// # Errors
    ///
    /// `MissingMetadata` if the MediaServer has no name, namespace or uid, and
    /// `InvalidDocument` if its volumes cannot be mounted side by side.
    pub fn from_server(server: &MediaServer) -> Result<Self> {
        let key = ObjectKey::of(server.meta()).ok_or(Error::missing_metadata(
            ObjectKind::MediaServer,
            "metadata.name or metadata.namespace",
        ))?;
        let owner = server
            .controller_owner_ref(&())
            .ok_or(Error::missing_metadata(ObjectKind::MediaServer, "metadata.uid"))?;
        let names = ChildNames::for_server(&key.name);

        validate_volumes(&key, &names, &server.spec)?;

        Ok(Self {
            key,
            names,
            owner,
            spec: server.spec.clone(),
        })
    }

    /// Key of the MediaServer.
    pub fn key(&self) -> &ObjectKey {
        &self.key
    }

    /// Names of the dependent objects.
    pub fn names(&self) -> &ChildNames {
        &self.names
    }

    fn metadata(&self, name: &str) -> ObjectMeta {
        ObjectMeta {
            name: Some(name.to_string()),
            namespace: Some(self.key.namespace.clone()),
            owner_references: Some(vec![self.owner.clone()]),
            ..Default::default()
        }
    }

    fn app_labels(&self) -> BTreeMap<String, String> {
        BTreeMap::from([("app".to_string(), self.names.app_label.clone())])
    }

    /// Identity the streamer pods run as.
    pub fn service_account(&self) -> ServiceAccount {
        ServiceAccount {
            metadata: self.metadata(&self.names.service_account),
            ..Default::default()
        }
    }

    /// Grant to read and update the license secret, and nothing else.
    pub fn role(&self) -> Role {
        Role {
            metadata: self.metadata(&self.names.role),
            rules: Some(vec![PolicyRule {
                api_groups: Some(vec![String::new()]),
                resources: Some(vec!["secrets".to_string()]),
                resource_names: Some(vec![self.names.license_secret.clone()]),
                verbs: vec!["get".to_string(), "update".to_string(), "patch".to_string()],
                ..Default::default()
            }]),
        }
    }

    /// Binding of the role to the service account.
    pub fn role_binding(&self) -> RoleBinding {
        RoleBinding {
            metadata: self.metadata(&self.names.role_binding),
            role_ref: RoleRef {
                api_group: "rbac.authorization.k8s.io".to_string(),
                kind: "Role".to_string(),
                name: self.names.role.clone(),
            },
            subjects: Some(vec![Subject {
                kind: "ServiceAccount".to_string(),
                name: self.names.service_account.clone(),
                namespace: Some(self.key.namespace.clone()),
                ..Default::default()
            }]),
        }
    }

    /// License storage. Only the placeholder is ever written by the operator.
    pub fn license_secret(&self) -> Secret {
        let (key, value) = SECRET_PLACEHOLDER;
        Secret {
            metadata: self.metadata(&self.names.license_secret),
            string_data: Some(BTreeMap::from([(key.to_string(), value.to_string())])),
            ..Default::default()
        }
    }

    /// Built-in fragment overlaid with the user's fragments.
    pub fn config_fragments(&self) -> BTreeMap<String, String> {
        merge_fragments(&self.spec.config_extra)
    }

    /// Config map holding every fragment.
    pub fn config_map(&self) -> ConfigMap {
        ConfigMap {
            metadata: self.metadata(&self.names.config_map),
            data: Some(self.config_fragments()),
            ..Default::default()
        }
    }

    /// Streamer daemon set.
    pub fn daemon_set(&self) -> DaemonSet {
        let labels = self.app_labels();
        DaemonSet {
            metadata: self.metadata(&self.names.daemon_set),
            spec: Some(DaemonSetSpec {
                selector: LabelSelector {
                    match_labels: Some(labels.clone()),
                    ..Default::default()
                },
                template: PodTemplateSpec {
                    metadata: Some(ObjectMeta {
                        labels: Some(labels),
                        ..Default::default()
                    }),
                    spec: Some(self.pod_spec()),
                },
                ..Default::default()
            }),
            ..Default::default()
        }
    }

    /// Pod template spec of the streamer.
    pub fn pod_spec(&self) -> PodSpec {
        let fragments = self.config_fragments();
        PodSpec {
            volumes: Some(pod_volumes(&self.names, &fragments, &self.spec)),
            node_selector: non_empty(self.spec.node_selector.clone()),
            service_account_name: Some(self.names.service_account.clone()),
            containers: vec![Container {
                name: CONTAINER_NAME.to_string(),
                image: Some(self.spec.image.clone()),
                image_pull_policy: Some(IMAGE_PULL_POLICY.to_string()),
                env: Some(environment(&self.names, &self.spec.env)),
                liveness_probe: Some(liveness_probe()),
                readiness_probe: Some(readiness_probe()),
                startup_probe: Some(startup_probe()),
                ports: Some(container_ports(&self.spec)),
                volume_mounts: Some(volume_mounts(&self.names, &fragments, &self.spec)),
                ..Default::default()
            }],
            ..Default::default()
        }
    }
}

/// Reject volume sets the pod could not mount.
fn validate_volumes(key: &ObjectKey, names: &ChildNames, spec: &MediaServerSpec) -> Result<()> {
    if let Some(volume) = spec
        .volumes
        .iter()
        .find(|v| v.name() == names.config_volume)
    {
        return Err(Error::invalid_document(
            key.clone(),
            format!("volume name '{}' is reserved for config fragments", volume.name()),
        ));
    }

    let duplicates = spec
        .volumes
        .iter()
        .map(|v| v.name())
        .duplicates()
        .collect_vec();
    if !duplicates.is_empty() {
        return Err(Error::invalid_document(
            key.clone(),
            format!("duplicate volume names: {}", duplicates.join(", ")),
        ));
    }

    Ok(())
}

/// Overlay user fragments on the built-in one. User fragments win.
pub fn merge_fragments(extra: &BTreeMap<String, String>) -> BTreeMap<String, String> {
    let mut fragments = BTreeMap::from([(
        BUILTIN_FRAGMENT_NAME.to_string(),
        BUILTIN_FRAGMENT.to_string(),
    )]);
    fragments.extend(extra.iter().map(|(k, v)| (k.clone(), v.clone())));
    fragments
}

/// System variables followed by the user's, in declaration order.
///
/// User entries are appended as-is, even when their name repeats a system one.
pub fn environment(names: &ChildNames, user: &[EnvVar]) -> Vec<EnvVar> {
    let system = [
        EnvVar {
            name: "FLUSSONIC_HOSTNAME".to_string(),
            value_from: Some(EnvVarSource {
                field_ref: Some(ObjectFieldSelector {
                    api_version: Some("v1".to_string()),
                    field_path: "spec.nodeName".to_string(),
                }),
                ..Default::default()
            }),
            ..Default::default()
        },
        EnvVar {
            name: "FLUSSONIC_SECRETS_STORAGE".to_string(),
            value: Some(format!("k8s://{}", names.license_secret)),
            ..Default::default()
        },
        EnvVar {
            name: "DO_NOT_DO_NET_TUNING".to_string(),
            value: Some("true".to_string()),
            ..Default::default()
        },
    ];
    system.into_iter().chain(user.iter().cloned()).collect()
}

/// Config volume first, then the user's volumes in declaration order.
pub fn pod_volumes(
    names: &ChildNames,
    fragments: &BTreeMap<String, String>,
    spec: &MediaServerSpec,
) -> Vec<Volume> {
    let config = Volume {
        name: names.config_volume.clone(),
        config_map: Some(ConfigMapVolumeSource {
            name: names.config_map.clone(),
            items: Some(
                fragments
                    .keys()
                    .map(|k| KeyToPath {
                        key: k.clone(),
                        path: k.clone(),
                        ..Default::default()
                    })
                    .collect(),
            ),
            default_mode: Some(CONFIG_FILE_MODE),
            optional: Some(false),
        }),
        ..Default::default()
    };
    std::iter::once(config)
        .chain(spec.volumes.iter().map(|v| v.volume.clone()))
        .collect()
}

/// One read-only mount per fragment file, then one mount per user volume.
pub fn volume_mounts(
    names: &ChildNames,
    fragments: &BTreeMap<String, String>,
    spec: &MediaServerSpec,
) -> Vec<VolumeMount> {
    let config = fragments.keys().map(|k| VolumeMount {
        name: names.config_volume.clone(),
        mount_path: format!("{CONFIG_DIR}/{k}"),
        sub_path: Some(k.clone()),
        read_only: Some(true),
        ..Default::default()
    });
    let user = spec.volumes.iter().map(|v| VolumeMount {
        name: v.name().to_string(),
        mount_path: v.mount_path.clone(),
        ..Default::default()
    });
    config.chain(user).collect()
}

/// Streaming and admin ports, bound to the host when a host port is set.
pub fn container_ports(spec: &MediaServerSpec) -> Vec<ContainerPort> {
    vec![
        ContainerPort {
            name: Some("data".to_string()),
            container_port: DATA_PORT,
            host_port: host_port(spec.host_port),
            ..Default::default()
        },
        ContainerPort {
            name: Some("api".to_string()),
            container_port: ADMIN_PORT,
            host_port: host_port(spec.admin_host_port),
            ..Default::default()
        },
    ]
}

const fn host_port(port: i32) -> Option<i32> {
    if port == 0 { None } else { Some(port) }
}

fn http_probe(path: &str, initial_delay: i32, period: i32) -> Probe {
    Probe {
        http_get: Some(HTTPGetAction {
            path: Some(path.to_string()),
            port: IntOrString::Int(ADMIN_PORT),
            ..Default::default()
        }),
        initial_delay_seconds: Some(initial_delay),
        period_seconds: Some(period),
        ..Default::default()
    }
}

pub fn liveness_probe() -> Probe {
    http_probe(LIVENESS_PATH, 10, 3)
}

pub fn readiness_probe() -> Probe {
    http_probe(READINESS_PATH, 2, 2)
}

/// Gives the streamer 30 failed checks, two seconds apart, to come up.
pub fn startup_probe() -> Probe {
    Probe {
        failure_threshold: Some(30),
        ..http_probe(READINESS_PATH, 2, 2)
    }
}

fn non_empty(map: BTreeMap<String, String>) -> Option<BTreeMap<String, String>> {
    if map.is_empty() { None } else { Some(map) }
}
