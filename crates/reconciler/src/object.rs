//! Object kinds the operator reads and writes.
//!
//! The store seam is deliberately closed over this set: every dependent
//! object a `MediaServer` owns, plus the `MediaServer` itself.

use std::fmt;

use k8s_openapi::api::apps::v1::DaemonSet;
use k8s_openapi::api::core::v1::{ConfigMap, Secret, ServiceAccount};
use k8s_openapi::api::rbac::v1::{Role, RoleBinding};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use kube::Resource;
use mso_api::MediaServer;

/// Kind of a stored object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ObjectKind {
    MediaServer,
    ServiceAccount,
    Role,
    RoleBinding,
    Secret,
    ConfigMap,
    DaemonSet,
}

impl ObjectKind {
    /// Kubernetes kind name.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::MediaServer => "MediaServer",
            Self::ServiceAccount => "ServiceAccount",
            Self::Role => "Role",
            Self::RoleBinding => "RoleBinding",
            Self::Secret => "Secret",
            Self::ConfigMap => "ConfigMap",
            Self::DaemonSet => "DaemonSet",
        }
    }
}

impl fmt::Display for ObjectKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Namespace and name of an object.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ObjectKey {
    pub namespace: String,
    pub name: String,
}

impl ObjectKey {
    /// Create a key.
    pub fn new(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            name: name.into(),
        }
    }

    /// Key of an object from its metadata. `None` when name or namespace is unset.
    pub fn of(meta: &ObjectMeta) -> Option<Self> {
        match (&meta.namespace, &meta.name) {
            (Some(namespace), Some(name)) => Some(Self::new(namespace, name)),
            _ => None,
        }
    }
}

impl fmt::Display for ObjectKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.namespace, self.name)
    }
}

/// An object of any managed kind.
#[derive(Debug, Clone, PartialEq)]
pub enum ManagedObject {
    MediaServer(Box<MediaServer>),
    ServiceAccount(ServiceAccount),
    Role(Role),
    RoleBinding(RoleBinding),
    Secret(Secret),
    ConfigMap(ConfigMap),
    DaemonSet(Box<DaemonSet>),
}

impl ManagedObject {
    /// Kind of the wrapped object.
    pub const fn kind(&self) -> ObjectKind {
        match self {
            Self::MediaServer(_) => ObjectKind::MediaServer,
            Self::ServiceAccount(_) => ObjectKind::ServiceAccount,
            Self::Role(_) => ObjectKind::Role,
            Self::RoleBinding(_) => ObjectKind::RoleBinding,
            Self::Secret(_) => ObjectKind::Secret,
            Self::ConfigMap(_) => ObjectKind::ConfigMap,
            Self::DaemonSet(_) => ObjectKind::DaemonSet,
        }
    }

    /// Metadata of the wrapped object.
    pub fn meta(&self) -> &ObjectMeta {
        match self {
            Self::MediaServer(o) => o.meta(),
            Self::ServiceAccount(o) => o.meta(),
            Self::Role(o) => o.meta(),
            Self::RoleBinding(o) => o.meta(),
            Self::Secret(o) => o.meta(),
            Self::ConfigMap(o) => o.meta(),
            Self::DaemonSet(o) => o.meta(),
        }
    }

    /// Mutable metadata of the wrapped object.
    pub fn meta_mut(&mut self) -> &mut ObjectMeta {
        match self {
            Self::MediaServer(o) => o.meta_mut(),
            Self::ServiceAccount(o) => o.meta_mut(),
            Self::Role(o) => o.meta_mut(),
            Self::RoleBinding(o) => o.meta_mut(),
            Self::Secret(o) => o.meta_mut(),
            Self::ConfigMap(o) => o.meta_mut(),
            Self::DaemonSet(o) => o.meta_mut(),
        }
    }

    /// Key of the wrapped object, if its metadata names one.
    pub fn key(&self) -> Option<ObjectKey> {
        ObjectKey::of(self.meta())
    }
}

/// A concrete Kubernetes type that can travel through the store seam.
pub trait Managed: Clone + PartialEq + Send + Sync + 'static {
    /// Kind tag used for store lookups.
    const KIND: ObjectKind;

    /// Wrap into the kind-erased form.
    fn into_object(self) -> ManagedObject;

    /// Unwrap from the kind-erased form, handing the object back on mismatch.
    fn from_object(object: ManagedObject) -> Result<Self, ManagedObject>;

    /// Object metadata.
    fn metadata(&self) -> &ObjectMeta;
}

macro_rules! impl_managed {
    ($ty:ty, $variant:ident) => {
        impl Managed for $ty {
            const KIND: ObjectKind = ObjectKind::$variant;

            fn into_object(self) -> ManagedObject {
                ManagedObject::$variant(self)
            }

            fn from_object(object: ManagedObject) -> Result<Self, ManagedObject> {
                match object {
                    ManagedObject::$variant(inner) => Ok(inner),
                    other => Err(other),
                }
            }

            fn metadata(&self) -> &ObjectMeta {
                self.meta()
            }
        }
    };
    (boxed $ty:ty, $variant:ident) => {
        impl Managed for $ty {
            const KIND: ObjectKind = ObjectKind::$variant;

            fn into_object(self) -> ManagedObject {
                ManagedObject::$variant(Box::new(self))
            }

            fn from_object(object: ManagedObject) -> Result<Self, ManagedObject> {
                match object {
                    ManagedObject::$variant(inner) => Ok(*inner),
                    other => Err(other),
                }
            }

            fn metadata(&self) -> &ObjectMeta {
                self.meta()
            }
        }
    };
}

impl_managed!(boxed MediaServer, MediaServer);
impl_managed!(ServiceAccount, ServiceAccount);
impl_managed!(Role, Role);
impl_managed!(RoleBinding, RoleBinding);
impl_managed!(Secret, Secret);
impl_managed!(ConfigMap, ConfigMap);
impl_managed!(boxed DaemonSet, DaemonSet);

#[cfg(test)]
mod tests {
    use super::*;

    fn config_map(namespace: &str, name: &str) -> ConfigMap {
        ConfigMap {
            metadata: ObjectMeta {
                namespace: Some(namespace.to_string()),
                name: Some(name.to_string()),
                ..Default::default()
            },
            ..Default::default()
        }
    }

    #[test]
    fn key_requires_namespace_and_name() {
        let meta = ObjectMeta {
            name: Some("cam1".to_string()),
            ..Default::default()
        };
        assert_eq!(ObjectKey::of(&meta), None);

        let cm = config_map("streaming", "cam1-configmap");
        assert_eq!(
            ObjectKey::of(cm.metadata()),
            Some(ObjectKey::new("streaming", "cam1-configmap"))
        );
    }

    #[test]
    fn key_displays_as_namespace_slash_name() {
        assert_eq!(ObjectKey::new("ns", "cam1").to_string(), "ns/cam1");
    }

    #[test]
    fn round_trip_through_kind_erased_form() {
        let cm = config_map("ns", "cam1-configmap");
        let object = cm.clone().into_object();

        assert_eq!(object.kind(), ObjectKind::ConfigMap);
        assert_eq!(ConfigMap::from_object(object).ok(), Some(cm));
    }

    #[test]
    fn from_object_hands_back_other_kinds() {
        let object = config_map("ns", "cam1-configmap").into_object();
        let result = Secret::from_object(object);

        assert_eq!(result.err().map(|o| o.kind()), Some(ObjectKind::ConfigMap));
    }

    #[test]
    fn boxed_kinds_unwrap() {
        let ds = DaemonSet {
            metadata: ObjectMeta {
                namespace: Some("ns".to_string()),
                name: Some("cam1-streamer".to_string()),
                ..Default::default()
            },
            ..Default::default()
        };
        let object = ds.clone().into_object();
        assert_eq!(object.kind(), ObjectKind::DaemonSet);
        assert_eq!(object.key(), Some(ObjectKey::new("ns", "cam1-streamer")));
        assert_eq!(DaemonSet::from_object(object).ok(), Some(ds));
    }
}
