//! Names of the objects derived from one MediaServer.

/// Deterministic names of every dependent object of a MediaServer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChildNames {
    pub service_account: String,
    pub role: String,
    pub role_binding: String,
    pub license_secret: String,
    pub config_map: String,
    /// Pod volume carrying the config fragments. Reserved: user volumes may not use it.
    pub config_volume: String,
    pub daemon_set: String,
    /// Value of the `app` label on the streamer pods.
    pub app_label: String,
}

impl ChildNames {
    /// Names for the MediaServer called `name`.
    pub fn for_server(name: &str) -> Self {
        Self {
            service_account: format!("{name}-sa"),
            role: format!("{name}-role"),
            role_binding: format!("{name}-rb"),
            license_secret: format!("{name}-license-storage"),
            config_map: format!("{name}-configmap"),
            config_volume: format!("{name}-configvol"),
            daemon_set: format!("{name}-streamer"),
            app_label: format!("{name}-streamer"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn names_derive_from_server_name() {
        let names = ChildNames::for_server("cam1");
        assert_eq!(names.service_account, "cam1-sa");
        assert_eq!(names.role, "cam1-role");
        assert_eq!(names.role_binding, "cam1-rb");
        assert_eq!(names.license_secret, "cam1-license-storage");
        assert_eq!(names.config_map, "cam1-configmap");
        assert_eq!(names.config_volume, "cam1-configvol");
        assert_eq!(names.daemon_set, "cam1-streamer");
    }

    #[test]
    fn names_are_stable() {
        assert_eq!(ChildNames::for_server("x"), ChildNames::for_server("x"));
    }
}
