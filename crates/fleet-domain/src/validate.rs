use crate::error::DomainError;
use crate::types::StateSnapshot;

fn is_dns_label_safe(s: &str) -> bool {
    !s.is_empty()
        && s.len() <= 63
        && s.chars().all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-')
        && !s.starts_with('-')
        && !s.ends_with('-')
}

fn is_valid_port_mapping(s: &str) -> bool {
    let mut parts = s.splitn(2, '/');
    let ports = parts.next().unwrap_or("");
    let proto = parts.next();
    if let Some(proto) = proto {
        if proto != "tcp" && proto != "udp" {
            return false;
        }
    }
    let mut port_parts = ports.split(':');
    let (host, container) = match (port_parts.next(), port_parts.next(), port_parts.next()) {
        (Some(h), Some(c), None) => (h, c),
        _ => return false,
    };
    host.parse::<u16>().is_ok() && container.parse::<u16>().map(|p| p != 0).unwrap_or(false)
}

fn is_valid_volume_mapping(s: &str) -> bool {
    let mut parts = s.splitn(2, ':');
    match (parts.next(), parts.next()) {
        (Some(name), Some(mount)) => !name.is_empty() && mount.starts_with('/'),
        _ => false,
    }
}

/// Checks the structural invariants that must hold for both Target and
/// Current state: unique service ids per app, DNS-label-safe names, and
/// well-formed port/volume mapping strings.
///
/// When `is_target` is set, additionally rejects any service carrying a
/// `container_id` — Target values describe desired shape only, never
/// runtime handles.
pub fn validate_snapshot(snapshot: &StateSnapshot, is_target: bool) -> Result<(), DomainError> {
    for app in snapshot.apps.values() {
        if !is_dns_label_safe(&app.app_name) {
            return Err(DomainError::InvalidAppName(app.app_name.clone()));
        }

        let mut seen_ids = std::collections::HashSet::new();
        for service in &app.services {
            if !seen_ids.insert(service.service_id.0) {
                return Err(DomainError::DuplicateServiceId {
                    app_id: app.app_id.0,
                    service_id: service.service_id.0,
                });
            }
            if !is_dns_label_safe(&service.service_name) {
                return Err(DomainError::InvalidServiceName(service.service_name.clone()));
            }
            if is_target && service.container_id.is_some() {
                return Err(DomainError::ContainerIdInTarget {
                    app_id: app.app_id.0,
                    service_id: service.service_id.0,
                });
            }
            for port in &service.config.ports {
                if !is_valid_port_mapping(port) {
                    return Err(DomainError::InvalidPortMapping(port.clone()));
                }
            }
            for volume in &service.config.volumes {
                if !is_valid_volume_mapping(volume) {
                    return Err(DomainError::InvalidVolumeMapping(volume.clone()));
                }
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{App, AppId, RestartPolicy, Service, ServiceConfig, ServiceId};
    use std::collections::{BTreeSet, HashMap};

    fn config(image: &str) -> ServiceConfig {
        ServiceConfig {
            image: image.into(),
            environment: HashMap::new(),
            ports: vec![],
            volumes: vec![],
            networks: BTreeSet::new(),
            restart_policy: RestartPolicy::No,
            labels: HashMap::new(),
            network_mode: None,
        }
    }

    fn app(app_id: i64, name: &str, services: Vec<Service>) -> App {
        App {
            app_id: AppId(app_id),
            app_name: name.into(),
            services,
        }
    }

    #[test]
    fn valid_snapshot_passes() {
        let mut cfg = config("nginx:alpine");
        cfg.volumes = vec!["data:/var/data".into()];
        let svc = Service::desired(AppId(1), ServiceId(1), "web", "nginx:alpine", cfg);
        let mut snap = StateSnapshot::empty();
        snap.apps.insert(1, app(1, "myapp", vec![svc]));
        assert!(validate_snapshot(&snap, true).is_ok());
    }

    #[test]
    fn duplicate_service_id_rejected() {
        let a_svc = Service::desired(AppId(1), ServiceId(1), "a", "x:1", config("x:1"));
        let b_svc = Service::desired(AppId(1), ServiceId(1), "b", "x:1", config("x:1"));
        let mut snap = StateSnapshot::empty();
        snap.apps.insert(1, app(1, "myapp", vec![a_svc, b_svc]));
        assert!(matches!(
            validate_snapshot(&snap, true),
            Err(DomainError::DuplicateServiceId { .. })
        ));
    }

    #[test]
    fn container_id_in_target_rejected() {
        let mut svc = Service::desired(AppId(1), ServiceId(1), "a", "x:1", config("x:1"));
        svc.container_id = Some("abc123".into());
        let mut snap = StateSnapshot::empty();
        snap.apps.insert(1, app(1, "myapp", vec![svc]));
        assert!(matches!(
            validate_snapshot(&snap, true),
            Err(DomainError::ContainerIdInTarget { .. })
        ));
        // the same snapshot is legal as Current state
        assert!(validate_snapshot(&snap, false).is_ok());
    }

    #[test]
    fn invalid_port_mapping_rejected() {
        let mut cfg = config("x:1");
        cfg.ports = vec!["not-a-port".into()];
        let svc = Service::desired(AppId(1), ServiceId(1), "a", "x:1", cfg);
        let mut snap = StateSnapshot::empty();
        snap.apps.insert(1, app(1, "myapp", vec![svc]));
        assert!(matches!(
            validate_snapshot(&snap, true),
            Err(DomainError::InvalidPortMapping(_))
        ));
    }

    #[test]
    fn invalid_app_name_rejected() {
        let mut snap = StateSnapshot::empty();
        snap.apps.insert(1, app(1, "My_App", vec![]));
        assert!(matches!(
            validate_snapshot(&snap, true),
            Err(DomainError::InvalidAppName(_))
        ));
    }
}
