use std::collections::BTreeSet;

use fleet_domain::{App, AppId, StateSnapshot};

use crate::plan::{Plan, Step};

/// Computes the ordered sequence of [`Step`]s that transforms `current` into
/// `target`. Pure: no I/O, no randomness, no wall-clock dependence. Given
/// identical inputs it always returns an identical plan.
pub fn diff(current: &StateSnapshot, target: &StateSnapshot) -> Plan {
    let mut plan = Vec::new();

    let app_ids: BTreeSet<i64> = current.apps.keys().chain(target.apps.keys()).copied().collect();
    for key in app_ids {
        match (current.apps.get(&key), target.apps.get(&key)) {
            (None, Some(t)) => bring_up_app(&mut plan, t),
            (Some(c), None) => tear_down_app(&mut plan, c),
            (Some(c), Some(t)) => diff_app(&mut plan, c, t),
            (None, None) => unreachable!("key came from the union of both maps"),
        }
    }
    plan
}

fn bring_up_app(plan: &mut Plan, app: &App) {
    let app_id = app.app_id;

    for service in &app.services {
        plan.push(Step::DownloadImage { app_id, image: service.image_name.clone() });
    }
    for volume in app.referenced_volumes() {
        plan.push(Step::CreateVolume { app_id, name: volume, config: serde_json::Value::Null });
    }
    for network in app.referenced_networks() {
        plan.push(Step::CreateNetwork { app_id, name: network, config: serde_json::Value::Null });
    }
    for service in &app.services {
        plan.push(Step::StartService { app_id, app_name: app.app_name.clone(), service: service.clone() });
    }
}

fn tear_down_app(plan: &mut Plan, app: &App) {
    let app_id = app.app_id;

    for service in &app.services {
        if let Some(container_id) = service.container_id.clone() {
            plan.push(Step::StopService { app_id, service_id: service.service_id, container_id: container_id.clone() });
            plan.push(Step::RemoveService { app_id, service_id: service.service_id, container_id });
        }
    }
    for network in app.referenced_networks() {
        plan.push(Step::RemoveNetwork { app_id, name: network });
    }
    for volume in app.referenced_volumes() {
        plan.push(Step::RemoveVolume { app_id, name: volume });
    }
}

fn diff_app(plan: &mut Plan, current: &App, target: &App) {
    let app_id = current.app_id;
    debug_assert_eq!(current.app_id, target.app_id);

    let cur_service_ids: BTreeSet<i64> = current.services.iter().map(|s| s.service_id.0).collect();
    let tgt_service_ids: BTreeSet<i64> = target.services.iter().map(|s| s.service_id.0).collect();

    let needs_replace = |id: i64| -> bool {
        let c = current.services.iter().find(|s| s.service_id.0 == id).unwrap();
        let t = target.services.iter().find(|s| s.service_id.0 == id).unwrap();
        c.image_name != t.image_name || c.config != t.config || c.status != Some(fleet_domain::ServiceStatus::Running)
    };

    let to_remove: BTreeSet<i64> = cur_service_ids
        .iter()
        .copied()
        .filter(|id| !tgt_service_ids.contains(id) || needs_replace(*id))
        .collect();
    let to_start: BTreeSet<i64> = tgt_service_ids
        .iter()
        .copied()
        .filter(|id| !cur_service_ids.contains(id) || needs_replace(*id))
        .collect();

    let cur_volumes = current.referenced_volumes();
    let tgt_volumes = target.referenced_volumes();
    let cur_networks = current.referenced_networks();
    let tgt_networks = target.referenced_networks();

    // a. Prerequisites
    for service in &target.services {
        if to_start.contains(&service.service_id.0) {
            plan.push(Step::DownloadImage { app_id, image: service.image_name.clone() });
        }
    }
    for volume in tgt_volumes.difference(&cur_volumes) {
        plan.push(Step::CreateVolume { app_id, name: volume.clone(), config: serde_json::Value::Null });
    }
    for network in tgt_networks.difference(&cur_networks) {
        plan.push(Step::CreateNetwork { app_id, name: network.clone(), config: serde_json::Value::Null });
    }

    // b. Teardown
    for service in &current.services {
        if to_remove.contains(&service.service_id.0) {
            if let Some(container_id) = service.container_id.clone() {
                plan.push(Step::StopService { app_id, service_id: service.service_id, container_id: container_id.clone() });
                plan.push(Step::RemoveService { app_id, service_id: service.service_id, container_id });
            }
        }
    }

    // c. Bring-up
    for service in &target.services {
        if to_start.contains(&service.service_id.0) {
            plan.push(Step::StartService { app_id, app_name: target.app_name.clone(), service: service.clone() });
        }
    }

    // d. Cleanup
    for network in cur_networks.difference(&tgt_networks) {
        plan.push(Step::RemoveNetwork { app_id: AppId(app_id.0), name: network.clone() });
    }
    for volume in cur_volumes.difference(&tgt_volumes) {
        plan.push(Step::RemoveVolume { app_id: AppId(app_id.0), name: volume.clone() });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fleet_domain::{RestartPolicy, Service, ServiceConfig, ServiceStatus};
    use std::collections::HashMap;

    fn config(image: &str) -> ServiceConfig {
        ServiceConfig {
            image: image.into(),
            environment: HashMap::new(),
            ports: vec![],
            volumes: vec![],
            networks: BTreeSet::new(),
            restart_policy: RestartPolicy::Always,
            labels: HashMap::new(),
            network_mode: None,
        }
    }

    fn app_with(app_id: i64, services: Vec<fleet_domain::Service>) -> App {
        App { app_id: AppId(app_id), app_name: "myapp".into(), services }
    }

    #[test]
    fn diff_is_pure_and_deterministic() {
        let mut t = StateSnapshot::empty();
        let svc = Service::desired(AppId(1), ServiceId(1), "web", "nginx:1", config("nginx:1"));
        t.apps.insert(1, app_with(1, vec![svc]));
        let c = StateSnapshot::empty();

        let p1 = diff(&c, &t);
        let p2 = diff(&c, &t);
        assert_eq!(p1, p2);
    }

    #[test]
    fn idempotent_when_current_equals_target() {
        let mut running = Service::desired(AppId(1), ServiceId(1), "web", "nginx:1", config("nginx:1"));
        running.container_id = Some("c1".into());
        running.status = Some(ServiceStatus::Running);

        let mut snap = StateSnapshot::empty();
        snap.apps.insert(1, app_with(1, vec![running]));

        assert!(diff(&snap, &snap).is_empty());
    }

    #[test]
    fn new_app_brings_up_prerequisites_then_starts() {
        let target_svc = Service::desired(AppId(1), ServiceId(1), "web", "nginx:1", config("nginx:1"));
        let mut target = StateSnapshot::empty();
        target.apps.insert(1, app_with(1, vec![target_svc]));

        let current = StateSnapshot::empty();
        let plan = diff(&current, &target);

        assert!(matches!(plan[0], Step::DownloadImage { .. }));
        assert!(matches!(plan.last().unwrap(), Step::StartService { .. }));
    }

    #[test]
    fn removed_app_tears_down_then_cleans_up() {
        let mut current_svc = Service::desired(AppId(1), ServiceId(1), "web", "nginx:1", config("nginx:1"));
        current_svc.container_id = Some("c1".into());
        current_svc.status = Some(ServiceStatus::Running);
        let mut current = StateSnapshot::empty();
        current.apps.insert(1, app_with(1, vec![current_svc]));

        let target = StateSnapshot::empty();
        let plan = diff(&current, &target);

        assert!(matches!(plan[0], Step::StopService { .. }));
        assert!(matches!(plan[1], Step::RemoveService { .. }));
    }

    #[test]
    fn config_change_triggers_replace() {
        let mut current_svc = Service::desired(AppId(1), ServiceId(1), "web", "nginx:1", config("nginx:1"));
        current_svc.container_id = Some("c1".into());
        current_svc.status = Some(ServiceStatus::Running);
        let mut current = StateSnapshot::empty();
        current.apps.insert(1, app_with(1, vec![current_svc]));

        let target_svc = Service::desired(AppId(1), ServiceId(1), "web", "nginx:2", config("nginx:2"));
        let mut target = StateSnapshot::empty();
        target.apps.insert(1, app_with(1, vec![target_svc]));

        let plan = diff(&current, &target);
        assert!(plan.iter().any(|s| matches!(s, Step::RemoveService { .. })));
        assert!(plan.iter().any(|s| matches!(s, Step::StartService { .. })));
    }

    #[test]
    fn apps_processed_in_ascending_app_id_order() {
        let svc_a = Service::desired(AppId(5), ServiceId(1), "a", "x:1", config("x:1"));
        let svc_b = Service::desired(AppId(2), ServiceId(1), "b", "x:1", config("x:1"));
        let mut target = StateSnapshot::empty();
        target.apps.insert(5, app_with(5, vec![svc_a]));
        target.apps.insert(2, app_with(2, vec![svc_b]));

        let current = StateSnapshot::empty();
        let plan = diff(&current, &target);

        let app_order: Vec<i64> = plan
            .iter()
            .filter_map(|s| match s {
                Step::DownloadImage { app_id, .. } => Some(app_id.0),
                _ => None,
            })
            .collect();
        assert_eq!(app_order, vec![2, 5]);
    }
}
