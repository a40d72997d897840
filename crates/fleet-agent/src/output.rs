use serde_json::Value;

/// Renders the `/v1/state` + `/health` bodies as a short status table,
/// one line per app/service — plain `String` building, no table crate.
pub fn render_status_text(health_ok: bool, state: &Value) -> String {
    let mut out = String::new();
    out.push_str(&format!("Engine: {}\n", if health_ok { "healthy" } else { "unreachable" }));

    let apps = match state.get("apps").and_then(|v| v.as_object()) {
        Some(apps) if !apps.is_empty() => apps,
        _ => {
            out.push_str("No apps running.\n");
            return out;
        }
    };

    for (app_id, app) in apps {
        let app_name = app.get("app_name").and_then(|v| v.as_str()).unwrap_or("?");
        out.push_str(&format!("App {} ({})\n", app_name, app_id));
        if let Some(services) = app.get("services").and_then(|v| v.as_array()) {
            for svc in services {
                let name = svc.get("service_name").and_then(|v| v.as_str()).unwrap_or("?");
                let status = svc.get("status").and_then(|v| v.as_str()).unwrap_or("unknown");
                let reason = svc.get("failure_reason").and_then(|v| v.as_str());
                match reason {
                    Some(r) => out.push_str(&format!("  {} — {} ({})\n", name, status, r)),
                    None => out.push_str(&format!("  {} — {}\n", name, status)),
                }
            }
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn renders_no_apps_message_when_empty() {
        let text = render_status_text(true, &json!({ "apps": {} }));
        assert!(text.contains("No apps running."));
    }

    #[test]
    fn renders_one_line_per_service() {
        let state = json!({
            "apps": {
                "1": {
                    "app_name": "web",
                    "services": [
                        { "service_name": "nginx", "status": "running" }
                    ]
                }
            }
        });
        let text = render_status_text(true, &state);
        assert!(text.contains("web"));
        assert!(text.contains("nginx"));
        assert!(text.contains("running"));
    }
}
