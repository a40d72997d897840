use std::time::Duration;

use crate::error::ConfigError;

/// Boot-time configuration, consumed from the environment (§6). Each
/// interval falls back to the spec's stated default when its variable is
/// absent; an invalid value present in the environment is a fatal error,
/// an absent one is not.
#[derive(Debug, Clone, PartialEq)]
pub struct CloudConfig {
    pub api_endpoint: String,
    pub poll_interval: Duration,
    pub report_interval: Duration,
    pub metrics_interval: Duration,
    pub reconcile_interval: Duration,
    pub database_path: String,
    pub runtime_socket: String,
    pub log_level: String,
}

impl CloudConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Ok(Self {
            api_endpoint: require_env("CLOUD_API_ENDPOINT")?,
            poll_interval: duration_ms_env("POLL_INTERVAL_MS", 60_000)?,
            report_interval: duration_ms_env("REPORT_INTERVAL_MS", 10_000)?,
            metrics_interval: duration_ms_env("METRICS_INTERVAL_MS", 300_000)?,
            reconcile_interval: duration_ms_env("RECONCILE_INTERVAL_MS", 30_000)?,
            database_path: env_or("DATABASE_PATH", "/var/lib/fleet-agent/state.redb"),
            runtime_socket: env_or("RUNTIME_SOCKET", "/var/run/docker.sock"),
            log_level: env_or("LOG_LEVEL", "info"),
        })
    }
}

fn require_env(name: &str) -> Result<String, ConfigError> {
    std::env::var(name).map_err(|_| ConfigError::EnvVar { name: name.into(), message: "not set".into() })
}

fn env_or(name: &str, default: &str) -> String {
    std::env::var(name).unwrap_or_else(|_| default.to_string())
}

fn duration_ms_env(name: &str, default_ms: u64) -> Result<Duration, ConfigError> {
    match std::env::var(name) {
        Err(_) => Ok(Duration::from_millis(default_ms)),
        Ok(raw) => raw
            .parse::<u64>()
            .map(Duration::from_millis)
            .map_err(|e| ConfigError::EnvVar { name: name.into(), message: e.to_string() }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    // Environment variables are process-global; serialise tests that touch them.
    static ENV_LOCK: Mutex<()> = Mutex::new(());

    #[test]
    fn missing_api_endpoint_is_an_error() {
        let _guard = ENV_LOCK.lock().unwrap();
        std::env::remove_var("CLOUD_API_ENDPOINT");
        assert!(matches!(CloudConfig::from_env(), Err(ConfigError::EnvVar { .. })));
    }

    #[test]
    fn defaults_apply_when_intervals_absent() {
        let _guard = ENV_LOCK.lock().unwrap();
        std::env::set_var("CLOUD_API_ENDPOINT", "https://cloud.example.com");
        std::env::remove_var("POLL_INTERVAL_MS");
        let cfg = CloudConfig::from_env().unwrap();
        assert_eq!(cfg.poll_interval, Duration::from_secs(60));
        assert_eq!(cfg.report_interval, Duration::from_secs(10));
        assert_eq!(cfg.reconcile_interval, Duration::from_secs(30));
        std::env::remove_var("CLOUD_API_ENDPOINT");
    }

    #[test]
    fn invalid_interval_is_rejected() {
        let _guard = ENV_LOCK.lock().unwrap();
        std::env::set_var("CLOUD_API_ENDPOINT", "https://cloud.example.com");
        std::env::set_var("POLL_INTERVAL_MS", "not-a-number");
        assert!(matches!(CloudConfig::from_env(), Err(ConfigError::EnvVar { .. })));
        std::env::remove_var("POLL_INTERVAL_MS");
        std::env::remove_var("CLOUD_API_ENDPOINT");
    }
}
