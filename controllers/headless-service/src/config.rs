//! Controller configuration from environment variables.

use crate::error::ControllerError;
use crate::workqueue::QueueSettings;
use std::str::FromStr;
use std::time::Duration;

/// Annotation a pod sets to `"true"` to opt in
pub const DEFAULT_ANNOTATION_KEY: &str = "srcd.host/create-headless-service";

#[derive(Debug, Clone)]
pub struct ControllerConfig {
    /// Namespace to watch; `None` watches all namespaces
    pub namespace: Option<String>,
    pub annotation_key: String,
    pub queue: QueueSettings,
}

impl ControllerConfig {
    /// Loads configuration from the process environment.
    pub fn from_env() -> Result<Self, ControllerError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Loads configuration through `lookup`, which returns the value of a variable if set.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ControllerError> {
        let defaults = QueueSettings::default();

        let namespace = lookup("WATCH_NAMESPACE").filter(|ns| !ns.is_empty());
        let annotation_key = lookup("HEADLESS_SERVICE_ANNOTATION")
            .filter(|key| !key.is_empty())
            .unwrap_or_else(|| DEFAULT_ANNOTATION_KEY.to_string());

        let max_concurrent_reconciles =
            parse(&lookup, "MAX_CONCURRENT_RECONCILES")?.unwrap_or(defaults.max_concurrent_reconciles);
        if max_concurrent_reconciles == 0 {
            return Err(ControllerError::InvalidConfig(
                "MAX_CONCURRENT_RECONCILES must be at least 1".to_string(),
            ));
        }

        let retry_initial_delay = parse(&lookup, "RETRY_INITIAL_DELAY_MS")?
            .map(Duration::from_millis)
            .unwrap_or(defaults.retry_initial_delay);
        let retry_max_delay = parse(&lookup, "RETRY_MAX_DELAY_MS")?
            .map(Duration::from_millis)
            .unwrap_or(defaults.retry_max_delay);
        let max_retries = parse(&lookup, "RETRY_MAX_ATTEMPTS")?.unwrap_or(defaults.max_retries);
        let permanent_retry_delay = parse(&lookup, "PERMANENT_RETRY_DELAY_SECS")?
            .map(Duration::from_secs)
            .unwrap_or(defaults.permanent_retry_delay);

        Ok(Self {
            namespace,
            annotation_key,
            queue: QueueSettings {
                max_concurrent_reconciles,
                retry_initial_delay,
                retry_max_delay,
                max_retries,
                permanent_retry_delay,
            },
        })
    }
}

fn parse<T: FromStr>(lookup: &impl Fn(&str) -> Option<String>, name: &str) -> Result<Option<T>, ControllerError>
where
    T::Err: std::fmt::Display,
{
    match lookup(name) {
        None => Ok(None),
        Some(raw) => raw.trim().parse::<T>().map(Some).map_err(|e| {
            ControllerError::InvalidConfig(format!("{} has invalid value {:?}: {}", name, raw, e))
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn load(vars: &[(&str, &str)]) -> Result<ControllerConfig, ControllerError> {
        let vars: HashMap<String, String> = vars.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
        ControllerConfig::from_lookup(|name| vars.get(name).cloned())
    }

    #[test]
    fn test_defaults() {
        let config = load(&[]).unwrap();

        assert_eq!(config.namespace, None);
        assert_eq!(config.annotation_key, DEFAULT_ANNOTATION_KEY);
        assert_eq!(config.queue.max_concurrent_reconciles, 4);
        assert_eq!(config.queue.retry_initial_delay, Duration::from_millis(500));
        assert_eq!(config.queue.retry_max_delay, Duration::from_secs(30));
        assert_eq!(config.queue.max_retries, 6);
        assert_eq!(config.queue.permanent_retry_delay, Duration::from_secs(300));
    }

    #[test]
    fn test_overrides() {
        let config = load(&[
            ("WATCH_NAMESPACE", "apps"),
            ("HEADLESS_SERVICE_ANNOTATION", "example.com/headless"),
            ("MAX_CONCURRENT_RECONCILES", "16"),
            ("RETRY_INITIAL_DELAY_MS", "100"),
            ("RETRY_MAX_DELAY_MS", "5000"),
            ("RETRY_MAX_ATTEMPTS", "3"),
            ("PERMANENT_RETRY_DELAY_SECS", "60"),
        ])
        .unwrap();

        assert_eq!(config.namespace.as_deref(), Some("apps"));
        assert_eq!(config.annotation_key, "example.com/headless");
        assert_eq!(config.queue.max_concurrent_reconciles, 16);
        assert_eq!(config.queue.retry_initial_delay, Duration::from_millis(100));
        assert_eq!(config.queue.retry_max_delay, Duration::from_secs(5));
        assert_eq!(config.queue.max_retries, 3);
        assert_eq!(config.queue.permanent_retry_delay, Duration::from_secs(60));
    }

    #[test]
    fn test_empty_namespace_means_all() {
        let config = load(&[("WATCH_NAMESPACE", "")]).unwrap();
        assert_eq!(config.namespace, None);
    }

    #[test]
    fn test_malformed_number_is_rejected() {
        let err = load(&[("RETRY_MAX_ATTEMPTS", "six")]).unwrap_err();
        assert!(matches!(err, ControllerError::InvalidConfig(msg) if msg.contains("RETRY_MAX_ATTEMPTS")));
    }

    #[test]
    fn test_zero_workers_is_rejected() {
        let err = load(&[("MAX_CONCURRENT_RECONCILES", "0")]).unwrap_err();
        assert!(matches!(err, ControllerError::InvalidConfig(_)));
    }
}
