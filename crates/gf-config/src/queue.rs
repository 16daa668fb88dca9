use serde::{Deserialize, Serialize};

use crate::types::HumanDuration;

/// Durable hook-delivery queue defaults.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct QueueConfig {
    /// Per-entry TTL: how long an undelivered notification is retried
    /// before it is dropped from a hook's durable backlog. Also drives the
    /// expiry sweeper's tick interval.
    pub retry_window: HumanDuration,
    /// Delay between redelivery attempts for a notification stuck at the
    /// head of a hook's queue.
    pub retry_backoff: HumanDuration,
    /// Sled tree name prefix for the durable queue's primary key space.
    pub tree_prefix: String,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            retry_window: "30s".parse().expect("valid literal"),
            retry_backoff: "500ms".parse().expect("valid literal"),
            tree_prefix: "hook:log".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn defaults_match_spec_window() {
        let cfg = QueueConfig::default();
        assert_eq!(cfg.retry_window.as_duration(), Duration::from_secs(30));
        assert_eq!(cfg.retry_backoff.as_duration(), Duration::from_millis(500));
        assert_eq!(cfg.tree_prefix, "hook:log");
    }

    #[test]
    fn overrides_from_toml() {
        let toml = r#"
retry_window = "30m"
retry_backoff = "2s"
"#;
        let cfg: QueueConfig = toml::from_str(toml).unwrap();
        assert_eq!(cfg.retry_window.as_duration(), Duration::from_secs(1800));
        assert_eq!(cfg.tree_prefix, "hook:log");
    }
}
