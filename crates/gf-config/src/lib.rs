pub mod endpoints;
pub mod logging;
pub mod queue;
pub mod server;
pub mod types;
mod validate;

use std::path::Path;
use std::str::FromStr;

use serde::Deserialize;

pub use endpoints::EndpointsConfig;
pub use logging::{LogFormat, LoggingConfig};
pub use queue::QueueConfig;
pub use server::ServerConfig;
pub use types::HumanDuration;

#[derive(Debug, Deserialize, Default)]
#[serde(default)]
struct GfConfigRaw {
    server: Option<ServerConfig>,
    logging: LoggingConfig,
    queue: QueueConfig,
    endpoints: EndpointsConfig,
}

/// Resolved, validated server configuration.
#[derive(Debug)]
pub struct GfConfig {
    pub server: ServerConfig,
    pub logging: LoggingConfig,
    pub queue: QueueConfig,
    pub endpoints: EndpointsConfig,
}

impl GfConfig {
    /// Read and parse a `gfconfig.toml` file.
    pub fn load(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path.as_ref())
            .map_err(|e| anyhow::anyhow!("failed to read {}: {e}", path.as_ref().display()))?;
        content.parse()
    }
}

impl FromStr for GfConfig {
    type Err = anyhow::Error;

    fn from_str(toml_str: &str) -> anyhow::Result<Self> {
        let raw: GfConfigRaw = toml::from_str(toml_str)?;
        let server = raw
            .server
            .ok_or_else(|| anyhow::anyhow!("missing required [server] section"))?;

        let config = GfConfig {
            server,
            logging: raw.logging,
            queue: raw.queue,
            endpoints: raw.endpoints,
        };

        validate::validate(&config)?;

        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const FULL_TOML: &str = r#"
[server]
listen = "tcp://127.0.0.1:9851"
data_dir = "/var/lib/gf"

[logging]
level = "info"
format = "plain"

[queue]
retry_window = "1h"
retry_backoff = "500ms"

[endpoints]
kafka = false
"#;

    #[test]
    fn load_full_toml() {
        let cfg: GfConfig = FULL_TOML.parse().unwrap();
        assert_eq!(cfg.server.listen, "tcp://127.0.0.1:9851");
        assert_eq!(cfg.logging.level, "info");
        assert_eq!(cfg.queue.tree_prefix, "hook:log");
        assert!(!cfg.endpoints.is_enabled("kafka"));
        assert!(cfg.endpoints.is_enabled("http"));
    }

    #[test]
    fn missing_server_fails() {
        let toml = r#"
[logging]
level = "info"
"#;
        assert!(toml.parse::<GfConfig>().is_err());
    }

    #[test]
    fn defaults_apply_when_sections_omitted() {
        let toml = r#"
[server]
listen = "tcp://0.0.0.0:9851"
"#;
        let cfg: GfConfig = toml.parse().unwrap();
        assert_eq!(cfg.logging.level, "info");
        assert_eq!(cfg.queue.retry_backoff.as_duration().as_millis(), 500);
    }
}
