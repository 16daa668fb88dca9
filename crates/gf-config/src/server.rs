use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Listen address and on-disk data directory for a running server.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServerConfig {
    /// `tcp://host:port` RESP listener address.
    pub listen: String,
    /// Base directory for the durable queue and command log.
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,
}

fn default_data_dir() -> PathBuf {
    PathBuf::from("./data")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_listen_and_default_data_dir() {
        let toml = r#"listen = "tcp://127.0.0.1:9851""#;
        let cfg: ServerConfig = toml::from_str(toml).unwrap();
        assert_eq!(cfg.listen, "tcp://127.0.0.1:9851");
        assert_eq!(cfg.data_dir, PathBuf::from("./data"));
    }

    #[test]
    fn parses_explicit_data_dir() {
        let toml = r#"
listen = "tcp://0.0.0.0:9851"
data_dir = "/var/lib/gf"
"#;
        let cfg: ServerConfig = toml::from_str(toml).unwrap();
        assert_eq!(cfg.data_dir, PathBuf::from("/var/lib/gf"));
    }
}
