use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// Which notification endpoint schemes are enabled, keyed by scheme name
/// without the `://` separator (`"local"`, `"http"`, `"https"`, `"log"`).
///
/// Schemes absent from the map default to enabled; set a scheme to `false`
/// to disable it without removing hooks that reference it (they simply
/// fail delivery with `RuntimeReason::UnsupportedScheme` until re-enabled).
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(transparent)]
pub struct EndpointsConfig {
    enabled: HashMap<String, bool>,
}

impl EndpointsConfig {
    pub fn is_enabled(&self, scheme: &str) -> bool {
        self.enabled.get(scheme).copied().unwrap_or(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unlisted_scheme_defaults_enabled() {
        let cfg = EndpointsConfig::default();
        assert!(cfg.is_enabled("http"));
    }

    #[test]
    fn explicit_disable_is_honored() {
        let toml = r#"kafka = false"#;
        let cfg: EndpointsConfig = toml::from_str(toml).unwrap();
        assert!(!cfg.is_enabled("kafka"));
        assert!(cfg.is_enabled("http"));
    }
}
