use std::collections::HashMap;
use std::path::PathBuf;

use serde::Deserialize;

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
    pub modules: HashMap<String, String>,
    pub file: Option<PathBuf>,
    pub format: LogFormat,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            modules: HashMap::new(),
            file: None,
            format: LogFormat::Plain,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Plain,
    Json,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_is_plain_info() {
        let cfg = LoggingConfig::default();
        assert_eq!(cfg.level, "info");
        assert_eq!(cfg.format, LogFormat::Plain);
        assert!(cfg.file.is_none());
    }

    #[test]
    fn parses_json_format() {
        let toml = r#"
level = "debug"
format = "json"
"#;
        let cfg: LoggingConfig = toml::from_str(toml).unwrap();
        assert_eq!(cfg.format, LogFormat::Json);
        assert_eq!(cfg.level, "debug");
    }

    #[test]
    fn parses_module_overrides() {
        let toml = r#"
level = "warn"
[modules]
gf_core = "debug"
gf_runtime = "trace"
"#;
        let cfg: LoggingConfig = toml::from_str(toml).unwrap();
        assert_eq!(cfg.modules.get("gf_core").map(String::as_str), Some("debug"));
    }
}
