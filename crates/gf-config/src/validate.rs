use std::net::ToSocketAddrs;

use crate::GfConfig;

/// Internal validation, called automatically during `GfConfig::from_str` / `load`.
pub(crate) fn validate(config: &GfConfig) -> anyhow::Result<()> {
    let addr = config
        .server
        .listen
        .strip_prefix("tcp://")
        .ok_or_else(|| {
            anyhow::anyhow!(
                "server.listen must start with \"tcp://\", got {:?}",
                config.server.listen,
            )
        })?;
    if addr.to_socket_addrs().is_err() {
        anyhow::bail!("server.listen resolved to no socket address: {addr:?}");
    }

    if config.queue.retry_window.as_duration() < config.queue.retry_backoff.as_duration() {
        anyhow::bail!("queue.retry_window must be >= queue.retry_backoff");
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn rejects_non_tcp_listen() {
        let toml = r#"
[server]
listen = "http://127.0.0.1:9851"
"#;
        assert!(GfConfig::from_str(toml).is_err());
    }

    #[test]
    fn rejects_window_shorter_than_backoff() {
        let toml = r#"
[server]
listen = "tcp://127.0.0.1:9851"
[queue]
retry_window = "1s"
retry_backoff = "2s"
"#;
        assert!(GfConfig::from_str(toml).is_err());
    }
}
