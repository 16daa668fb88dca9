use std::sync::Arc;
use std::time::{Duration, SystemTime};

use tokio_util::sync::CancellationToken;

use crate::state::GfServer;

/// Periodic expiry sweep: object TTLs, hook TTLs, and (eventually) dwell
/// re-emission, all under one write-lock acquisition per tick.
///
/// A `tokio::time::interval` gated by `tokio::select!` against a
/// `CancellationToken`.
#[tracing::instrument(name = "sweeper.run", skip_all)]
pub async fn run_sweeper(
    server: Arc<GfServer>,
    interval: Duration,
    cancel: CancellationToken,
) -> anyhow::Result<()> {
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                gf_info!(sys, "sweeper stopping");
                break;
            }
            _ = ticker.tick() => {
                if let Err(e) = server.sweep(SystemTime::now()) {
                    gf_warn!(sys, error = %e, "sweep pass failed");
                }
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::command_log::NullCommandLog;
    use crate::queue::DurableQueue;
    use crate::transport::{LocalTransport, TransportRegistry};
    use gf_config::EndpointsConfig;
    use gf_core::Object;
    use gf_lang::Geometry;

    fn test_server() -> Arc<GfServer> {
        let dir = tempfile::tempdir().unwrap();
        let queue = Arc::new(DurableQueue::open(dir.path(), "hook:log").unwrap());
        let transports = Arc::new(TransportRegistry::new(
            Arc::new(LocalTransport::new()),
            EndpointsConfig::default(),
        ));
        Arc::new(GfServer::new(
            queue,
            transports,
            Arc::new(NullCommandLog),
            Duration::from_millis(10),
            Duration::from_secs(30),
            CancellationToken::new(),
        ))
    }

    #[test]
    fn sweep_removes_expired_object() {
        let server = test_server();
        let expired = Object::new("t1", Geometry::point(33.5, -112.1, None)).with_ttl(0);
        server.set_object("fleet", expired).unwrap();

        server
            .sweep(SystemTime::now() + Duration::from_secs(1))
            .unwrap();

        let stats = server.stats();
        assert_eq!(
            stats
                .collections
                .iter()
                .find(|(n, _)| n == "fleet")
                .map(|(_, c)| *c),
            Some(0)
        );
    }

    #[tokio::test]
    async fn run_sweeper_exits_promptly_on_cancel() {
        let server = test_server();
        let cancel = CancellationToken::new();
        cancel.cancel();
        run_sweeper(server, Duration::from_secs(60), cancel)
            .await
            .unwrap();
    }
}
