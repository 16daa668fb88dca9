use std::sync::Arc;
use std::time::{Duration, SystemTime};

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::queue::DurableQueue;
use crate::transport::TransportRegistry;

/// Wakes a hook's dispatcher loop whenever a fresh notification has been
/// enqueued for it; the loop also wakes periodically so a notification that
/// arrived just before a previous failed attempt isn't stuck until the next
/// explicit wake.
pub type DispatchWake = mpsc::Sender<()>;

/// Per-hook delivery loop: drains `queue`'s backlog for `hook_name` in FIFO
/// order, retrying the head-of-line entry with `retry_backoff` between
/// attempts so a slow/unreachable endpoint cannot reorder deliveries. An
/// entry is retried only until its age reaches `ttl`, after which it is
/// dropped so a permanently dead endpoint cannot stall the whole backlog.
///
/// Consumes the wake channel until it closes, then drains whatever is left
/// before returning.
#[tracing::instrument(name = "hook.dispatch", skip(queue, transports, wake_rx, cancel), fields(hook = %hook_name))]
pub async fn run_dispatcher(
    hook_name: String,
    queue: Arc<DurableQueue>,
    transports: Arc<TransportRegistry>,
    mut wake_rx: mpsc::Receiver<()>,
    retry_backoff: Duration,
    ttl: Duration,
    cancel: CancellationToken,
) -> anyhow::Result<()> {
    loop {
        drain_once(&hook_name, &queue, &transports, retry_backoff, ttl, &cancel).await;

        tokio::select! {
            _ = cancel.cancelled() => {
                drain_once(&hook_name, &queue, &transports, retry_backoff, ttl, &cancel).await;
                break;
            }
            woken = wake_rx.recv() => {
                if woken.is_none() {
                    drain_once(&hook_name, &queue, &transports, retry_backoff, ttl, &cancel).await;
                    break;
                }
            }
            _ = tokio::time::sleep(Duration::from_secs(1)) => {}
        }
    }
    Ok(())
}

/// Drains one pass of `hook_name`'s backlog. Entries already past `ttl` at
/// the start of the pass are dropped without an attempt; an entry that
/// starts fresh but keeps failing is retried with `retry_backoff` between
/// attempts only until its own age crosses `ttl`, at which point it is
/// dropped and the next entry in the FIFO is tried — a permanently
/// unreachable endpoint can lose its own backlog but cannot block a hook's
/// queue forever.
async fn drain_once(
    hook_name: &str,
    queue: &DurableQueue,
    transports: &TransportRegistry,
    retry_backoff: Duration,
    ttl: Duration,
    cancel: &CancellationToken,
) {
    let (entries, dropped) = match queue.drain_live(hook_name, ttl) {
        Ok(result) => result,
        Err(e) => {
            gf_warn!(hook, hook = hook_name, error = %e, "failed reading durable queue");
            return;
        }
    };
    if dropped > 0 {
        gf_warn!(hook, hook = hook_name, dropped, "dropped entries past TTL before delivery");
    }

    for (seq, entry) in entries {
        let enqueued_at = SystemTime::UNIX_EPOCH + Duration::from_millis(entry.enqueued_at_ms);
        loop {
            match transports.send(&entry.endpoint, &entry.body).await {
                Ok(()) => {
                    if let Err(e) = queue.ack(hook_name, seq) {
                        gf_warn!(hook, hook = hook_name, error = %e, "failed to ack delivered entry");
                    }
                    break;
                }
                Err(e) => {
                    let age = enqueued_at.elapsed().unwrap_or(Duration::ZERO);
                    if age >= ttl {
                        gf_warn!(
                            hook,
                            hook = hook_name,
                            endpoint = %entry.endpoint,
                            error = %e,
                            "entry exceeded TTL, dropping without delivery"
                        );
                        if let Err(e) = queue.ack(hook_name, seq) {
                            gf_warn!(hook, hook = hook_name, error = %e, "failed to drop expired entry");
                        }
                        break;
                    }
                    gf_warn!(
                        hook,
                        hook = hook_name,
                        endpoint = %entry.endpoint,
                        error = %e,
                        "delivery attempt failed, retrying"
                    );
                    if cancel.is_cancelled() {
                        return;
                    }
                    tokio::time::sleep(retry_backoff.min(ttl.saturating_sub(age))).await;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::{LocalTransport, TransportRegistry};
    use gf_config::EndpointsConfig;
    use gf_core::Notification;

    #[tokio::test]
    async fn delivers_queued_notification_to_local_sink() {
        let dir = tempfile::tempdir().unwrap();
        let queue = Arc::new(DurableQueue::open(dir.path(), "hook:log").unwrap());
        let local = Arc::new(LocalTransport::new());
        let (sink_tx, mut sink_rx) = mpsc::channel(1);
        local.register("local://sub", sink_tx);
        let transports = Arc::new(TransportRegistry::new(local, EndpointsConfig::default()));

        queue
            .enqueue(&Notification {
                hook_name: "geofence1".to_string(),
                endpoints: vec!["local://sub".to_string()],
                channel: false,
                body: "{\"hook\":\"geofence1\"}".to_string(),
            })
            .unwrap();

        let cancel = CancellationToken::new();
        let (_wake_tx, wake_rx) = mpsc::channel(1);
        cancel.cancel();
        run_dispatcher(
            "geofence1".to_string(),
            queue.clone(),
            transports,
            wake_rx,
            Duration::from_millis(10),
            Duration::from_secs(30),
            cancel,
        )
        .await
        .unwrap();

        assert_eq!(sink_rx.recv().await.unwrap(), "{\"hook\":\"geofence1\"}");
        assert_eq!(queue.depth("geofence1"), 0);
    }

    #[tokio::test]
    async fn entry_past_ttl_is_dropped_without_delivery() {
        let dir = tempfile::tempdir().unwrap();
        let queue = Arc::new(DurableQueue::open(dir.path(), "hook:log").unwrap());
        let local = Arc::new(LocalTransport::new());
        let transports = Arc::new(TransportRegistry::new(local, EndpointsConfig::default()));

        queue
            .enqueue(&Notification {
                hook_name: "geofence1".to_string(),
                endpoints: vec!["local://nobody-subscribed".to_string()],
                channel: false,
                body: "{\"hook\":\"geofence1\"}".to_string(),
            })
            .unwrap();

        let cancel = CancellationToken::new();
        let (_wake_tx, wake_rx) = mpsc::channel(1);
        cancel.cancel();
        run_dispatcher(
            "geofence1".to_string(),
            queue.clone(),
            transports,
            wake_rx,
            Duration::from_millis(1),
            Duration::from_millis(0),
            cancel,
        )
        .await
        .unwrap();

        assert_eq!(queue.depth("geofence1"), 0);
    }
}
