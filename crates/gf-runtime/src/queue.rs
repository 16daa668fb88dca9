use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use orion_error::prelude::*;
use serde::{Deserialize, Serialize};

use gf_core::Notification;

use crate::error::{RuntimeReason, RuntimeResult};

/// One durable delivery attempt: a single `(hook, endpoint)` pair queued
/// from a [`Notification`] that fanned out to multiple endpoints.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueEntry {
    pub hook_name: String,
    pub endpoint: String,
    pub channel: bool,
    pub body: String,
    pub enqueued_at_ms: u64,
}

/// Sled-backed durable queue for hook/channel deliveries.
///
/// Each hook gets its own tree (`{prefix}:{hook_name}`) so a dispatcher task
/// can drain exactly its own hook's backlog without scanning unrelated
/// entries; entries are keyed by a big-endian monotonic sequence number so
/// `Tree::iter()` yields them in FIFO order.
pub struct DurableQueue {
    db: sled::Db,
    tree_prefix: String,
    next_seq: AtomicU64,
}

impl DurableQueue {
    pub fn open(path: impl AsRef<Path>, tree_prefix: impl Into<String>) -> RuntimeResult<Self> {
        let db = sled::open(path.as_ref()).map_err(|e| {
            StructError::from(RuntimeReason::Queue(format!(
                "failed to open queue at {}: {e}",
                path.as_ref().display()
            )))
        })?;
        Ok(Self {
            db,
            tree_prefix: tree_prefix.into(),
            next_seq: AtomicU64::new(0),
        })
    }

    fn tree_name(&self, hook_name: &str) -> String {
        format!("{}:{}", self.tree_prefix, hook_name)
    }

    fn tree(&self, hook_name: &str) -> RuntimeResult<sled::Tree> {
        self.db
            .open_tree(self.tree_name(hook_name))
            .map_err(|e| StructError::from(RuntimeReason::Queue(format!("open_tree: {e}"))))
    }

    /// Enqueue one entry per endpoint named on the notification.
    pub fn enqueue(&self, notification: &Notification) -> RuntimeResult<()> {
        let now_ms = now_ms();
        let tree = self.tree(&notification.hook_name)?;
        for endpoint in &notification.endpoints {
            let seq = self.next_seq.fetch_add(1, Ordering::Relaxed);
            let entry = QueueEntry {
                hook_name: notification.hook_name.clone(),
                endpoint: endpoint.clone(),
                channel: notification.channel,
                body: notification.body.clone(),
                enqueued_at_ms: now_ms,
            };
            let value = serde_json::to_vec(&entry)
                .map_err(|e| StructError::from(RuntimeReason::Queue(format!("encode: {e}"))))?;
            tree.insert(seq.to_be_bytes(), value)
                .map_err(|e| StructError::from(RuntimeReason::Queue(format!("insert: {e}"))))?;
        }
        Ok(())
    }

    /// Return all undelivered entries for a hook, oldest first.
    pub fn drain(&self, hook_name: &str) -> RuntimeResult<Vec<(u64, QueueEntry)>> {
        let tree = self.tree(hook_name)?;
        let mut out = Vec::new();
        for item in tree.iter() {
            let (key, value) = item
                .map_err(|e| StructError::from(RuntimeReason::Queue(format!("iter: {e}"))))?;
            let seq = u64::from_be_bytes(key.as_ref().try_into().map_err(|_| {
                StructError::from(RuntimeReason::Queue("corrupt queue key".to_string()))
            })?);
            let entry: QueueEntry = serde_json::from_slice(&value)
                .map_err(|e| StructError::from(RuntimeReason::Queue(format!("decode: {e}"))))?;
            out.push((seq, entry));
        }
        Ok(out)
    }

    /// Drain a hook's backlog and drop (without delivering) any entry whose
    /// adjusted TTL has already elapsed. The dropped count is reported so
    /// the caller can log the loss.
    pub fn drain_live(&self, hook_name: &str, ttl: Duration) -> RuntimeResult<(Vec<(u64, QueueEntry)>, usize)> {
        let entries = self.drain(hook_name)?;
        let now_ms = now_ms();
        let mut live = Vec::with_capacity(entries.len());
        let mut dropped = 0;
        for (seq, entry) in entries {
            if entry_age(&entry, now_ms) >= ttl {
                self.ack(hook_name, seq)?;
                dropped += 1;
            } else {
                live.push((seq, entry));
            }
        }
        Ok((live, dropped))
    }

    /// Acknowledge (remove) a successfully delivered entry.
    pub fn ack(&self, hook_name: &str, seq: u64) -> RuntimeResult<()> {
        let tree = self.tree(hook_name)?;
        tree.remove(seq.to_be_bytes())
            .map_err(|e| StructError::from(RuntimeReason::Queue(format!("remove: {e}"))))?;
        Ok(())
    }

    /// Number of undelivered entries queued for a hook.
    pub fn depth(&self, hook_name: &str) -> usize {
        self.tree(hook_name).map(|t| t.len()).unwrap_or(0)
    }

    /// Drop an entire hook's backlog (called on DELHOOK/PDELHOOK so a
    /// deleted hook's queue does not linger forever).
    pub fn purge_hook(&self, hook_name: &str) -> RuntimeResult<()> {
        self.db
            .drop_tree(self.tree_name(hook_name))
            .map_err(|e| StructError::from(RuntimeReason::Queue(format!("drop_tree: {e}"))))?;
        Ok(())
    }

    /// Sum of backlog depth across every hook tree currently open.
    pub fn total_depth(&self) -> usize {
        self.db
            .tree_names()
            .into_iter()
            .filter(|name| name.starts_with(self.tree_prefix.as_bytes()))
            .filter_map(|name| self.db.open_tree(name).ok())
            .map(|t| t.len())
            .sum()
    }
}

fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

/// Age of an entry relative to `now_ms`, saturating to zero for clock skew.
fn entry_age(entry: &QueueEntry, now_ms: u64) -> Duration {
    Duration::from_millis(now_ms.saturating_sub(entry.enqueued_at_ms))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn notif(hook: &str, endpoints: &[&str]) -> Notification {
        Notification {
            hook_name: hook.to_string(),
            endpoints: endpoints.iter().map(|s| s.to_string()).collect(),
            channel: false,
            body: format!("{{\"hook\":\"{hook}\"}}"),
        }
    }

    #[test]
    fn enqueue_then_drain_is_fifo() {
        let dir = tempfile::tempdir().unwrap();
        let q = DurableQueue::open(dir.path(), "hook:log").unwrap();
        q.enqueue(&notif("geofence1", &["local://a"])).unwrap();
        q.enqueue(&notif("geofence1", &["local://a"])).unwrap();

        let drained = q.drain("geofence1").unwrap();
        assert_eq!(drained.len(), 2);
        assert!(drained[0].0 < drained[1].0);
    }

    #[test]
    fn ack_removes_entry() {
        let dir = tempfile::tempdir().unwrap();
        let q = DurableQueue::open(dir.path(), "hook:log").unwrap();
        q.enqueue(&notif("geofence1", &["local://a"])).unwrap();
        let (seq, _) = q.drain("geofence1").unwrap().remove(0);
        q.ack("geofence1", seq).unwrap();
        assert_eq!(q.depth("geofence1"), 0);
    }

    #[test]
    fn multi_endpoint_fanout_enqueues_one_entry_each() {
        let dir = tempfile::tempdir().unwrap();
        let q = DurableQueue::open(dir.path(), "hook:log").unwrap();
        q.enqueue(&notif("geofence1", &["local://a", "local://b"]))
            .unwrap();
        assert_eq!(q.depth("geofence1"), 2);
    }

    #[test]
    fn purge_hook_drops_backlog() {
        let dir = tempfile::tempdir().unwrap();
        let q = DurableQueue::open(dir.path(), "hook:log").unwrap();
        q.enqueue(&notif("geofence1", &["local://a"])).unwrap();
        q.purge_hook("geofence1").unwrap();
        assert_eq!(q.depth("geofence1"), 0);
    }

    #[test]
    fn drain_live_keeps_fresh_entries() {
        let dir = tempfile::tempdir().unwrap();
        let q = DurableQueue::open(dir.path(), "hook:log").unwrap();
        q.enqueue(&notif("geofence1", &["local://a"])).unwrap();
        let (live, dropped) = q.drain_live("geofence1", Duration::from_secs(30)).unwrap();
        assert_eq!(live.len(), 1);
        assert_eq!(dropped, 0);
        assert_eq!(q.depth("geofence1"), 1);
    }

    #[test]
    fn drain_live_drops_entries_past_ttl() {
        let dir = tempfile::tempdir().unwrap();
        let q = DurableQueue::open(dir.path(), "hook:log").unwrap();
        q.enqueue(&notif("geofence1", &["local://a"])).unwrap();
        let (seq, mut entry) = q.drain("geofence1").unwrap().remove(0);
        entry.enqueued_at_ms = 0;
        let value = serde_json::to_vec(&entry).unwrap();
        q.tree("geofence1")
            .unwrap()
            .insert(seq.to_be_bytes(), value)
            .unwrap();

        let (live, dropped) = q.drain_live("geofence1", Duration::from_secs(30)).unwrap();
        assert!(live.is_empty());
        assert_eq!(dropped, 1);
        assert_eq!(q.depth("geofence1"), 0);
    }
}
