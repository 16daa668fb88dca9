use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, SystemTime};

use parking_lot::{Mutex, RwLock};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use gf_core::{
    CollectionTable, CoreResult, HookDef, HookRegistry, MutationEvent, Notification, Object,
    ServerStats, SetOutcome,
};
use gf_lang::{NullScriptEngine, ScriptCache, ScriptEngine};

use crate::command_log::CommandLog;
use crate::dispatcher::{run_dispatcher, DispatchWake};
use crate::error::RuntimeResult;
use crate::queue::DurableQueue;
use crate::transport::TransportRegistry;

/// Everything mutated under the server's single write lock: the collection
/// table and the hook/channel registry. Kept as one struct so `set`/`del`
/// paths take a single lock rather than two independently-ordered ones.
#[derive(Default)]
struct World {
    collections: CollectionTable,
    hooks: HookRegistry,
}

/// Top-level server state: owns the write lock, the durable queue, the
/// transport registry, and the wake channels that let a mutation nudge the
/// right hook's dispatcher loop without it having to poll.
pub struct GfServer {
    world: RwLock<World>,
    queue: Arc<DurableQueue>,
    transports: Arc<TransportRegistry>,
    command_log: Arc<dyn CommandLog>,
    engine: Box<dyn ScriptEngine>,
    script_cache: ScriptCache,
    wakes: Mutex<HashMap<String, DispatchWake>>,
    /// Per-hook dispatcher tasks, spawned lazily the first time a hook with
    /// that name is installed. `SETHOOK` can arrive long after boot, so
    /// there is no fixed startup-time set to spawn ahead of time.
    dispatchers: Mutex<HashMap<String, JoinHandle<anyhow::Result<()>>>>,
    retry_backoff: Duration,
    /// Per-entry durable-queue TTL: an undelivered notification older than
    /// this is dropped rather than retried forever.
    queue_ttl: Duration,
    dispatch_cancel: CancellationToken,
}

impl GfServer {
    pub fn new(
        queue: Arc<DurableQueue>,
        transports: Arc<TransportRegistry>,
        command_log: Arc<dyn CommandLog>,
        retry_backoff: Duration,
        queue_ttl: Duration,
        dispatch_cancel: CancellationToken,
    ) -> Self {
        Self {
            world: RwLock::new(World::default()),
            queue,
            transports,
            command_log,
            engine: Box::new(NullScriptEngine),
            script_cache: ScriptCache::new(),
            wakes: Mutex::new(HashMap::new()),
            dispatchers: Mutex::new(HashMap::new()),
            retry_backoff,
            queue_ttl,
            dispatch_cancel,
        }
    }

    /// Spawn this hook's delivery loop if it isn't already running. Called
    /// from `set_hook` so a hook created at runtime starts draining
    /// immediately, without the reactor needing to know about it ahead of
    /// time.
    fn ensure_dispatcher(&self, hook_name: &str) {
        let mut dispatchers = self.dispatchers.lock();
        if dispatchers.contains_key(hook_name) {
            return;
        }
        let (wake_tx, wake_rx) = mpsc::channel(8);
        self.register_wake(hook_name.to_string(), wake_tx);
        let handle = tokio::spawn(run_dispatcher(
            hook_name.to_string(),
            self.queue.clone(),
            self.transports.clone(),
            wake_rx,
            self.retry_backoff,
            self.queue_ttl,
            self.dispatch_cancel.child_token(),
        ));
        dispatchers.insert(hook_name.to_string(), handle);
    }

    pub fn with_script_engine(mut self, engine: Box<dyn ScriptEngine>) -> Self {
        self.engine = engine;
        self
    }

    pub fn transports(&self) -> Arc<TransportRegistry> {
        self.transports.clone()
    }

    pub fn command_log(&self) -> Arc<dyn CommandLog> {
        self.command_log.clone()
    }

    /// Register the wake sender a hook's dispatcher task is listening on,
    /// so fence transitions against that hook can nudge it immediately
    /// instead of waiting for its periodic poll.
    pub fn register_wake(&self, hook_name: impl Into<String>, wake: DispatchWake) {
        self.wakes.lock().insert(hook_name.into(), wake);
    }

    pub fn unregister_wake(&self, hook_name: &str) {
        self.wakes.lock().remove(hook_name);
    }

    fn nudge(&self, hook_name: &str) {
        if let Some(tx) = self.wakes.lock().get(hook_name) {
            let _ = tx.try_send(());
        }
    }

    pub fn queue(&self) -> &DurableQueue {
        &self.queue
    }

    pub fn stats(&self) -> ServerStats {
        let world = self.world.read();
        gf_core::server_stats(&world.collections, &world.hooks)
    }

    /// SET — insert/replace an object, evaluate fences against the mutation,
    /// and durably enqueue + wake any hooks that fired.
    pub fn set_object(&self, collection: &str, object: Object) -> RuntimeResult<()> {
        let mut world = self.world.write();
        let old = world.collections.get(collection).and_then(|c| c.get(&object.id)).cloned();
        let key = object.id.clone();
        world.collections.get_or_create(collection).set(object.clone());

        let event = MutationEvent {
            command: "set",
            key: &key,
            old: old.as_ref(),
            new: Some(&object),
        };
        self.react(&world.hooks, &event)?;
        Ok(())
    }

    /// DEL — remove an object and evaluate fences for the "now gone" edge.
    pub fn del_object(&self, collection: &str, id: &str) -> RuntimeResult<bool> {
        let mut world = self.world.write();
        let Some(old) = world
            .collections
            .get_or_create(collection)
            .remove(id)
        else {
            return Ok(false);
        };
        let event = MutationEvent {
            command: "del",
            key: id,
            old: Some(&old),
            new: None,
        };
        self.react(&world.hooks, &event)?;
        Ok(true)
    }

    pub fn set_hook(&self, def: HookDef) -> CoreResult<SetOutcome> {
        let name = def.name.clone();
        let outcome = self.world.write().hooks.set(def)?;
        self.ensure_dispatcher(&name);
        Ok(outcome)
    }

    pub fn del_hook(&self, name: &str, channel: bool) -> RuntimeResult<bool> {
        let removed = self.world.write().hooks.delete(name, channel);
        if removed {
            self.queue.purge_hook(name)?;
            self.unregister_wake(name);
            if let Some(handle) = self.dispatchers.lock().remove(name) {
                handle.abort();
            }
        }
        Ok(removed)
    }

    /// Take ownership of all spawned dispatcher handles so the reactor can
    /// join them during shutdown. Leaves the registry empty; safe to call
    /// once, at shutdown time only.
    pub fn drain_dispatcher_handles(&self) -> Vec<JoinHandle<anyhow::Result<()>>> {
        self.dispatchers.lock().drain().map(|(_, h)| h).collect()
    }

    /// Periodic sweep: object TTLs, hook TTLs, and (future) dwell
    /// re-emission all run under one write-lock acquisition so a sweep is
    /// atomic with respect to concurrent SET/DEL commands.
    pub fn sweep(&self, now: SystemTime) -> RuntimeResult<()> {
        let mut world = self.world.write();
        let expired_objects = world.collections.sweep_expired(now);
        for (_collection, obj) in &expired_objects {
            let event = MutationEvent {
                command: "expire",
                key: &obj.id,
                old: Some(obj),
                new: None,
            };
            self.react(&world.hooks, &event)?;
        }

        let expired_hooks = world.hooks.sweep_expired(now);
        for hook in expired_hooks {
            self.queue.purge_hook(&hook.name)?;
            self.unregister_wake(&hook.name);
            if let Some(handle) = self.dispatchers.lock().remove(&hook.name) {
                handle.abort();
            }
            let record = if hook.channel {
                format!("DELCHAN {}", hook.name)
            } else {
                format!("DELHOOK {}", hook.name)
            };
            self.command_log.append(record.as_bytes())?;
        }
        Ok(())
    }

    /// Run a parsed query against the current collection table. Exposed so
    /// `Dispatch` can share the server's lock instead of each caller taking
    /// its own snapshot.
    pub fn execute_query(&self, tokens: gf_lang::SearchTokens) -> CoreResult<gf_core::QueryOutcome> {
        let world = self.world.read();
        gf_core::execute_query(tokens, &world.collections, self.engine.as_ref(), Some(&self.script_cache))
    }

    /// Read-only lookup used by `GET`; avoids handing out a reference that
    /// would outlive the read-lock guard.
    pub fn with_object<T>(&self, collection: &str, id: &str, f: impl FnOnce(&Object) -> T) -> Option<T> {
        let world = self.world.read();
        world.collections.get(collection).and_then(|c| c.get(id)).map(f)
    }

    fn react(&self, hooks: &HookRegistry, event: &MutationEvent) -> RuntimeResult<()> {
        let notes: Vec<Notification> =
            gf_core::evaluate_fences(hooks, event, self.engine.as_ref(), Some(&self.script_cache))?;
        for note in &notes {
            self.queue.enqueue(note)?;
            self.nudge(&note.hook_name);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::command_log::FileCommandLog;
    use crate::transport::LocalTransport;
    use gf_core::HookDef;
    use gf_lang::{parse_command, Command};

    fn test_server(log_path: &std::path::Path) -> GfServer {
        let dir = tempfile::tempdir().unwrap();
        let queue = Arc::new(DurableQueue::open(dir.path(), "hook:log").unwrap());
        let transports = Arc::new(TransportRegistry::new(
            Arc::new(LocalTransport::new()),
            gf_config::EndpointsConfig::default(),
        ));
        let command_log = Arc::new(FileCommandLog::open(log_path).unwrap());
        GfServer::new(
            queue,
            transports,
            command_log,
            Duration::from_millis(10),
            Duration::from_secs(30),
            CancellationToken::new(),
        )
    }

    fn expiring_hook(name: &str) -> HookDef {
        let toks: Vec<String> = "POINT 33.5 -112.1 500 FENCE"
            .split_whitespace()
            .map(String::from)
            .collect();
        HookDef {
            name: name.to_string(),
            key: "fleet".to_string(),
            endpoints: vec!["http://example.com/hook".to_string()],
            fence: parse_command(Command::Nearby, "fleet", &toks).unwrap(),
            message: vec![],
            metas: vec![],
            channel: false,
            expires_at: Some(SystemTime::now()),
        }
    }

    #[tokio::test]
    async fn sweep_logs_synthesized_delhook_on_expiry() {
        let dir = tempfile::tempdir().unwrap();
        let log_path = dir.path().join("commands.log");
        let server = test_server(&log_path);
        server.set_hook(expiring_hook("h2")).unwrap();

        server
            .sweep(SystemTime::now() + Duration::from_secs(1))
            .unwrap();

        let content = std::fs::read_to_string(&log_path).unwrap();
        assert!(content.contains("DELHOOK h2"));
    }
}
