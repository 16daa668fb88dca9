mod signal;
mod types;

use std::sync::Arc;

use orion_error::op_context;
use orion_error::prelude::*;
use tokio_util::sync::CancellationToken;

use gf_config::GfConfig;

use crate::command_log::FileCommandLog;
use crate::error::{RuntimeReason, RuntimeResult};
use crate::queue::DurableQueue;
use crate::state::GfServer;
use crate::sweeper::run_sweeper;
use crate::transport::{LocalTransport, TransportRegistry};

pub use signal::wait_for_signal;

use types::TaskGroup;

/// Manages the full lifecycle of the fence server: bootstrap, run, and
/// graceful shutdown.
///
/// Task groups are stored in start order and joined in reverse (LIFO)
/// during [`wait`](Self::wait): the sweeper stops first (new expiries stop
/// being detected), then per-hook dispatchers are given a last chance to
/// drain whatever is already queued.
pub struct Reactor {
    cancel: CancellationToken,
    groups: Vec<TaskGroup>,
    server: Arc<GfServer>,
}

impl Reactor {
    /// Bootstrap the server from a loaded [`GfConfig`]: open the durable
    /// queue, build the transport registry, construct the server, and spawn
    /// the expiry sweeper. Per-hook dispatchers are spawned lazily by the
    /// server itself as hooks are installed (see
    /// [`GfServer::set_hook`](crate::state::GfServer)), since `SETHOOK` can
    /// arrive long after boot.
    #[tracing::instrument(name = "reactor.start", skip_all, fields(listen = %config.server.listen))]
    pub async fn start(config: &GfConfig) -> RuntimeResult<Self> {
        let mut op = op_context!("reactor-bootstrap").with_auto_log();
        op.record("listen", config.server.listen.as_str());

        let cancel = CancellationToken::new();

        std::fs::create_dir_all(&config.server.data_dir).map_err(|e| {
            StructError::from(RuntimeReason::Bootstrap)
                .with_detail(format!("creating data dir {}: {e}", config.server.data_dir.display()))
        })?;

        let queue = Arc::new(DurableQueue::open(
            config.server.data_dir.join("queue"),
            config.queue.tree_prefix.clone(),
        )?);
        let transports = Arc::new(TransportRegistry::new(
            Arc::new(LocalTransport::new()),
            config.endpoints.clone(),
        ));
        let command_log = Arc::new(FileCommandLog::open(
            config.server.data_dir.join("commands.log"),
        )?);

        let server = Arc::new(GfServer::new(
            queue,
            transports,
            command_log,
            config.queue.retry_backoff.as_duration(),
            config.queue.retry_window.as_duration(),
            cancel.child_token(),
        ));

        let mut groups: Vec<TaskGroup> = Vec::with_capacity(1);
        let mut sweeper_group = TaskGroup::new("sweeper");
        sweeper_group.push(tokio::spawn(run_sweeper(
            server.clone(),
            config.queue.retry_window.as_duration(),
            cancel.child_token(),
        )));
        groups.push(sweeper_group);

        gf_info!(sys, listen = %config.server.listen, "reactor bootstrap complete");
        op.mark_suc();
        Ok(Self {
            cancel,
            groups,
            server,
        })
    }

    /// The server handle commands are dispatched against.
    pub fn server(&self) -> Arc<GfServer> {
        self.server.clone()
    }

    /// Request graceful shutdown of all tasks.
    pub fn shutdown(&self) {
        gf_info!(sys, "initiating graceful shutdown");
        self.cancel.cancel();
    }

    /// Wait for all task groups to complete after shutdown, then join
    /// whatever per-hook dispatchers the server spawned along the way.
    pub async fn wait(mut self) -> RuntimeResult<()> {
        while let Some(group) = self.groups.pop() {
            let name = group.name;
            gf_debug!(sys, task_group = name, "waiting for task group to finish");
            group.wait().await?;
            gf_debug!(sys, task_group = name, "task group finished");
        }

        for handle in self.server.drain_dispatcher_handles() {
            handle
                .await
                .map_err(|e| {
                    StructError::from(RuntimeReason::Shutdown)
                        .with_detail(format!("dispatcher join error: {e}"))
                })?
                .owe(RuntimeReason::Shutdown)?;
        }
        Ok(())
    }

    /// Returns a clone of the root cancellation token (for signal integration).
    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }
}
