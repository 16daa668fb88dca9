use tokio::task::JoinHandle;

use orion_error::prelude::*;

use crate::error::{RuntimeReason, RuntimeResult};

// ---------------------------------------------------------------------------
// TaskGroup — named collection of async tasks for ordered shutdown
// ---------------------------------------------------------------------------

/// A named group of async tasks that are shut down together.
///
/// Groups are assembled in *start order* and joined in *reverse order*
/// (LIFO) during shutdown:
///
///   start: sweeper → dispatchers → receiver
///   join:  receiver → dispatchers → sweeper
///
/// The receiver stops taking new connections first; once it has drained,
/// per-hook dispatchers are allowed to finish delivering whatever is left
/// in their queues, and only then does the expiry/dwell sweeper stop.
pub(crate) struct TaskGroup {
    pub(super) name: &'static str,
    handles: Vec<JoinHandle<anyhow::Result<()>>>,
}

impl TaskGroup {
    pub(super) fn new(name: &'static str) -> Self {
        Self {
            name,
            handles: Vec::new(),
        }
    }

    pub(super) fn push(&mut self, handle: JoinHandle<anyhow::Result<()>>) {
        self.handles.push(handle);
    }

    /// Join all tasks in this group, returning the first error.
    pub(super) async fn wait(self) -> RuntimeResult<()> {
        for handle in self.handles {
            handle
                .await
                .map_err(|e| {
                    StructError::from(RuntimeReason::Shutdown)
                        .with_detail(format!("task join error: {e}"))
                })?
                .owe(RuntimeReason::Shutdown)?;
        }
        Ok(())
    }
}
