//! Background side of `courier serve`

use crate::context::AppContext;
use crate::error::Result;
use crate::monitoring::{setup_queue_monitoring, QueueMonitor};
use crate::processors::register_processors;
use courier_jobs::WorkerHandle;
use futures_util::future::join_all;
use std::time::Duration;

/// One running worker per queue
pub struct Workers {
    handles: Vec<WorkerHandle>,
}

impl Workers {
    pub fn len(&self) -> usize {
        self.handles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handles.is_empty()
    }

    /// Stop every worker, waiting for jobs in flight
    pub async fn shutdown(self) {
        tracing::info!("Waiting for workers to finish");
        join_all(self.handles.into_iter().map(WorkerHandle::shutdown)).await;
    }
}

/// Start listening for queue events, requeue stalled jobs, then start the workers.
///
/// Monitoring comes first so that stall events and the outcomes of the
/// first jobs are logged. Hand the returned monitor to the HTTP server.
pub async fn start_background(
    ctx: &AppContext,
    stall_timeout: Duration,
    poll_interval: Duration,
) -> Result<(QueueMonitor, Workers)> {
    let monitor = setup_queue_monitoring(&ctx.queues);

    let recovered = ctx.queues.recover_stalled(stall_timeout).await?;
    if recovered > 0 {
        tracing::warn!(count = recovered, "Requeued stalled jobs");
    }

    register_processors(ctx).await;
    let handles = ctx
        .queues
        .iter()
        .map(|(_, queue)| queue.spawn_worker(poll_interval))
        .collect();

    Ok((monitor, Workers { handles }))
}
