//! Request dispatch with per-partition ordering and bounded concurrency.
//!
//! Each request runs in its own task. A task waits for its predecessor in
//! the same partition to have queued its response, then for a concurrency
//! permit, then runs the handler and queues the response. Responses of one
//! partition therefore reach the writer in arrival order, while different
//! partitions only contend for permits.

use super::handler::ReverseCallHandler;
use revcall_core::{PartitionKey, ReverseCallProtocol};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::oneshot::error::TryRecvError;
use tokio::sync::{mpsc, oneshot, Semaphore};
use tokio::task::{JoinError, JoinSet};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Finished lanes are swept once this many partitions are tracked.
const LANE_SWEEP_THRESHOLD: usize = 256;

pub(crate) struct Dispatcher<P: ReverseCallProtocol, H> {
    protocol: Arc<P>,
    handler: Arc<H>,
    outbound: mpsc::Sender<P::ClientMessage>,
    permits: Arc<Semaphore>,
    stop: CancellationToken,
    /// Completion signal of the most recent request per partition.
    lanes: HashMap<PartitionKey, oneshot::Receiver<()>>,
    tasks: JoinSet<()>,
}

impl<P, H> Dispatcher<P, H>
where
    P: ReverseCallProtocol,
    H: ReverseCallHandler<P>,
{
    pub fn new(
        protocol: Arc<P>,
        handler: Arc<H>,
        outbound: mpsc::Sender<P::ClientMessage>,
        max_concurrency: usize,
        stop: CancellationToken,
    ) -> Self {
        Self {
            protocol,
            handler,
            outbound,
            permits: Arc::new(Semaphore::new(max_concurrency.max(1))),
            stop,
            lanes: HashMap::new(),
            tasks: JoinSet::new(),
        }
    }

    pub fn in_flight(&self) -> usize {
        self.tasks.len()
    }

    /// Start handling `request`.
    pub fn dispatch(&mut self, request: P::Request) {
        let partition = self.handler.partition_key(&request);
        let context = self.protocol.context_of(&request).clone();
        let call_id = context.call_id;

        if self.lanes.len() >= LANE_SWEEP_THRESHOLD {
            self.lanes
                .retain(|_, done| matches!(done.try_recv(), Err(TryRecvError::Empty)));
        }
        let (done_tx, done_rx) = oneshot::channel();
        let previous = self.lanes.insert(partition.clone(), done_rx);

        let protocol = self.protocol.clone();
        let handler = self.handler.clone();
        let outbound = self.outbound.clone();
        let permits = self.permits.clone();
        let stop = self.stop.clone();

        debug!(%call_id, %partition, "Dispatching request");
        self.tasks.spawn(async move {
            if let Some(previous) = previous {
                // An error means the predecessor was torn down; nothing to wait for.
                let _ = previous.await;
            }
            let Ok(_permit) = permits.acquire().await else {
                return;
            };

            let mut response = handler.handle(request, context.clone(), stop).await;
            protocol.set_response_context(&mut response, context.into());
            if outbound.send(protocol.wrap_response(response)).await.is_err() {
                warn!(%call_id, "Outbound writer stopped, response dropped");
            } else {
                debug!(%call_id, "Response queued");
            }
            let _ = done_tx.send(());
        });
    }

    /// Wait for the next handler task to end. `None` when none is running.
    pub async fn join_next(&mut self) -> Option<Result<(), JoinError>> {
        self.tasks.join_next().await
    }

    /// Let in-flight handlers finish for up to `timeout`, then abort the rest.
    /// Returns whether every handler finished.
    pub async fn drain(&mut self, timeout: Duration) -> bool {
        if self.tasks.is_empty() {
            return true;
        }
        debug!(in_flight = self.tasks.len(), "Draining in-flight handlers");
        let tasks = &mut self.tasks;
        let drained = tokio::time::timeout(timeout, async {
            while let Some(joined) = tasks.join_next().await {
                if let Err(e) = joined {
                    if e.is_panic() {
                        warn!("Request handler panicked while draining");
                    }
                }
            }
        })
        .await
        .is_ok();

        if !drained {
            warn!(
                remaining = self.tasks.len(),
                "Drain timeout elapsed, aborting in-flight handlers"
            );
            self.tasks.shutdown().await;
        }
        drained
    }

    /// Abort every in-flight handler and wait until they are gone.
    pub async fn abort(mut self) {
        if !self.tasks.is_empty() {
            debug!(in_flight = self.tasks.len(), "Aborting in-flight handlers");
        }
        self.tasks.shutdown().await;
    }
}
