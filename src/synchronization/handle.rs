use std::{sync::Arc, time::Duration};

use log::debug;
use tokio::{
    sync::{mpsc, oneshot},
    time::{self, Instant, MissedTickBehavior},
};
use tokio_util::sync::CancellationToken;

use super::SyncMsg;
use crate::{
    error::{FedErr, Result},
    id::WorkerId,
    model::ModelState,
};

const MIN_POLL_INTERVAL: Duration = Duration::from_millis(1);

/// A worker's end of the synchronization coordinator.
#[derive(Debug, Clone)]
pub struct SyncHandle {
    worker: WorkerId,
    tx: mpsc::UnboundedSender<SyncMsg>,
    stop: CancellationToken,
    poll_interval: Duration,
}

impl SyncHandle {
    /// Creates a new `SyncHandle`.
    ///
    /// # Arguments
    /// * `worker` - The id of the worker owning this handle.
    /// * `tx` - The coordinator's message channel.
    /// * `stop` - Fires when the epoch is torn down.
    /// * `poll_interval` - How often a blocked worker logs that it is still waiting, at least
    ///   one millisecond.
    pub fn new(
        worker: WorkerId,
        tx: mpsc::UnboundedSender<SyncMsg>,
        stop: CancellationToken,
        poll_interval: Duration,
    ) -> Self {
        Self {
            worker,
            tx,
            stop,
            poll_interval: poll_interval.max(MIN_POLL_INTERVAL),
        }
    }

    pub fn worker(&self) -> WorkerId {
        self.worker
    }

    fn send(&self, msg: SyncMsg) -> Result<()> {
        self.tx
            .send(msg)
            .map_err(|_| FedErr::CoordinatorGone {
                worker: self.worker,
            })
    }

    pub fn report_progress(&self, batch: usize, total: usize) -> Result<()> {
        self.send(SyncMsg::Progress {
            worker: self.worker,
            batch,
            total,
        })
    }

    /// Publishes `model` and blocks until the coordinator releases the barrier.
    ///
    /// # Arguments
    /// * `batch` - The index of the batch the worker is about to train on.
    /// * `model` - The worker's current parameters.
    /// * `loss` - The running loss at this point.
    ///
    /// # Returns
    /// The merged model of the round this worker joined, `CoordinatorGone` if the coordinator
    /// stopped without releasing it, or `Cancelled` if the stop signal fired first.
    pub async fn synchronize(
        &self,
        batch: usize,
        model: ModelState,
        loss: f32,
    ) -> Result<Arc<ModelState>> {
        let (reply, mut rx) = oneshot::channel();

        self.send(SyncMsg::Submit {
            worker: self.worker,
            batch,
            model,
            loss,
            reply,
        })?;

        let start = Instant::now();
        let mut ticker = time::interval_at(start + self.poll_interval, self.poll_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                biased;
                merged = &mut rx => {
                    return merged.map_err(|_| FedErr::CoordinatorGone { worker: self.worker });
                }
                _ = self.stop.cancelled() => {
                    return Err(FedErr::Cancelled { worker: self.worker });
                }
                _ = ticker.tick() => {
                    debug!(
                        worker = self.worker.index(), batch = batch;
                        "still waiting for the merged model after {:.1}s",
                        start.elapsed().as_secs_f64()
                    );
                }
            }
        }
    }

    /// Publishes the final model and leaves the barrier.
    pub fn finish(&self, model: ModelState, loss: f32, total: usize) -> Result<()> {
        self.send(SyncMsg::Finish {
            worker: self.worker,
            model,
            loss,
            total,
        })
    }
}
