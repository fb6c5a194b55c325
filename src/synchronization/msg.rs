use std::sync::Arc;

use tokio::sync::oneshot;

use crate::{id::WorkerId, model::ModelState};

/// The messages a worker sends to the synchronization coordinator.
#[derive(Debug)]
pub enum SyncMsg {
    /// The worker is about to train on batch `batch` out of `total`.
    Progress {
        worker: WorkerId,
        batch: usize,
        total: usize,
    },
    /// The worker reached a synchronization point and blocks until `reply` yields the
    /// merged model of the round.
    Submit {
        worker: WorkerId,
        batch: usize,
        model: ModelState,
        loss: f32,
        reply: oneshot::Sender<Arc<ModelState>>,
    },
    /// The worker trained on all its batches and leaves the barrier for good.
    Finish {
        worker: WorkerId,
        model: ModelState,
        loss: f32,
        total: usize,
    },
}

impl SyncMsg {
    pub fn worker(&self) -> WorkerId {
        match self {
            SyncMsg::Progress { worker, .. }
            | SyncMsg::Submit { worker, .. }
            | SyncMsg::Finish { worker, .. } => *worker,
        }
    }
}
