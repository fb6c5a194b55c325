use std::{collections::BTreeMap, sync::Arc};

use log::{debug, warn};
use tokio::sync::oneshot;

use crate::{
    aggregation::{federated_avg, AggregationErr, Weights},
    config::MergeScope,
    id::WorkerId,
    model::ModelState,
};

/// The point of a worker's epoch a loss was recorded at.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum LossLabel {
    /// The running loss at the synchronization point before batch `n`.
    Batch(usize),
    /// The mean loss over every batch of the epoch.
    Final,
}

#[derive(Debug)]
enum Status {
    Training,
    Waiting(oneshot::Sender<Arc<ModelState>>),
    Finished,
}

#[derive(Debug)]
struct WorkerRecord {
    submitted: Option<ModelState>,
    status: Status,
    progress: (usize, usize),
    losses: BTreeMap<LossLabel, f32>,
}

/// A read only view of one worker's record.
#[derive(Debug, Clone, PartialEq)]
pub struct WorkerReport {
    pub worker: WorkerId,
    /// Batches completed and total batches.
    pub progress: (usize, usize),
    pub losses: BTreeMap<LossLabel, f32>,
    pub waiting: bool,
    pub finished: bool,
}

impl WorkerReport {
    pub fn final_loss(&self) -> Option<f32> {
        self.losses.get(&LossLabel::Final).copied()
    }
}

/// What a resolved round did.
#[derive(Debug, Clone, PartialEq)]
pub struct RoundOutcome {
    /// The workers whose models were merged.
    pub merged: Vec<WorkerId>,
    /// The workers woken up with the merged model.
    pub released: Vec<WorkerId>,
}

/// What remains of the coordination state once the coordinator stops.
#[derive(Debug, Clone)]
pub struct SyncOutcome {
    pub merged: Option<ModelState>,
    pub rounds: usize,
    pub reports: Vec<WorkerReport>,
}

/// The state shared by every worker of an epoch, owned by the coordinator.
///
/// Worker records live in an arena indexed by `WorkerId`. A worker's submitted model is never
/// cleared, so a straggler's last contribution stays available to later rounds.
#[derive(Debug)]
pub struct CoordinationState {
    records: Vec<WorkerRecord>,
    merged: Option<Arc<ModelState>>,
    rounds: usize,
}

impl CoordinationState {
    /// Creates a new `CoordinationState`.
    ///
    /// # Arguments
    /// * `totals` - The amount of local batches of every worker, indexed by worker id.
    pub fn new(totals: &[usize]) -> Self {
        let records = totals
            .iter()
            .map(|&total| WorkerRecord {
                submitted: None,
                status: Status::Training,
                progress: (0, total),
                losses: BTreeMap::new(),
            })
            .collect();

        Self {
            records,
            merged: None,
            rounds: 0,
        }
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn rounds(&self) -> usize {
        self.rounds
    }

    pub fn merged(&self) -> Option<&ModelState> {
        self.merged.as_deref()
    }

    fn record(&mut self, worker: WorkerId) -> Option<&mut WorkerRecord> {
        let record = self.records.get_mut(worker.index());
        if record.is_none() {
            warn!("dropping message from unknown {worker}");
        }
        record
    }

    /// Records that `worker` is about to train on batch `batch`.
    pub fn record_progress(&mut self, worker: WorkerId, batch: usize, total: usize) {
        if let Some(record) = self.record(worker) {
            record.progress = (batch.max(record.progress.0), total);
        }
    }

    /// Stores the model `worker` published at a synchronization point and adds it to the
    /// waiting set.
    pub fn submit(
        &mut self,
        worker: WorkerId,
        batch: usize,
        model: ModelState,
        loss: f32,
        reply: oneshot::Sender<Arc<ModelState>>,
    ) {
        let Some(record) = self.record(worker) else {
            return;
        };

        if matches!(record.status, Status::Finished) {
            warn!("{worker} submitted after finishing, ignoring");
            return;
        }

        record.submitted = Some(model);
        record.losses.insert(LossLabel::Batch(batch), loss);
        record.progress.0 = batch.max(record.progress.0);
        record.status = Status::Waiting(reply);
    }

    /// Stores the final model of `worker` and removes it from the barrier for good.
    pub fn finish(&mut self, worker: WorkerId, model: ModelState, loss: f32, total: usize) {
        let Some(record) = self.record(worker) else {
            return;
        };

        record.submitted = Some(model);
        record.losses.insert(LossLabel::Final, loss);
        record.progress = (total, total);
        record.status = Status::Finished;
    }

    /// Whether some worker is waiting and no worker is still training.
    pub fn round_ready(&self) -> bool {
        let mut waiting = false;

        for record in &self.records {
            match record.status {
                Status::Training => return false,
                Status::Waiting(_) => waiting = true,
                Status::Finished => {}
            }
        }

        waiting
    }

    /// Returns the workers whose models a round resolved now would merge.
    pub fn participants(&self, scope: MergeScope) -> Vec<WorkerId> {
        self.records
            .iter()
            .enumerate()
            .filter(|(_, record)| record.submitted.is_some())
            .filter(|(_, record)| match scope {
                MergeScope::Retained => true,
                MergeScope::WaitingOnly => matches!(record.status, Status::Waiting(_)),
            })
            .map(|(i, _)| WorkerId::new(i))
            .collect()
    }

    /// Merges the participating models and releases every waiting worker with the result.
    ///
    /// # Arguments
    /// * `weights` - The weights of every worker, restricted to the participants.
    /// * `scope` - Which submissions take part in the merge.
    ///
    /// # Returns
    /// What the round did, or an `AggregationErr` in which case neither the merged model nor
    /// the waiting set change.
    pub fn resolve(
        &mut self,
        weights: &Weights,
        scope: MergeScope,
    ) -> Result<RoundOutcome, AggregationErr> {
        let ids = self.participants(scope);

        let models = ids.iter().filter_map(|&id| {
            self.records[id.index()]
                .submitted
                .as_ref()
                .map(|model| (id, model))
        });

        if let Some(merged) = federated_avg(models, Some(weights))? {
            self.merged = Some(Arc::new(merged));
            self.rounds += 1;
        }

        let mut released = Vec::new();

        if let Some(merged) = &self.merged {
            for (i, record) in self.records.iter_mut().enumerate() {
                let Status::Waiting(_) = record.status else {
                    continue;
                };

                let worker = WorkerId::new(i);
                if let Status::Waiting(reply) =
                    std::mem::replace(&mut record.status, Status::Training)
                {
                    if reply.send(Arc::clone(merged)).is_err() {
                        debug!("{worker} stopped waiting before its release");
                    }
                }

                released.push(worker);
            }
        }

        Ok(RoundOutcome {
            merged: ids,
            released,
        })
    }

    pub fn report(&self, worker: WorkerId) -> Option<WorkerReport> {
        self.records.get(worker.index()).map(|record| WorkerReport {
            worker,
            progress: record.progress,
            losses: record.losses.clone(),
            waiting: matches!(record.status, Status::Waiting(_)),
            finished: matches!(record.status, Status::Finished),
        })
    }

    pub fn reports(&self) -> Vec<WorkerReport> {
        (0..self.records.len())
            .filter_map(|i| self.report(WorkerId::new(i)))
            .collect()
    }

    pub fn into_outcome(self) -> SyncOutcome {
        let reports = self.reports();

        SyncOutcome {
            merged: self.merged.map(Arc::unwrap_or_clone),
            rounds: self.rounds,
            reports,
        }
    }
}
