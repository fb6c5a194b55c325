use std::sync::Arc;

use log::{debug, info, warn};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

use super::{report::spawn_reporter, worker::WorkerLoop};
use crate::{
    config::{ConfigErr, FederatedConfig},
    data::Batch,
    error::{FedErr, Result},
    id::WorkerId,
    model::{LossFn, Model, ModelState},
    optimization::OptimizerBank,
    synchronization::{ProgressBoard, SyncCoordinator, SyncHandle, SyncOutcome, WorkerReport},
};

/// The result of one federated epoch.
#[derive(Debug, Clone)]
pub struct EpochOutcome {
    /// The merged model the epoch ended with.
    pub model: ModelState,
    /// The mean of the workers' final losses, weighted by their share of the batches.
    pub loss: f32,
    pub rounds: usize,
    pub reports: Vec<WorkerReport>,
}

/// Runs one epoch: a worker task per shard plus the synchronization coordinator.
#[derive(Debug, Clone)]
pub struct EpochOrchestrator {
    config: FederatedConfig,
    board: ProgressBoard,
}

impl EpochOrchestrator {
    /// Creates a new `EpochOrchestrator`.
    ///
    /// # Arguments
    /// * `config` - The federated settings, validated here.
    /// * `board` - Where the workers' progress is published.
    pub fn new(
        config: FederatedConfig,
        board: ProgressBoard,
    ) -> std::result::Result<Self, ConfigErr> {
        config.validate()?;
        Ok(Self { config, board })
    }

    pub fn config(&self) -> &FederatedConfig {
        &self.config
    }

    pub fn board(&self) -> &ProgressBoard {
        &self.board
    }

    /// Trains one epoch across `shards`, one worker per shard.
    ///
    /// # Arguments
    /// * `epoch` - The epoch index, for logging.
    /// * `model` - The starting model, cloned into every worker.
    /// * `shards` - The batches of every worker, in worker id order.
    /// * `bank` - The optimizers kept across epochs; every worker takes its own out and hands
    ///   it back on success.
    /// * `loss_fn` - The loss function to minimize.
    ///
    /// # Returns
    /// The merged model and epoch loss, or the first error met by a worker or the coordinator.
    /// Remaining workers are aborted on error.
    pub async fn run<M, L, I>(
        &self,
        epoch: usize,
        model: &M,
        shards: Vec<I>,
        bank: &mut OptimizerBank,
        loss_fn: Arc<L>,
    ) -> Result<EpochOutcome>
    where
        M: Model,
        L: LossFn,
        I: ExactSizeIterator<Item = Batch> + Send + 'static,
    {
        if shards.is_empty() {
            return Err(ConfigErr::NoWorkers.into());
        }

        let batches: Vec<(WorkerId, usize)> = shards
            .iter()
            .enumerate()
            .map(|(i, shard)| (WorkerId::new(i), shard.len()))
            .collect();

        if let Some(&(worker, _)) = batches.iter().find(|(_, n)| *n == 0) {
            return Err(ConfigErr::EmptyShard { worker }.into());
        }

        let totals: Vec<usize> = batches.iter().map(|&(_, n)| n).collect();
        let weights = self.config.weighting.weights(&batches);

        let stop = CancellationToken::new();
        let (coordinator, tx) = SyncCoordinator::new(
            &totals,
            weights,
            self.config.merge_scope,
            self.board.clone(),
            stop.clone(),
        );
        let mut coordinator = tokio::spawn(coordinator.run());

        let reporter = self.config.verbose.then(|| {
            spawn_reporter(
                self.board.clone(),
                self.config.report_interval(),
                stop.child_token(),
            )
        });

        debug!("epoch {epoch}: starting {} workers", shards.len());

        let mut workers = JoinSet::new();
        for (i, shard) in shards.into_iter().enumerate() {
            let id = WorkerId::new(i);
            let handle = SyncHandle::new(
                id,
                tx.clone(),
                stop.child_token(),
                self.config.poll_interval(),
            );

            let worker = WorkerLoop::new(
                handle,
                model.clone(),
                bank.take(id),
                bank.spec(),
                Arc::clone(&loss_fn),
                self.config.sync_every_n_batch,
                self.config.keep_optimizer_state,
            );

            workers.spawn(worker.run(shard));
        }

        drop(tx);

        while let Some(joined) = workers.join_next().await {
            let res = joined.unwrap_or_else(|e| Err(FedErr::WorkerPanicked(e.to_string())));

            match res {
                Ok(outcome) => {
                    debug!(
                        worker = outcome.worker.index();
                        "joined after {} batches, loss {}", outcome.batches, outcome.final_loss
                    );
                    bank.restore(outcome.worker, outcome.optimizer);
                }
                Err(e) => {
                    warn!("epoch {epoch} aborted: {e}");
                    workers.shutdown().await;
                    stop.cancel();

                    let coordinator_err = match (&mut coordinator).await {
                        Ok(Err(agg)) => Some(agg),
                        _ => None,
                    };

                    if let Some(reporter) = reporter {
                        let _ = reporter.await;
                    }

                    return Err(match (e, coordinator_err) {
                        (FedErr::CoordinatorGone { .. }, Some(agg)) => agg.into(),
                        (e, _) => e,
                    });
                }
            }
        }

        stop.cancel();

        let outcome = coordinator
            .await
            .map_err(|e| FedErr::WorkerPanicked(format!("coordinator: {e}")))?;

        if let Some(reporter) = reporter {
            let _ = reporter.await;
        }

        let SyncOutcome {
            merged,
            rounds,
            reports,
        } = outcome?;

        let model = merged.ok_or(FedErr::NothingMerged)?;
        let loss = epoch_loss(&reports);

        info!("epoch {epoch}: {rounds} rounds, loss {loss:.6}");

        Ok(EpochOutcome {
            model,
            loss,
            rounds,
            reports,
        })
    }
}

/// Weighted mean of the final losses, each worker weighing its share of the batches.
fn epoch_loss(reports: &[WorkerReport]) -> f32 {
    let (sum, batches) = reports
        .iter()
        .filter_map(|r| r.final_loss().map(|loss| (loss, r.progress.1)))
        .fold((0., 0), |(sum, batches), (loss, n)| {
            (sum + loss * n as f32, batches + n)
        });

    if batches == 0 {
        0.
    } else {
        sum / batches as f32
    }
}
