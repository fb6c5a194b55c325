use std::sync::Arc;

use log::{debug, info};
use tokio::task;

use super::local::{local_step, mean};
use crate::{
    data::Batch,
    error::{FedErr, Result},
    id::WorkerId,
    model::{LossFn, Model},
    optimization::{Optimizer, OptimizerSpec},
    synchronization::SyncHandle,
};

/// What a worker hands back once it trained on all of its batches.
pub struct WorkerOutcome {
    pub worker: WorkerId,
    pub optimizer: Box<dyn Optimizer>,
    pub batches: usize,
    pub final_loss: f32,
}

/// Trains a worker's copy of the model on its own batches, meeting the other workers at the
/// barrier every `sync_every` batches.
///
/// Local steps are CPU-bound and run on tokio's blocking pool. The model and optimizer are
/// moved in and out of the blocking task instead of being cloned.
pub struct WorkerLoop<M, L> {
    handle: SyncHandle,
    model: M,
    optimizer: Box<dyn Optimizer>,
    spec: OptimizerSpec,
    loss_fn: Arc<L>,
    sync_every: usize,
    keep_optimizer_state: bool,
}

impl<M, L> WorkerLoop<M, L>
where
    M: Model,
    L: LossFn,
{
    /// Creates a new `WorkerLoop`.
    ///
    /// # Arguments
    /// * `handle` - This worker's end of the coordinator.
    /// * `model` - The worker's private copy of the starting model.
    /// * `optimizer` - The optimizer to train with.
    /// * `spec` - The hyperparameters a fresh optimizer is rebuilt from after a merge.
    /// * `loss_fn` - The loss function to minimize.
    /// * `sync_every` - The amount of batches between synchronization points.
    /// * `keep_optimizer_state` - Whether the optimizer survives a merge.
    pub fn new(
        handle: SyncHandle,
        model: M,
        optimizer: Box<dyn Optimizer>,
        spec: OptimizerSpec,
        loss_fn: Arc<L>,
        sync_every: usize,
        keep_optimizer_state: bool,
    ) -> Self {
        Self {
            handle,
            model,
            optimizer,
            spec,
            loss_fn,
            sync_every: sync_every.max(1),
            keep_optimizer_state,
        }
    }

    /// Trains on every batch, synchronizing when due, and publishes the final model.
    ///
    /// # Returns
    /// The optimizer and loss of the worker, or the first error met, after which the worker
    /// stops.
    pub async fn run<I>(self, batches: I) -> Result<WorkerOutcome>
    where
        I: ExactSizeIterator<Item = Batch> + Send + 'static,
    {
        let Self {
            handle,
            mut model,
            mut optimizer,
            spec,
            loss_fn,
            sync_every,
            keep_optimizer_state,
        } = self;

        let worker = handle.worker();
        let total = batches.len();

        let mut loss_sum = 0.;
        let mut last_loss = 0.;

        debug!(worker = worker.index(); "training on {total} batches");

        for (i, batch) in batches.enumerate() {
            handle.report_progress(i, total)?;

            if i > 0 && i % sync_every == 0 {
                let merged = handle
                    .synchronize(i, model.state().clone(), last_loss)
                    .await?;

                model.load_state(&merged)?;

                if !keep_optimizer_state {
                    optimizer = spec.build();
                }

                debug!(worker = worker.index(), batch = i; "resumed from merged model");
            }

            // Move the buffers out to satisfy `'static` for spawn_blocking, without copying.
            let loss_fn = Arc::clone(&loss_fn);
            let (model_back, optimizer_back, loss) = task::spawn_blocking(move || {
                let loss = local_step(&mut model, optimizer.as_mut(), &batch, &*loss_fn);
                (model, optimizer, loss)
            })
            .await
            .map_err(|e| FedErr::WorkerPanicked(format!("{worker}: {e}")))?;

            model = model_back;
            optimizer = optimizer_back;

            last_loss = loss?;
            loss_sum += last_loss;
        }

        let final_loss = mean(loss_sum, total);
        handle.finish(model.state().clone(), final_loss, total)?;

        info!(worker = worker.index(); "finished, mean loss {final_loss:.6}");

        Ok(WorkerOutcome {
            worker,
            optimizer,
            batches: total,
            final_loss,
        })
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use ndarray::Array2;
    use tokio_util::sync::CancellationToken;

    use super::*;
    use crate::{
        aggregation::Weights,
        config::MergeScope,
        model::{LinearModel, ModelState, Mse},
        synchronization::{ProgressBoard, SyncCoordinator},
    };

    const SYNC_EVERY: usize = 2;
    const BATCHES: usize = 7;

    fn momentum() -> OptimizerSpec {
        OptimizerSpec::GradientDescentWithMomentum {
            learning_rate: 0.05,
            momentum: 0.9,
        }
    }

    /// Two rows of `y = 2x - 1` per batch.
    fn batches() -> Vec<Batch> {
        (0..BATCHES)
            .map(|b| {
                let xs = Array2::from_shape_fn((2, 1), |(i, _)| (2 * b + i) as f32 / 14.);
                let ys = xs.mapv(|x| 2. * x - 1.);
                Batch::new(xs, ys).unwrap()
            })
            .collect()
    }

    async fn train_alone(keep_optimizer_state: bool) -> ModelState {
        let id = WorkerId::new(0);
        let stop = CancellationToken::new();
        let (coordinator, tx) = SyncCoordinator::new(
            &[BATCHES],
            Weights::uniform([id]),
            MergeScope::Retained,
            ProgressBoard::new(),
            stop.clone(),
        );
        let coordinator = tokio::spawn(coordinator.run());

        let handle = SyncHandle::new(id, tx, stop.child_token(), Duration::from_millis(5));
        let worker = WorkerLoop::new(
            handle,
            LinearModel::zeros((1, 1)),
            momentum().build(),
            momentum(),
            Arc::new(Mse),
            SYNC_EVERY,
            keep_optimizer_state,
        );

        let outcome = worker.run(batches().into_iter()).await.unwrap();
        assert_eq!(outcome.batches, BATCHES);

        stop.cancel();
        let sync = coordinator.await.unwrap().unwrap();
        assert_eq!(sync.rounds, 4);
        sync.merged.unwrap()
    }

    #[tokio::test]
    async fn merge_rebuilds_optimizer_unless_kept() {
        let reset = train_alone(false).await;
        let kept = train_alone(true).await;
        assert_ne!(reset, kept);

        let mut model = LinearModel::zeros((1, 1));
        let mut optimizer = momentum().build();

        for (i, batch) in batches().iter().enumerate() {
            if i > 0 && i % SYNC_EVERY == 0 {
                optimizer = momentum().build();
            }
            local_step(&mut model, optimizer.as_mut(), batch, &Mse).unwrap();
        }

        assert_eq!(&reset, model.state());
    }
}
