use std::{num::NonZeroUsize, sync::Arc};

use log::info;
use serde::Serialize;

use super::{EpochOrchestrator, EpochOutcome};
use crate::{
    config::{ConfigErr, TrainingConfig},
    data::{shard_range, Batches, DataLoader, InMemoryDataset},
    error::Result,
    model::{LossFn, Model},
    optimization::OptimizerBank,
    schedule::LearningRateScheduler,
    synchronization::ProgressBoard,
};

/// The outcome of one epoch as seen from the trainer.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EpochSummary {
    pub epoch: usize,
    pub loss: f32,
    pub learning_rate: f32,
    pub rounds: usize,
}

/// Drives federated training over several epochs.
///
/// Optimizers live in an `OptimizerBank` for the whole run, so their state carries over from
/// one epoch to the next. The learning rate schedule, if any, is applied before every epoch.
pub struct FederatedTrainer<L> {
    config: TrainingConfig,
    epochs: NonZeroUsize,
    orchestrator: EpochOrchestrator,
    bank: OptimizerBank,
    scheduler: Option<LearningRateScheduler>,
    loss_fn: Arc<L>,
}

impl<L: LossFn> FederatedTrainer<L> {
    /// Creates a new `FederatedTrainer`.
    ///
    /// # Arguments
    /// * `config` - The training configuration, validated here.
    /// * `loss_fn` - The loss function every worker minimizes.
    pub fn new(config: TrainingConfig, loss_fn: L) -> std::result::Result<Self, ConfigErr> {
        config.validate()?;

        let epochs = config.effective_epochs()?;
        if config.federated.repetitions_dataset > 1 {
            info!(
                "running {epochs} epochs of {} dataset repetitions each",
                config.federated.repetitions_dataset
            );
        }

        let scheduler = config
            .schedule
            .map(|s| {
                LearningRateScheduler::new(
                    epochs.get(),
                    config.optimizer.learning_rate(),
                    s.lr_end,
                    s.plan,
                    s.restarts,
                )
            })
            .transpose()?;

        let orchestrator = EpochOrchestrator::new(config.federated.clone(), ProgressBoard::new())?;

        Ok(Self {
            bank: OptimizerBank::new(config.optimizer),
            config,
            epochs,
            orchestrator,
            scheduler,
            loss_fn: Arc::new(loss_fn),
        })
    }

    pub fn config(&self) -> &TrainingConfig {
        &self.config
    }

    /// The epochs `fit` runs, after dividing by the dataset repetitions.
    pub fn epochs(&self) -> usize {
        self.epochs.get()
    }

    /// A live view of the workers' progress during `fit`.
    pub fn board(&self) -> &ProgressBoard {
        self.orchestrator.board()
    }

    /// Builds one loader per worker over balanced, contiguous shards of `dataset`, using the
    /// configured batch size, seed and dataset repetitions.
    pub fn shard_loaders(&self, dataset: Arc<InMemoryDataset>, workers: usize) -> Vec<DataLoader> {
        let repetitions = NonZeroUsize::new(self.config.federated.repetitions_dataset)
            .unwrap_or(NonZeroUsize::MIN);

        (0..workers)
            .map(|i| {
                let range = shard_range(dataset.len(), i, workers);
                let loader = DataLoader::new(Arc::clone(&dataset), range, self.config.batch_size)
                    .with_repetitions(repetitions);

                match self.config.seed {
                    Some(seed) => loader.with_shuffle(seed.wrapping_add(i as u64)),
                    None => loader,
                }
            })
            .collect()
    }

    /// Trains `model` federated across `loaders`, one worker per loader.
    ///
    /// After every epoch the merged model is loaded back into `model`, so it holds the
    /// consensus parameters once this returns.
    ///
    /// # Returns
    /// A summary per epoch, or the first error, which aborts the run.
    pub async fn fit<M: Model>(
        &mut self,
        model: &mut M,
        loaders: &[DataLoader],
    ) -> Result<Vec<EpochSummary>> {
        let mut summaries = Vec::with_capacity(self.epochs.get());

        for epoch in 0..self.epochs.get() {
            if let Some(scheduler) = &self.scheduler {
                self.bank.set_learning_rate(scheduler.get_lr(epoch));
            }

            let shards: Vec<Batches> = loaders.iter().map(|dl| dl.epoch_batches(epoch)).collect();

            let EpochOutcome {
                model: merged,
                loss,
                rounds,
                ..
            } = self
                .orchestrator
                .run(epoch, model, shards, &mut self.bank, Arc::clone(&self.loss_fn))
                .await?;

            model.load_state(&merged)?;

            info!("train epoch {} loss {loss:.6}", epoch + 1);

            summaries.push(EpochSummary {
                epoch,
                loss,
                learning_rate: self.bank.spec().learning_rate(),
                rounds,
            });
        }

        Ok(summaries)
    }
}
