use std::{num::NonZeroUsize, sync::Arc};

use ndarray::Array2;
use tokio_test::{assert_err, assert_ok};

use fedsync::{
    config::{ConfigErr, FederatedConfig, MergeScope},
    data::{shard_ranges_weighted, Batches, DataLoader, InMemoryDataset},
    model::Mse,
    optimization::{OptimizerBank, OptimizerSpec},
    synchronization::ProgressBoard,
    training::local::train_locally,
    EpochOrchestrator, FedErr, FederatedTrainer, LinearModel, Model, TrainingConfig, WorkerId,
};

/// `y = 2x - 1` over `n` evenly spaced points.
fn line(n: usize) -> Arc<InMemoryDataset> {
    let xs = Array2::from_shape_fn((n, 1), |(i, _)| i as f32 / n as f32);
    let ys = xs.mapv(|x| 2. * x - 1.);
    Arc::new(InMemoryDataset::new(xs, ys).unwrap())
}

fn batch_size(n: usize) -> NonZeroUsize {
    NonZeroUsize::new(n).unwrap()
}

fn federated(sync_every_n_batch: usize) -> FederatedConfig {
    FederatedConfig {
        sync_every_n_batch,
        wait_interval: 0.01,
        ..Default::default()
    }
}

fn gd(learning_rate: f32) -> OptimizerSpec {
    OptimizerSpec::GradientDescent { learning_rate }
}

/// One loader per part, `parts[i] * batch` samples each.
fn shards(parts: &[usize], batch: usize) -> Vec<DataLoader> {
    let total = parts.iter().sum::<usize>() * batch;
    let data = line(total);

    shard_ranges_weighted(total, parts)
        .into_iter()
        .map(|range| DataLoader::new(Arc::clone(&data), range, batch_size(batch)))
        .collect()
}

fn epoch_batches(loaders: &[DataLoader], epoch: usize) -> Vec<Batches> {
    loaders.iter().map(|dl| dl.epoch_batches(epoch)).collect()
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn uneven_workers_complete_with_one_merged_model() {
    let loaders = shards(&[4, 2], 2);
    assert_eq!(loaders[0].len(), 4);
    assert_eq!(loaders[1].len(), 2);

    let model = LinearModel::zeros((1, 1));
    let mut bank = OptimizerBank::new(gd(0.1));
    let orchestrator = EpochOrchestrator::new(federated(2), ProgressBoard::new()).unwrap();

    let outcome = assert_ok!(
        orchestrator
            .run(0, &model, epoch_batches(&loaders, 0), &mut bank, Arc::new(Mse))
            .await
    );

    // One barrier round when A syncs at batch 2 and B has finished, one final pass.
    assert_eq!(outcome.rounds, 2);
    assert!(outcome.model.layout_mismatch(model.state()).is_none());
    assert!(outcome.loss.is_finite());
    assert!(outcome.reports.iter().all(|r| r.finished));
    assert_eq!(bank.len(), 2);

    let board = orchestrator.board().snapshot();
    assert_eq!(board[0].progress, (4, 4));
    assert_eq!(board[1].progress, (2, 2));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn single_worker_matches_plain_local_training() {
    let loaders = shards(&[7], 3);
    let spec = OptimizerSpec::GradientDescentWithMomentum {
        learning_rate: 0.05,
        momentum: 0.9,
    };

    let start = LinearModel::zeros((1, 1));

    let mut local = start.clone();
    let mut optimizer = spec.build();
    assert_ok!(train_locally(
        &mut local,
        optimizer.as_mut(),
        loaders[0].epoch_batches(0),
        &Mse
    ));

    let config = FederatedConfig {
        keep_optimizer_state: true,
        ..federated(2)
    };
    let orchestrator = EpochOrchestrator::new(config, ProgressBoard::new()).unwrap();
    let mut bank = OptimizerBank::new(spec);

    let outcome = assert_ok!(
        orchestrator
            .run(0, &start, epoch_batches(&loaders, 0), &mut bank, Arc::new(Mse))
            .await
    );

    assert_eq!(&outcome.model, local.state());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn waiting_only_without_rounds_merges_nothing() {
    let loaders = shards(&[2, 2], 2);
    let config = FederatedConfig {
        merge_scope: MergeScope::WaitingOnly,
        ..federated(10)
    };

    let orchestrator = EpochOrchestrator::new(config, ProgressBoard::new()).unwrap();
    let mut bank = OptimizerBank::new(gd(0.1));

    let err = assert_err!(
        orchestrator
            .run(
                0,
                &LinearModel::zeros((1, 1)),
                epoch_batches(&loaders, 0),
                &mut bank,
                Arc::new(Mse)
            )
            .await
    );
    assert!(matches!(err, FedErr::NothingMerged));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn failing_worker_aborts_the_epoch() {
    let loaders = shards(&[6, 6], 2);
    let orchestrator = EpochOrchestrator::new(federated(2), ProgressBoard::new()).unwrap();
    let mut bank = OptimizerBank::new(gd(0.1));

    // Two input features against one feature columns.
    let model = LinearModel::zeros((2, 1));

    let err = assert_err!(
        orchestrator
            .run(0, &model, epoch_batches(&loaders, 0), &mut bank, Arc::new(Mse))
            .await
    );
    assert!(matches!(err, FedErr::Ml(_)));
}

#[tokio::test]
async fn shard_problems_are_config_errors() {
    let orchestrator = EpochOrchestrator::new(federated(2), ProgressBoard::new()).unwrap();
    let mut bank = OptimizerBank::new(gd(0.1));
    let model = LinearModel::zeros((1, 1));

    let err = assert_err!(
        orchestrator
            .run(0, &model, Vec::<Batches>::new(), &mut bank, Arc::new(Mse))
            .await
    );
    assert!(matches!(err, FedErr::Config(ConfigErr::NoWorkers)));

    let data = line(4);
    let loaders = [
        DataLoader::new(Arc::clone(&data), 0..4, batch_size(2)),
        DataLoader::new(data, 4..4, batch_size(2)),
    ];

    let err = assert_err!(
        orchestrator
            .run(0, &model, epoch_batches(&loaders, 0), &mut bank, Arc::new(Mse))
            .await
    );
    assert!(matches!(
        err,
        FedErr::Config(ConfigErr::EmptyShard { worker }) if worker == WorkerId::new(1)
    ));

    assert!(EpochOrchestrator::new(federated(0), ProgressBoard::new()).is_err());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn trainer_runs_every_epoch_and_learns() {
    let config = TrainingConfig::from_json_str(
        r#"{
            "epochs": 8,
            "batch_size": 8,
            "seed": 3,
            "optimizer": { "gradient_descent": { "learning_rate": 0.2 } },
            "schedule": { "lr_end": 0.02 },
            "federated": {
                "sync_every_n_batch": 2,
                "wait_interval": 0.01,
                "repetitions_dataset": 2,
                "weighting": "proportional"
            }
        }"#,
    )
    .unwrap();

    let mut trainer = FederatedTrainer::new(config, Mse).unwrap();
    assert_eq!(trainer.epochs(), 4);

    let loaders = trainer.shard_loaders(line(96), 3);
    assert!(loaders.iter().all(|dl| dl.len() == 8));

    let mut model = LinearModel::zeros((1, 1));
    let summaries = assert_ok!(trainer.fit(&mut model, &loaders).await);

    assert_eq!(summaries.len(), 4);
    assert!(summaries[3].loss < summaries[0].loss);
    assert!(summaries[3].learning_rate < summaries[0].learning_rate);
    assert!(summaries.iter().all(|s| s.rounds > 0));
}

#[tokio::test]
async fn sub_nanosecond_wait_interval_is_rejected_up_front() {
    let config = FederatedConfig {
        wait_interval: 1e-10,
        ..federated(1)
    };

    let err = assert_err!(EpochOrchestrator::new(config, ProgressBoard::new()));
    assert!(matches!(err, ConfigErr::WaitInterval(_)));

    let res = TrainingConfig::from_json_str(
        r#"{"epochs": 1, "batch_size": 1, "federated": {"wait_interval": 1e30}}"#,
    );
    assert!(matches!(res, Err(ConfigErr::WaitInterval(_))));
}
