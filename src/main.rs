use std::{env, sync::Arc};

use anyhow::Context;
use log::info;
use ndarray::{Array1, Array2};
use rand::{rngs::StdRng, Rng, SeedableRng};

use fedsync::{
    data::InMemoryDataset, model::Mse, FederatedTrainer, LinearModel, Model, TrainingConfig,
};

const DEFAULT_WORKERS: usize = 4;
const SAMPLES: usize = 2048;
const FEATURES: usize = 3;

/// Synthetic regression data `y = x·w + b + noise`.
fn synthetic_dataset(rng: &mut StdRng) -> anyhow::Result<InMemoryDataset> {
    let w = Array1::from(vec![3.0f32, -2.0, 0.5]);
    let b = 0.25;

    let xs = Array2::from_shape_fn((SAMPLES, FEATURES), |_| rng.random_range(-1.0f32..1.0));
    let noise = Array1::from_shape_fn(SAMPLES, |_| rng.random_range(-0.05f32..0.05));
    let ys = (xs.dot(&w) + b + noise).insert_axis(ndarray::Axis(1));

    Ok(InMemoryDataset::new(xs, ys)?)
}

const DEFAULT_CONFIG: &str = r#"{
    "epochs": 5,
    "batch_size": 32,
    "seed": 42,
    "optimizer": {
        "gradient_descent_with_momentum": { "learning_rate": 0.05, "momentum": 0.5 }
    },
    "schedule": { "lr_end": 0.005, "plan": "log_cosine" },
    "federated": { "sync_every_n_batch": 4, "weighting": "proportional" }
}"#;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    env_logger::init();

    let mut args = env::args().skip(1);

    let config = match args.next() {
        Some(path) => TrainingConfig::from_json_file(&path)
            .with_context(|| format!("loading config from {path}"))?,
        None => TrainingConfig::from_json_str(DEFAULT_CONFIG)?,
    };

    let workers = match args.next() {
        Some(n) => n.parse().context("parsing the amount of workers")?,
        None => DEFAULT_WORKERS,
    };

    let mut rng = StdRng::seed_from_u64(config.seed.unwrap_or_default());
    let dataset = Arc::new(synthetic_dataset(&mut rng)?);
    let mut model = LinearModel::xavier((FEATURES, 1), &mut rng);

    let mut trainer = FederatedTrainer::new(config, Mse::new())?;
    let loaders = trainer.shard_loaders(dataset, workers);

    info!(
        "training on {SAMPLES} samples across {workers} workers for {} epochs",
        trainer.epochs()
    );

    let summaries = trainer.fit(&mut model, &loaders).await?;

    if let Some(last) = summaries.last() {
        info!("final loss {:.6}", last.loss);
    }

    for (name, tensor) in model.state() {
        info!("{name} = {tensor}");
    }

    Ok(())
}
