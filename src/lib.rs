pub mod aggregation;
pub mod config;
pub mod data;
pub mod error;
pub mod id;
pub mod model;
pub mod optimization;
pub mod schedule;
pub mod synchronization;
pub mod training;

pub use aggregation::{federated_avg, AggregationErr, Weights, WeightingScheme};
pub use config::{ConfigErr, FederatedConfig, MergeScope, TrainingConfig};
pub use error::{FedErr, Result};
pub use id::WorkerId;
pub use model::{LinearModel, Model, ModelState};
pub use optimization::{OptimizerBank, OptimizerSpec};
pub use synchronization::ProgressBoard;
pub use training::{EpochOrchestrator, EpochOutcome, FederatedTrainer};
