//! Weighted averaging of worker models.

mod error;
mod federated_avg;
mod weights;

pub use error::AggregationErr;
pub use federated_avg::federated_avg;
pub use weights::{WeightingScheme, Weights};
