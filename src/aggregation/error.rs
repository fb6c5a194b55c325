use std::fmt;

use crate::{id::WorkerId, model::LayoutMismatch};

/// Errors that make a set of models impossible to average.
#[derive(Debug, Clone, PartialEq)]
pub enum AggregationErr {
    /// A worker's parameters differ in name or shape from the rest.
    Layout {
        worker: WorkerId,
        mismatch: LayoutMismatch,
    },
    /// A weight is negative or not finite.
    InvalidWeight { worker: WorkerId, weight: f32 },
    /// A participating worker has no weight assigned.
    MissingWeight { worker: WorkerId },
    ZeroTotalWeight,
}

impl fmt::Display for AggregationErr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Layout { worker, mismatch } => {
                write!(f, "cannot merge the model of {worker}: {mismatch}")
            }
            Self::InvalidWeight { worker, weight } => {
                write!(f, "invalid weight {weight} for {worker}")
            }
            Self::MissingWeight { worker } => write!(f, "no weight assigned to {worker}"),
            Self::ZeroTotalWeight => write!(f, "the weights of the merged models sum to zero"),
        }
    }
}

impl std::error::Error for AggregationErr {}
