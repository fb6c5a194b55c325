use std::{error::Error, fmt, io};

use crate::{aggregation::AggregationErr, config::ConfigErr, id::WorkerId, model::MlErr};

/// The crate's result type.
pub type Result<T> = std::result::Result<T, FedErr>;

/// Federated training failures.
#[derive(Debug)]
pub enum FedErr {
    Config(ConfigErr),
    Aggregation(AggregationErr),
    Ml(MlErr),
    /// The coordinator went away while the worker was waiting on or talking to it.
    CoordinatorGone { worker: WorkerId },
    /// The stop signal fired while the worker was still training.
    Cancelled { worker: WorkerId },
    WorkerPanicked(String),
    /// The epoch ended without any synchronization round producing a model.
    NothingMerged,
    Io(io::Error),
}

impl fmt::Display for FedErr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FedErr::Config(e) => write!(f, "config error: {e}"),
            FedErr::Aggregation(e) => write!(f, "aggregation error: {e}"),
            FedErr::Ml(e) => write!(f, "training error: {e}"),
            FedErr::CoordinatorGone { worker } => {
                write!(f, "the coordinator stopped before releasing {worker}")
            }
            FedErr::Cancelled { worker } => write!(f, "{worker} was cancelled while training"),
            FedErr::WorkerPanicked(msg) => write!(f, "worker task failed: {msg}"),
            FedErr::NothingMerged => write!(f, "the epoch finished without a merged model"),
            FedErr::Io(e) => write!(f, "io error: {e}"),
        }
    }
}

impl Error for FedErr {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            FedErr::Config(e) => Some(e),
            FedErr::Aggregation(e) => Some(e),
            FedErr::Ml(e) => Some(e),
            FedErr::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl From<ConfigErr> for FedErr {
    fn from(e: ConfigErr) -> Self {
        Self::Config(e)
    }
}

impl From<AggregationErr> for FedErr {
    fn from(e: AggregationErr) -> Self {
        Self::Aggregation(e)
    }
}

impl From<MlErr> for FedErr {
    fn from(e: MlErr) -> Self {
        Self::Ml(e)
    }
}

impl From<io::Error> for FedErr {
    fn from(e: io::Error) -> Self {
        Self::Io(e)
    }
}
