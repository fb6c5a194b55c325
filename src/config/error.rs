use std::{fmt, io};

use crate::id::WorkerId;

/// Errors raised while loading or validating a training configuration.
#[derive(Debug)]
pub enum ConfigErr {
    /// The synchronization interval must be at least one batch.
    SyncInterval(usize),
    /// The barrier poll interval must be a positive, finite amount of seconds.
    WaitInterval(f64),
    NoWorkers,
    EmptyShard {
        worker: WorkerId,
    },
    Hyperparameter {
        name: &'static str,
        value: f32,
    },
    /// Dataset repetitions leave no epoch to run.
    Epochs {
        epochs: usize,
        repetitions: usize,
    },
    Repetitions,
    Schedule(String),
    Io(io::Error),
    Parse(serde_json::Error),
}

impl fmt::Display for ConfigErr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::SyncInterval(n) => write!(f, "sync interval must be positive, got {n}"),
            Self::WaitInterval(secs) => {
                write!(f, "wait interval must be a positive amount of seconds, got {secs}")
            }
            Self::NoWorkers => write!(f, "at least one worker is required"),
            Self::EmptyShard { worker } => write!(f, "{worker} has no batches to train on"),
            Self::Hyperparameter { name, value } => {
                write!(f, "invalid value {value} for hyperparameter {name}")
            }
            Self::Epochs {
                epochs,
                repetitions,
            } => write!(
                f,
                "{epochs} epochs with {repetitions} dataset repetitions leaves no epoch to run"
            ),
            Self::Repetitions => write!(f, "dataset repetitions must be at least one"),
            Self::Schedule(msg) => write!(f, "invalid learning rate schedule: {msg}"),
            Self::Io(e) => write!(f, "io error: {e}"),
            Self::Parse(e) => write!(f, "parse error: {e}"),
        }
    }
}

impl std::error::Error for ConfigErr {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Io(e) => Some(e),
            Self::Parse(e) => Some(e),
            _ => None,
        }
    }
}

impl From<io::Error> for ConfigErr {
    fn from(e: io::Error) -> Self {
        Self::Io(e)
    }
}

impl From<serde_json::Error> for ConfigErr {
    fn from(e: serde_json::Error) -> Self {
        Self::Parse(e)
    }
}
