//! Local training, the federated epoch and the multi epoch driver.

mod epoch;
pub mod local;
mod report;
mod session;
mod worker;

pub use epoch::{EpochOrchestrator, EpochOutcome};
pub use report::{format_report, spawn_reporter};
pub use session::{EpochSummary, FederatedTrainer};
pub use worker::{WorkerLoop, WorkerOutcome};
