//! The barrier workers meet at to exchange their models.

mod board;
mod coordinator;
mod handle;
mod msg;
mod state;

pub use board::ProgressBoard;
pub use coordinator::SyncCoordinator;
pub use handle::SyncHandle;
pub use msg::SyncMsg;
pub use state::{CoordinationState, LossLabel, RoundOutcome, SyncOutcome, WorkerReport};
