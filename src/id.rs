use std::fmt;

use serde::{Deserialize, Serialize};

/// Stable identity of a worker inside an epoch.
///
/// It doubles as the index of the worker's record in the coordination arena, so ids
/// are always handed out densely starting at zero.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct WorkerId(usize);

impl WorkerId {
    /// Creates a new `WorkerId`.
    ///
    /// # Arguments
    /// * `index` - The position of the worker among the epoch's shards.
    pub const fn new(index: usize) -> Self {
        Self(index)
    }

    /// Returns the arena index of this worker.
    pub const fn index(self) -> usize {
        self.0
    }
}

impl fmt::Display for WorkerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "worker-{}", self.0)
    }
}
