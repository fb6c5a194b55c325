pub mod dataset;
pub mod loader;
pub mod shard;

pub use dataset::{Batch, InMemoryDataset};
pub use loader::{Batches, DataLoader};
pub use shard::{shard_range, shard_ranges_weighted};
