use std::{num::NonZeroUsize, ops::Range, sync::Arc};

use rand::{rngs::StdRng, seq::SliceRandom, SeedableRng};

use super::{Batch, InMemoryDataset};

/// Shard-aware loader producing one epoch of owned batches at a time.
///
/// The dataset is shared behind an `Arc` so every worker's loader can point at the same
/// buffers while only reading its own range.
#[derive(Debug, Clone)]
pub struct DataLoader {
    dataset: Arc<InMemoryDataset>,
    range: Range<usize>,
    batch_size: NonZeroUsize,
    repetitions: NonZeroUsize,
    seed: Option<u64>,
}

impl DataLoader {
    /// Creates a new `DataLoader`.
    ///
    /// # Arguments
    /// * `dataset` - The shared dataset.
    /// * `range` - The rows owned by this loader, clamped to the dataset length.
    /// * `batch_size` - The maximum amount of rows per batch.
    pub fn new(dataset: Arc<InMemoryDataset>, range: Range<usize>, batch_size: NonZeroUsize) -> Self {
        let end = range.end.min(dataset.len());
        let start = range.start.min(end);

        Self {
            dataset,
            range: start..end,
            batch_size,
            repetitions: NonZeroUsize::MIN,
            seed: None,
        }
    }

    /// Shuffles the rows of every epoch with a generator derived from `seed` and the epoch.
    pub fn with_shuffle(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    /// Makes every epoch walk the shard `repetitions` times.
    pub fn with_repetitions(mut self, repetitions: NonZeroUsize) -> Self {
        self.repetitions = repetitions;
        self
    }

    #[inline]
    pub fn range(&self) -> Range<usize> {
        self.range.clone()
    }

    /// Returns the amount of samples visited per epoch.
    pub fn samples(&self) -> usize {
        self.range.len() * self.repetitions.get()
    }

    /// Returns the amount of batches produced per epoch.
    pub fn len(&self) -> usize {
        self.samples().div_ceil(self.batch_size.get())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Produces the batches for one epoch.
    ///
    /// # Arguments
    /// * `epoch` - The epoch index, mixed into the shuffle seed.
    pub fn epoch_batches(&self, epoch: usize) -> Batches {
        let mut order = Vec::with_capacity(self.samples());
        let mut rng = self
            .seed
            .map(|seed| StdRng::seed_from_u64(seed.wrapping_add(epoch as u64)));

        for _ in 0..self.repetitions.get() {
            let start = order.len();
            order.extend(self.range.clone());

            if let Some(rng) = rng.as_mut() {
                order[start..].shuffle(rng);
            }
        }

        Batches {
            dataset: Arc::clone(&self.dataset),
            order,
            batch_size: self.batch_size.get(),
            cursor: 0,
        }
    }
}

/// One epoch worth of batches from a `DataLoader`.
#[derive(Debug)]
pub struct Batches {
    dataset: Arc<InMemoryDataset>,
    order: Vec<usize>,
    batch_size: usize,
    cursor: usize,
}

impl Iterator for Batches {
    type Item = Batch;

    fn next(&mut self) -> Option<Self::Item> {
        if self.cursor >= self.order.len() {
            return None;
        }

        let end = (self.cursor + self.batch_size).min(self.order.len());
        let batch = self.dataset.gather(&self.order[self.cursor..end]);
        self.cursor = end;
        Some(batch)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let left = (self.order.len() - self.cursor).div_ceil(self.batch_size);
        (left, Some(left))
    }
}

impl ExactSizeIterator for Batches {}
