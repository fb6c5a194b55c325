use ndarray::{Array2, ArrayView2, Axis};

use crate::model::MlErr;

/// A supervised in-memory dataset, one sample per row.
#[derive(Debug, Clone)]
pub struct InMemoryDataset {
    xs: Array2<f32>,
    ys: Array2<f32>,
}

impl InMemoryDataset {
    /// Creates a new dataset from owned buffers.
    ///
    /// # Arguments
    /// * `xs` - The inputs, one sample per row.
    /// * `ys` - The labels, one sample per row.
    ///
    /// # Returns
    /// An `MlErr` if `xs` and `ys` hold a different amount of rows.
    pub fn new(xs: Array2<f32>, ys: Array2<f32>) -> Result<Self, MlErr> {
        if xs.nrows() != ys.nrows() {
            return Err(MlErr::SizeMismatch {
                a: "inputs",
                b: "labels",
                got: ys.nrows(),
                expected: xs.nrows(),
            });
        }

        Ok(Self { xs, ys })
    }

    /// Returns the amount of samples.
    #[inline]
    pub fn len(&self) -> usize {
        self.xs.nrows()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    #[inline]
    pub fn xs(&self) -> ArrayView2<'_, f32> {
        self.xs.view()
    }

    #[inline]
    pub fn ys(&self) -> ArrayView2<'_, f32> {
        self.ys.view()
    }

    /// Copies the given rows into an owned batch.
    ///
    /// # Panics
    /// If any index is out of bounds.
    pub fn gather(&self, indices: &[usize]) -> Batch {
        Batch {
            inputs: self.xs.select(Axis(0), indices),
            labels: self.ys.select(Axis(0), indices),
        }
    }
}

/// An owned batch of training data.
///
/// Batches are moved into the blocking pool for each local step, so they own their rows.
#[derive(Debug, Clone, PartialEq)]
pub struct Batch {
    pub inputs: Array2<f32>,
    pub labels: Array2<f32>,
}

impl Batch {
    /// Creates a new `Batch`.
    ///
    /// # Returns
    /// An `MlErr` if `inputs` and `labels` hold a different amount of rows.
    pub fn new(inputs: Array2<f32>, labels: Array2<f32>) -> Result<Self, MlErr> {
        if inputs.nrows() != labels.nrows() {
            return Err(MlErr::SizeMismatch {
                a: "inputs",
                b: "labels",
                got: labels.nrows(),
                expected: inputs.nrows(),
            });
        }

        Ok(Self { inputs, labels })
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.inputs.nrows()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use ndarray::arr2;

    use super::*;

    #[test]
    fn dataset_rejects_ragged_buffers() {
        let xs = arr2(&[[1.0], [2.0]]);
        let ys = arr2(&[[3.0]]);
        assert!(InMemoryDataset::new(xs, ys).is_err());
    }

    #[test]
    fn dataset_gathers_rows() {
        let ds = InMemoryDataset::new(arr2(&[[1.0], [2.0], [3.0]]), arr2(&[[4.0], [5.0], [6.0]]))
            .unwrap();

        let batch = ds.gather(&[2, 0]);
        assert_eq!(batch.len(), 2);
        assert_eq!(batch.inputs, arr2(&[[3.0], [1.0]]));
        assert_eq!(batch.labels, arr2(&[[6.0], [4.0]]));
    }
}
