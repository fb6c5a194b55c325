use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::AggregationErr;
use crate::id::WorkerId;

/// How much each worker's model counts in a merge.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WeightingScheme {
    /// Every participating worker counts the same.
    #[default]
    Uniform,
    /// Workers count proportionally to their amount of local batches.
    Proportional,
}

impl WeightingScheme {
    /// Computes the weights of an epoch from every worker's amount of local batches.
    pub fn weights(&self, batches: &[(WorkerId, usize)]) -> Weights {
        match self {
            WeightingScheme::Uniform => Weights::uniform(batches.iter().map(|&(id, _)| id)),
            WeightingScheme::Proportional => Weights::proportional(batches),
        }
    }
}

/// Non negative per worker weights, normalized only when restricted to a set of participants.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Weights(BTreeMap<WorkerId, f32>);

impl Weights {
    pub fn uniform(ids: impl IntoIterator<Item = WorkerId>) -> Self {
        Self(ids.into_iter().map(|id| (id, 1.)).collect())
    }

    pub fn proportional(batches: &[(WorkerId, usize)]) -> Self {
        Self(batches.iter().map(|&(id, n)| (id, n as f32)).collect())
    }

    pub fn get(&self, id: WorkerId) -> Option<f32> {
        self.0.get(&id).copied()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Keeps the weights of `ids` only, rescaled so they sum to one.
    ///
    /// # Arguments
    /// * `ids` - The workers taking part in a merge.
    ///
    /// # Returns
    /// The normalized weights or an `AggregationErr` if any participant has no valid weight
    /// or if all of them are zero.
    pub fn restrict(&self, ids: &[WorkerId]) -> Result<Weights, AggregationErr> {
        let mut restricted = BTreeMap::new();

        for &worker in ids {
            let weight = self
                .get(worker)
                .ok_or(AggregationErr::MissingWeight { worker })?;

            if !weight.is_finite() || weight < 0. {
                return Err(AggregationErr::InvalidWeight { worker, weight });
            }

            restricted.insert(worker, weight);
        }

        let total: f32 = restricted.values().sum();
        if total <= 0. {
            return Err(AggregationErr::ZeroTotalWeight);
        }

        restricted.values_mut().for_each(|w| *w /= total);
        Ok(Self(restricted))
    }
}

impl FromIterator<(WorkerId, f32)> for Weights {
    fn from_iter<T: IntoIterator<Item = (WorkerId, f32)>>(iter: T) -> Self {
        Self(iter.into_iter().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const A: WorkerId = WorkerId::new(0);
    const B: WorkerId = WorkerId::new(1);
    const C: WorkerId = WorkerId::new(2);

    #[test]
    fn proportional_weights_follow_batch_counts() {
        let weights = WeightingScheme::Proportional
            .weights(&[(A, 300), (B, 100)])
            .restrict(&[A, B])
            .unwrap();

        assert_eq!(weights.get(A), Some(0.75));
        assert_eq!(weights.get(B), Some(0.25));
    }

    #[test]
    fn restrict_renormalizes_over_participants() {
        let weights = Weights::uniform([A, B, C]).restrict(&[A, C]).unwrap();
        assert_eq!(weights.get(A), Some(0.5));
        assert_eq!(weights.get(B), None);
    }

    #[test]
    fn restrict_rejects_bad_weights() {
        let weights: Weights = [(A, -1.), (B, 0.), (C, f32::NAN)].into_iter().collect();

        assert_eq!(
            weights.restrict(&[A]),
            Err(AggregationErr::InvalidWeight {
                worker: A,
                weight: -1.
            })
        );
        assert_eq!(weights.restrict(&[B]), Err(AggregationErr::ZeroTotalWeight));
        assert!(matches!(
            weights.restrict(&[C]),
            Err(AggregationErr::InvalidWeight { worker: C, .. })
        ));
        assert_eq!(
            Weights::uniform([A]).restrict(&[B]),
            Err(AggregationErr::MissingWeight { worker: B })
        );
    }
}
