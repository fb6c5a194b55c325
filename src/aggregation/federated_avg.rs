use std::collections::BTreeMap;

use ndarray::Zip;
use rayon::prelude::*;

use super::{AggregationErr, Weights};
use crate::{id::WorkerId, model::ModelState};

/// Merges the given models into their weighted per parameter average.
///
/// Models are combined in worker id order, so the result does not depend on the order the
/// iterator yields them in. Each parameter is averaged on its own rayon task, and large
/// tensors are further split by ndarray's parallel `Zip`.
///
/// # Arguments
/// * `models` - The models to merge, keyed by the worker that produced them.
/// * `weights` - The weights of the workers, restricted to the merged ids and renormalized.
///   Uniform weights are used if `None`.
///
/// # Returns
/// `None` if there are no models, a copy of the model if there is only one, or the weighted
/// average. An `AggregationErr` if the layouts differ or the weights are unusable.
pub fn federated_avg<'a, I>(
    models: I,
    weights: Option<&Weights>,
) -> Result<Option<ModelState>, AggregationErr>
where
    I: IntoIterator<Item = (WorkerId, &'a ModelState)>,
{
    let models: BTreeMap<WorkerId, &ModelState> = models.into_iter().collect();
    let ids: Vec<WorkerId> = models.keys().copied().collect();

    let Some((&first_id, &first)) = models.iter().next() else {
        return Ok(None);
    };

    if models.len() == 1 {
        return Ok(Some(first.clone()));
    }

    for (&worker, model) in models.iter().skip(1) {
        if let Some(mismatch) = first.layout_mismatch(model) {
            return Err(AggregationErr::Layout { worker, mismatch });
        }
    }

    let weights = match weights {
        Some(weights) => weights.restrict(&ids)?,
        None => Weights::uniform(ids.iter().copied()).restrict(&ids)?,
    };

    let scaled: Vec<(f32, &ModelState)> = models
        .iter()
        .map(|(&id, &model)| (weights.get(id).unwrap_or(0.), model))
        .collect();

    let first_weight = weights.get(first_id).unwrap_or(0.);
    let names: Vec<&String> = first.iter().map(|(name, _)| name).collect();

    let merged = names
        .par_iter()
        .map(|&name| {
            let mut acc = first
                .get(name)
                .map(|t| t.mapv(|x| x * first_weight))
                .unwrap_or_default();

            for (w, model) in scaled.iter().skip(1) {
                if let Some(tensor) = model.get(name) {
                    let w = *w;
                    Zip::from(&mut acc)
                        .and(tensor)
                        .par_for_each(|a, &t| *a += w * t);
                }
            }

            (name.clone(), acc)
        })
        .collect::<Vec<_>>();

    Ok(Some(merged.into_iter().collect()))
}
