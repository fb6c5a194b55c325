use crate::{
    data::Batch,
    model::{LossFn, MlErr, Model},
    optimization::Optimizer,
};

/// Runs one forward, backward and update pass over a batch.
///
/// # Returns
/// The batch loss before the update.
pub fn local_step<M, L>(
    model: &mut M,
    optimizer: &mut dyn Optimizer,
    batch: &Batch,
    loss_fn: &L,
) -> Result<f32, MlErr>
where
    M: Model,
    L: LossFn,
{
    let (loss, grad) = model.backprop(batch, loss_fn)?;
    optimizer.update_params(&grad, model.state_mut())?;
    Ok(loss)
}

/// Trains on every batch in order with no synchronization at all.
///
/// # Returns
/// The mean batch loss, zero if there were no batches.
pub fn train_locally<M, L, I>(
    model: &mut M,
    optimizer: &mut dyn Optimizer,
    batches: I,
    loss_fn: &L,
) -> Result<f32, MlErr>
where
    M: Model,
    L: LossFn,
    I: IntoIterator<Item = Batch>,
{
    let mut total = 0.;
    let mut n = 0;

    for batch in batches {
        total += local_step(model, optimizer, &batch, loss_fn)?;
        n += 1;
    }

    Ok(mean(total, n))
}

pub(super) fn mean(total: f32, n: usize) -> f32 {
    if n == 0 {
        0.
    } else {
        total / n as f32
    }
}

#[cfg(test)]
mod tests {
    use ndarray::arr2;

    use super::*;
    use crate::{
        model::{LinearModel, Mse},
        optimization::GradientDescent,
    };

    #[test]
    fn local_training_reduces_loss() {
        let batch = Batch::new(arr2(&[[1.], [2.], [3.]]), arr2(&[[2.], [4.], [6.]])).unwrap();
        let mut model = LinearModel::zeros((1, 1));
        let mut opt = GradientDescent::new(0.05);

        let first = train_locally(&mut model, &mut opt, [batch.clone()], &Mse).unwrap();
        let later = train_locally(&mut model, &mut opt, vec![batch; 20], &Mse).unwrap();
        assert!(later < first);
    }
}
