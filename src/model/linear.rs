use ndarray::prelude::*;
use rand::Rng;

use super::{LossFn, MlErr, Model, ModelState};
use crate::data::Batch;

const WEIGHT: &str = "weight";
const BIAS: &str = "bias";

/// A dense affine model `y = x·W + b`.
#[derive(Debug, Clone)]
pub struct LinearModel {
    dim: (usize, usize),
    state: ModelState,
}

impl LinearModel {
    /// Creates a new `LinearModel` with every parameter set to zero.
    ///
    /// # Arguments
    /// * `dim` - The amount of input features and output values.
    pub fn zeros(dim: (usize, usize)) -> Self {
        let mut state = ModelState::new();
        state.insert(WEIGHT, Array2::<f32>::zeros(dim).into_dyn());
        state.insert(BIAS, Array1::<f32>::zeros(dim.1).into_dyn());
        Self { dim, state }
    }

    /// Creates a new `LinearModel` with Xavier-uniform weights and zero biases.
    ///
    /// # Arguments
    /// * `dim` - The amount of input features and output values.
    /// * `rng` - The random source for the weights.
    pub fn xavier<R: Rng>(dim: (usize, usize), rng: &mut R) -> Self {
        let limit = (6.0 / (dim.0 + dim.1) as f32).sqrt();
        let weight = Array2::from_shape_fn(dim, |_| rng.random_range(-limit..limit));

        let mut state = ModelState::new();
        state.insert(WEIGHT, weight.into_dyn());
        state.insert(BIAS, Array1::<f32>::zeros(dim.1).into_dyn());
        Self { dim, state }
    }

    /// Returns the amount of input features and output values.
    pub fn dim(&self) -> (usize, usize) {
        self.dim
    }

    /// Computes the model's output for a batch of inputs.
    ///
    /// # Arguments
    /// * `x` - One sample per row.
    ///
    /// # Returns
    /// One prediction per row or an `MlErr` if `x` has the wrong amount of features.
    pub fn forward(&self, x: ArrayView2<f32>) -> Result<Array2<f32>, MlErr> {
        let (w, b) = self.view_params()?;

        if x.ncols() != w.nrows() {
            return Err(MlErr::SizeMismatch {
                a: "inputs",
                b: "weights",
                got: x.ncols(),
                expected: w.nrows(),
            });
        }

        Ok(x.dot(&w) + &b)
    }

    fn view_params(&self) -> Result<(ArrayView2<'_, f32>, ArrayView1<'_, f32>), MlErr> {
        let w = view_param::<Ix2>(&self.state, WEIGHT)?;
        let b = view_param::<Ix1>(&self.state, BIAS)?;
        Ok((w, b))
    }
}

fn view_param<'a, D: Dimension>(
    state: &'a ModelState,
    name: &str,
) -> Result<ArrayView<'a, f32, D>, MlErr> {
    let tensor = state.get(name).ok_or_else(|| MlErr::InvalidParam {
        name: name.to_string(),
        reason: "missing".into(),
    })?;

    tensor
        .view()
        .into_dimensionality::<D>()
        .map_err(|e| MlErr::InvalidParam {
            name: name.to_string(),
            reason: e.to_string(),
        })
}

impl Model for LinearModel {
    fn state(&self) -> &ModelState {
        &self.state
    }

    fn state_mut(&mut self) -> &mut ModelState {
        &mut self.state
    }

    fn backprop<L: LossFn>(&self, batch: &Batch, loss_fn: &L) -> Result<(f32, ModelState), MlErr> {
        let x = batch.inputs.view();
        let y = batch.labels.view();

        if y.ncols() != self.dim.1 {
            return Err(MlErr::SizeMismatch {
                a: "labels",
                b: "outputs",
                got: y.ncols(),
                expected: self.dim.1,
            });
        }

        let y_pred = self.forward(x)?;
        let loss = loss_fn.loss(y_pred.view(), y);
        let d = loss_fn.loss_prime(y_pred.view(), y);

        let mut grad = ModelState::new();
        grad.insert(WEIGHT, x.t().dot(&d).into_dyn());
        grad.insert(BIAS, d.sum_axis(Axis(0)).into_dyn());

        Ok((loss, grad))
    }
}

#[cfg(test)]
mod tests {
    use ndarray::arr2;

    use super::*;
    use crate::model::Mse;

    #[test]
    fn test_backprop_gradient_matches_closed_form() {
        let model = LinearModel::zeros((1, 1));
        let batch = Batch::new(arr2(&[[1.0], [2.0]]), arr2(&[[2.0], [4.0]])).unwrap();

        let (loss, grad) = model.backprop(&batch, &Mse::new()).unwrap();

        // y_pred = 0, so loss = (4 + 16) / 2 and d = -y.
        assert_eq!(loss, 10.0);
        assert_eq!(grad.get("weight").unwrap(), &arr2(&[[-10.0]]).into_dyn());
        assert_eq!(grad.get("bias").unwrap(), &ndarray::arr1(&[-6.0]).into_dyn());
    }

    #[test]
    fn test_forward_rejects_wrong_feature_count() {
        let model = LinearModel::zeros((2, 1));
        let x = arr2(&[[1.0, 2.0, 3.0]]);
        assert!(model.forward(x.view()).is_err());
    }
}
