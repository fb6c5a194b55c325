use std::collections::HashMap;

use ndarray::{ArrayD, Zip};

use super::{optimizer::check_layout, Optimizer};
use crate::model::{MlErr, ModelState};

#[derive(Debug)]
pub struct GradientDescentWithMomentum {
    learning_rate: f32,
    momentum: f32,
    velocity: HashMap<String, ArrayD<f32>>,
}

impl GradientDescentWithMomentum {
    /// Creates a new `GradientDescentWithMomentum` optimizer.
    ///
    /// The velocity buffers are allocated lazily on the first update, shaped like the gradient.
    ///
    /// # Arguments
    /// * `learning_rate` - The small coefficient that modulates the amount of training per update.
    /// * `momentum` - Hyperparameter to the optimization algorithm.
    ///
    /// # Returns
    /// A new `GradientDescentWithMomentum` instance.
    pub fn new(learning_rate: f32, momentum: f32) -> Self {
        Self {
            learning_rate,
            momentum,
            velocity: HashMap::new(),
        }
    }
}

impl Optimizer for GradientDescentWithMomentum {
    fn update_params(&mut self, grad: &ModelState, params: &mut ModelState) -> Result<(), MlErr> {
        check_layout(grad, params)?;

        let lr = self.learning_rate;
        let mu = self.momentum;

        for (name, p) in params.iter_mut() {
            let Some(g) = grad.get(name) else {
                continue;
            };

            let v = self
                .velocity
                .entry(name.clone())
                .or_insert_with(|| ArrayD::zeros(g.raw_dim()));

            Zip::from(p).and(g).and(v).for_each(|p, &g, v| {
                *v = (mu * *v) + g;
                *p -= lr * *v;
            });
        }

        Ok(())
    }

    fn learning_rate(&self) -> f32 {
        self.learning_rate
    }

    fn set_learning_rate(&mut self, learning_rate: f32) {
        self.learning_rate = learning_rate;
    }
}

#[cfg(test)]
mod tests {
    use ndarray::arr1;

    use super::*;

    #[test]
    fn test_velocity_accumulates_between_steps() {
        let mut params = ModelState::new();
        params.insert("w", arr1(&[0.0]).into_dyn());

        let mut grad = ModelState::new();
        grad.insert("w", arr1(&[1.0]).into_dyn());

        let mut opt = GradientDescentWithMomentum::new(1.0, 0.5);
        opt.update_params(&grad, &mut params).unwrap();
        assert_eq!(params.get("w").unwrap()[[0]], -1.0);

        // v = 0.5 * 1 + 1 = 1.5
        opt.update_params(&grad, &mut params).unwrap();
        assert_eq!(params.get("w").unwrap()[[0]], -2.5);
    }
}
