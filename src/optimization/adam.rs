use std::collections::HashMap;

use ndarray::{ArrayD, Zip};

use super::{optimizer::check_layout, Optimizer};
use crate::model::{MlErr, ModelState};

#[derive(Debug, Default)]
struct Moments {
    v: ArrayD<f32>,
    s: ArrayD<f32>,
}

#[derive(Debug)]
pub struct Adam {
    learning_rate: f32,
    beta1: f32,
    beta2: f32,
    beta1_t: f32,
    beta2_t: f32,
    moments: HashMap<String, Moments>,
    epsilon: f32,
}

impl Adam {
    /// Creates a new `Adam` optimizer.
    ///
    /// # Arguments
    /// * `learning_rate` - The small coefficient that modulates the amount of training per update.
    /// * `beta1`, `beta2`, `epsilon` - Hyperparameters to the optimization algorithm.
    ///
    /// # Returns
    /// A new `Adam` instance.
    pub fn new(learning_rate: f32, beta1: f32, beta2: f32, epsilon: f32) -> Self {
        Self {
            learning_rate,
            beta1,
            beta2,
            beta1_t: 1.,
            beta2_t: 1.,
            moments: HashMap::new(),
            epsilon,
        }
    }
}

impl Optimizer for Adam {
    fn update_params(&mut self, grad: &ModelState, params: &mut ModelState) -> Result<(), MlErr> {
        check_layout(grad, params)?;

        let Self {
            learning_rate: lr,
            beta1: b1,
            beta2: b2,
            epsilon: eps,
            ..
        } = *self;

        self.beta1_t *= b1;
        self.beta2_t *= b2;

        let bc1 = 1. - self.beta1_t;
        let bc2 = 1. - self.beta2_t;
        let step_size = lr * (bc2.sqrt() / bc1);

        for (name, p) in params.iter_mut() {
            let Some(g) = grad.get(name) else {
                continue;
            };

            let Moments { v, s } = self.moments.entry(name.clone()).or_insert_with(|| Moments {
                v: ArrayD::zeros(g.raw_dim()),
                s: ArrayD::zeros(g.raw_dim()),
            });

            Zip::from(p)
                .and(g)
                .and(v)
                .and(s)
                .for_each(|p, &g, v, s| {
                    *v = b1 * *v + (1. - b1) * g;
                    *s = b2 * *s + (1. - b2) * g.powi(2);
                    *p -= step_size * *v / (s.sqrt() + eps);
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
