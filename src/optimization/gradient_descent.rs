use super::{optimizer::check_layout, Optimizer};
use crate::model::{MlErr, ModelState};

#[derive(Debug)]
pub struct GradientDescent {
    learning_rate: f32,
}

impl GradientDescent {
    /// Creates a new `GradientDescent` optimizer.
    ///
    /// # Arguments
    /// * `learning_rate` - The small coefficient that modulates the amount of training per update.
    ///
    /// # Returns
    /// A new `GradientDescent` instance.
    pub fn new(learning_rate: f32) -> Self {
        Self { learning_rate }
    }
}

impl Optimizer for GradientDescent {
    fn update_params(&mut self, grad: &ModelState, params: &mut ModelState) -> Result<(), MlErr> {
        check_layout(grad, params)?;

        let lr = self.learning_rate;

        for (name, p) in params.iter_mut() {
            if let Some(g) = grad.get(name) {
                p.scaled_add(-lr, g);
            }
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
