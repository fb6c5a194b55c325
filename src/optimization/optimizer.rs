use serde::{Deserialize, Serialize};

use super::{Adam, GradientDescent, GradientDescentWithMomentum};
use crate::{
    config::ConfigErr,
    model::{MlErr, ModelState},
};

/// Defines the strategy for updating model parameters based on calculated gradients.
pub trait Optimizer: Send {
    /// Updates the parameters using the gradient of a single local step.
    ///
    /// # Arguments
    /// * `grad` - The model's gradient, laid out like `params`.
    /// * `params` - The parameters to update.
    ///
    /// # Returns
    /// An error if the layouts of `grad` and `params` differ.
    fn update_params(&mut self, grad: &ModelState, params: &mut ModelState) -> Result<(), MlErr>;

    /// Returns the current learning rate.
    fn learning_rate(&self) -> f32;

    /// Replaces the learning rate without touching any accumulated state.
    fn set_learning_rate(&mut self, learning_rate: f32);
}

/// The hyperparameters an `Optimizer` is built from.
///
/// Rebuilding from an `OptimizerSpec` is how a worker discards momentum or moment estimates while
/// keeping the same hyperparameters.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OptimizerSpec {
    Adam {
        learning_rate: f32,
        beta1: f32,
        beta2: f32,
        epsilon: f32,
    },
    GradientDescent {
        learning_rate: f32,
    },
    GradientDescentWithMomentum {
        learning_rate: f32,
        momentum: f32,
    },
}

impl Default for OptimizerSpec {
    fn default() -> Self {
        Self::GradientDescentWithMomentum {
            learning_rate: 1e-3,
            momentum: 0.5,
        }
    }
}

impl OptimizerSpec {
    /// Builds a fresh optimizer with no accumulated state.
    pub fn build(&self) -> Box<dyn Optimizer> {
        match *self {
            OptimizerSpec::Adam {
                learning_rate,
                beta1,
                beta2,
                epsilon,
            } => Box::new(Adam::new(learning_rate, beta1, beta2, epsilon)),
            OptimizerSpec::GradientDescent { learning_rate } => {
                Box::new(GradientDescent::new(learning_rate))
            }
            OptimizerSpec::GradientDescentWithMomentum {
                learning_rate,
                momentum,
            } => Box::new(GradientDescentWithMomentum::new(learning_rate, momentum)),
        }
    }

    pub fn learning_rate(&self) -> f32 {
        match *self {
            OptimizerSpec::Adam { learning_rate, .. }
            | OptimizerSpec::GradientDescent { learning_rate }
            | OptimizerSpec::GradientDescentWithMomentum { learning_rate, .. } => learning_rate,
        }
    }

    /// Returns a copy of this spec with another learning rate.
    pub fn with_learning_rate(mut self, lr: f32) -> Self {
        match &mut self {
            OptimizerSpec::Adam { learning_rate, .. }
            | OptimizerSpec::GradientDescent { learning_rate }
            | OptimizerSpec::GradientDescentWithMomentum { learning_rate, .. } => {
                *learning_rate = lr
            }
        }
        self
    }

    /// Checks the hyperparameters are usable.
    ///
    /// # Returns
    /// A `ConfigErr` naming the first offending hyperparameter.
    pub fn validate(&self) -> Result<(), ConfigErr> {
        let lr = self.learning_rate();
        if !lr.is_finite() || lr <= 0.0 {
            return Err(ConfigErr::Hyperparameter {
                name: "learning_rate",
                value: lr,
            });
        }

        let unit = |name, value: f32| {
            if (0.0..1.0).contains(&value) {
                Ok(())
            } else {
                Err(ConfigErr::Hyperparameter { name, value })
            }
        };

        match *self {
            OptimizerSpec::Adam {
                beta1,
                beta2,
                epsilon,
                ..
            } => {
                unit("beta1", beta1)?;
                unit("beta2", beta2)?;
                if !epsilon.is_finite() || epsilon <= 0.0 {
                    return Err(ConfigErr::Hyperparameter {
                        name: "epsilon",
                        value: epsilon,
                    });
                }
                Ok(())
            }
            OptimizerSpec::GradientDescent { .. } => Ok(()),
            OptimizerSpec::GradientDescentWithMomentum { momentum, .. } => {
                unit("momentum", momentum)
            }
        }
    }
}

/// Fails on the first layout difference between a gradient and the parameters it updates.
pub(super) fn check_layout(grad: &ModelState, params: &ModelState) -> Result<(), MlErr> {
    match params.layout_mismatch(grad) {
        Some(mismatch) => Err(MlErr::Layout(mismatch)),
        None => Ok(()),
    }
}
