use super::{LossFn, MlErr, ModelState};
use crate::data::Batch;

/// A trainable model whose parameters can be published, merged and loaded back.
///
/// Workers clone the epoch's starting model, so implementations must be cheap enough
/// to clone once per worker and per epoch.
pub trait Model: Clone + Send + 'static {
    /// Returns the current parameters of the model.
    fn state(&self) -> &ModelState;

    /// Returns the parameters of the model for in-place updates.
    fn state_mut(&mut self) -> &mut ModelState;

    /// Replaces the parameters of the model with `state`.
    ///
    /// # Arguments
    /// * `state` - The parameters to load, must share this model's layout.
    ///
    /// # Returns
    /// An `MlErr` if the layout of `state` doesn't match this model.
    fn load_state(&mut self, state: &ModelState) -> Result<(), MlErr> {
        self.state_mut().assign(state)
    }

    /// Runs the forward and backward passes over a batch.
    ///
    /// # Arguments
    /// * `batch` - The inputs and labels to train on.
    /// * `loss_fn` - The loss function to minimize.
    ///
    /// # Returns
    /// The batch loss and the gradient of every parameter, laid out like `state`.
    fn backprop<L: LossFn>(&self, batch: &Batch, loss_fn: &L) -> Result<(f32, ModelState), MlErr>;
}
