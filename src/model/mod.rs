mod error;
mod linear;
mod loss;
mod model;
mod state;

pub use error::MlErr;
pub use linear::LinearModel;
pub use loss::{LossFn, Mse};
pub use model::Model;
pub use state::{LayoutMismatch, ModelState};
