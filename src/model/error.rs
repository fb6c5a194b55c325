use std::{
    error::Error,
    fmt::{self, Display},
};

use super::LayoutMismatch;

/// The machine learning module's error type.
///
/// Raised by local training steps: models, losses and optimizers.
#[derive(Debug)]
pub enum MlErr {
    SizeMismatch {
        a: &'static str,
        b: &'static str,
        got: usize,
        expected: usize,
    },
    Layout(LayoutMismatch),
    InvalidParam {
        name: String,
        reason: String,
    },
}

impl Display for MlErr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MlErr::SizeMismatch {
                a,
                b,
                got,
                expected,
            } => write!(
                f,
                "There's a size mismatch between {a} and {b}, got {got} and expected {expected}"
            ),
            MlErr::Layout(mismatch) => write!(f, "model layout mismatch: {mismatch}"),
            MlErr::InvalidParam { name, reason } => {
                write!(f, "parameter `{name}` is invalid: {reason}")
            }
        }
    }
}

impl Error for MlErr {}

impl From<LayoutMismatch> for MlErr {
    fn from(value: LayoutMismatch) -> Self {
        Self::Layout(value)
    }
}
