use std::collections::HashMap;

use super::{Optimizer, OptimizerSpec};
use crate::id::WorkerId;

/// Per worker optimizers that survive from one epoch to the next.
///
/// A worker takes its optimizer out for the length of an epoch and hands it back when it
/// finishes, so the bank never holds an optimizer that is in use.
pub struct OptimizerBank {
    spec: OptimizerSpec,
    optimizers: HashMap<WorkerId, Box<dyn Optimizer>>,
}

impl OptimizerBank {
    pub fn new(spec: OptimizerSpec) -> Self {
        Self {
            spec,
            optimizers: HashMap::new(),
        }
    }

    /// The hyperparameters fresh optimizers are built from, carrying the current learning rate.
    pub fn spec(&self) -> OptimizerSpec {
        self.spec
    }

    /// Changes the learning rate of fresh and stored optimizers alike.
    pub fn set_learning_rate(&mut self, lr: f32) {
        self.spec = self.spec.with_learning_rate(lr);
        for optimizer in self.optimizers.values_mut() {
            optimizer.set_learning_rate(lr);
        }
    }

    /// Takes the optimizer of `id` out of the bank, building a fresh one if there is none.
    pub fn take(&mut self, id: WorkerId) -> Box<dyn Optimizer> {
        self.optimizers
            .remove(&id)
            .unwrap_or_else(|| self.spec.build())
    }

    pub fn restore(&mut self, id: WorkerId, optimizer: Box<dyn Optimizer>) {
        self.optimizers.insert(id, optimizer);
    }

    pub fn len(&self) -> usize {
        self.optimizers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.optimizers.is_empty()
    }
}
