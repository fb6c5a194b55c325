use std::{
    collections::{btree_map, BTreeMap},
    fmt,
};

use ndarray::ArrayD;
use serde::{Deserialize, Serialize};

use super::MlErr;

/// The trainable parameters of a model at a point in time, indexed by parameter name.
///
/// Parameters are kept in a `BTreeMap` so every traversal visits them in the same order,
/// which keeps aggregation and optimizer updates deterministic.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ModelState {
    params: BTreeMap<String, ArrayD<f32>>,
}

/// The first difference found between the parameter layouts of two `ModelState`s.
#[derive(Debug, Clone, PartialEq)]
pub enum LayoutMismatch {
    /// One side has a parameter the other lacks.
    MissingParam(String),
    /// Both sides have the parameter but with different shapes.
    Shape {
        name: String,
        got: Vec<usize>,
        expected: Vec<usize>,
    },
}

impl fmt::Display for LayoutMismatch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LayoutMismatch::MissingParam(name) => write!(f, "parameter `{name}` is missing"),
            LayoutMismatch::Shape {
                name,
                got,
                expected,
            } => write!(
                f,
                "parameter `{name}` has shape {got:?}, expected {expected:?}"
            ),
        }
    }
}

impl ModelState {
    /// Creates an empty `ModelState`.
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts a parameter tensor, returning the previous tensor under that name if any.
    pub fn insert(&mut self, name: impl Into<String>, tensor: ArrayD<f32>) -> Option<ArrayD<f32>> {
        self.params.insert(name.into(), tensor)
    }

    pub fn get(&self, name: &str) -> Option<&ArrayD<f32>> {
        self.params.get(name)
    }

    pub fn get_mut(&mut self, name: &str) -> Option<&mut ArrayD<f32>> {
        self.params.get_mut(name)
    }

    /// Returns the amount of named parameter tensors.
    pub fn len(&self) -> usize {
        self.params.len()
    }

    pub fn is_empty(&self) -> bool {
        self.params.is_empty()
    }

    /// Returns the total amount of scalar parameters across every tensor.
    pub fn num_params(&self) -> usize {
        self.params.values().map(|t| t.len()).sum()
    }

    pub fn iter(&self) -> btree_map::Iter<'_, String, ArrayD<f32>> {
        self.params.iter()
    }

    pub fn iter_mut(&mut self) -> btree_map::IterMut<'_, String, ArrayD<f32>> {
        self.params.iter_mut()
    }

    /// Compares the parameter layout of `self` against `other`.
    ///
    /// # Arguments
    /// * `other` - The state whose names and shapes should match this one.
    ///
    /// # Returns
    /// `None` if both states hold the same parameter names with the same shapes,
    /// otherwise the first mismatch found.
    pub fn layout_mismatch(&self, other: &ModelState) -> Option<LayoutMismatch> {
        for (name, tensor) in &self.params {
            let Some(theirs) = other.params.get(name) else {
                return Some(LayoutMismatch::MissingParam(name.clone()));
            };

            if tensor.shape() != theirs.shape() {
                return Some(LayoutMismatch::Shape {
                    name: name.clone(),
                    got: theirs.shape().to_vec(),
                    expected: tensor.shape().to_vec(),
                });
            }
        }

        other
            .params
            .keys()
            .find(|name| !self.params.contains_key(*name))
            .map(|name| LayoutMismatch::MissingParam(name.clone()))
    }

    /// Overwrites every parameter with the values from `other`.
    ///
    /// # Arguments
    /// * `other` - The state to copy the values from.
    ///
    /// # Returns
    /// An `MlErr` if the layouts differ, in which case `self` is left untouched.
    pub fn assign(&mut self, other: &ModelState) -> Result<(), MlErr> {
        if let Some(mismatch) = self.layout_mismatch(other) {
            return Err(MlErr::Layout(mismatch));
        }

        for (name, tensor) in self.params.iter_mut() {
            if let Some(src) = other.params.get(name) {
                tensor.assign(src);
            }
        }

        Ok(())
    }
}

impl FromIterator<(String, ArrayD<f32>)> for ModelState {
    fn from_iter<T: IntoIterator<Item = (String, ArrayD<f32>)>>(iter: T) -> Self {
        Self {
            params: iter.into_iter().collect(),
        }
    }
}

impl<'a> IntoIterator for &'a ModelState {
    type Item = (&'a String, &'a ArrayD<f32>);
    type IntoIter = btree_map::Iter<'a, String, ArrayD<f32>>;

    fn into_iter(self) -> Self::IntoIter {
        self.params.iter()
    }
}

#[cfg(test)]
mod tests {
    use ndarray::{arr1, arr2};

    use super::*;

    fn state(w: ArrayD<f32>, b: ArrayD<f32>) -> ModelState {
        let mut state = ModelState::new();
        state.insert("weight", w);
        state.insert("bias", b);
        state
    }

    #[test]
    fn test_layout_matches_same_shapes() {
        let a = state(arr2(&[[1., 2.]]).into_dyn(), arr1(&[0.]).into_dyn());
        let b = state(arr2(&[[3., 4.]]).into_dyn(), arr1(&[1.]).into_dyn());

        assert_eq!(a.layout_mismatch(&b), None);
        assert_eq!(a.num_params(), 3);
    }

    #[test]
    fn test_layout_detects_shape_and_missing_params() {
        let a = state(arr2(&[[1., 2.]]).into_dyn(), arr1(&[0.]).into_dyn());
        let b = state(arr2(&[[1.], [2.]]).into_dyn(), arr1(&[0.]).into_dyn());

        assert!(matches!(
            a.layout_mismatch(&b),
            Some(LayoutMismatch::Shape { ref name, .. }) if name == "weight"
        ));

        let mut c = a.clone();
        c.insert("extra", arr1(&[1.]).into_dyn());
        assert_eq!(
            a.layout_mismatch(&c),
            Some(LayoutMismatch::MissingParam("extra".into()))
        );
        assert_eq!(
            c.layout_mismatch(&a),
            Some(LayoutMismatch::MissingParam("extra".into()))
        );
    }

    #[test]
    fn test_assign_rejects_mismatch_without_mutating() {
        let mut a = state(arr2(&[[1., 2.]]).into_dyn(), arr1(&[0.]).into_dyn());
        let b = state(arr2(&[[1.], [2.]]).into_dyn(), arr1(&[5.]).into_dyn());
        let before = a.clone();

        assert!(a.assign(&b).is_err());
        assert_eq!(a, before);

        let c = state(arr2(&[[7., 8.]]).into_dyn(), arr1(&[9.]).into_dyn());
        a.assign(&c).unwrap();
        assert_eq!(a, c);
    }
}
