//! Fully connected layer

use super::init::{ParamInit, INIT_STD};
use super::{join, Parameterized};
use crate::autograd::linear;
use crate::Tensor;

/// `y = x · Wᵀ + b` over the last dimension
pub struct Linear {
    /// Weight (out_features x in_features)
    pub weight: Tensor,
    /// Bias (out_features)
    pub bias: Option<Tensor>,
}

impl Linear {
    /// Create with truncated-normal weights and zero bias
    pub fn new(in_features: usize, out_features: usize, init: &mut ParamInit) -> Self {
        Self {
            weight: init.trunc_normal(&[out_features, in_features], INIT_STD),
            bias: Some(init.zeros(&[out_features])),
        }
    }

    /// Input width
    pub fn in_features(&self) -> usize {
        self.weight.shape()[1]
    }

    /// Output width
    pub fn out_features(&self) -> usize {
        self.weight.shape()[0]
    }

    /// Forward pass; leading dimensions of `x` are kept
    pub fn forward(&self, x: &Tensor) -> Tensor {
        let y = linear(x, &self.weight, self.bias.as_ref());
        let mut shape = x.shape().to_vec();
        if let Some(last) = shape.last_mut() {
            *last = self.out_features();
        }
        y.reshape(&shape)
    }
}

impl Parameterized for Linear {
    fn named_parameters(&self, prefix: &str) -> Vec<(String, &Tensor)> {
        let mut params = vec![(join(prefix, "weight"), &self.weight)];
        if let Some(b) = &self.bias {
            params.push((join(prefix, "bias"), b));
        }
        params
    }

    fn named_parameters_mut(&mut self, prefix: &str) -> Vec<(String, &mut Tensor)> {
        let mut params = vec![(join(prefix, "weight"), &mut self.weight)];
        if let Some(b) = &mut self.bias {
            params.push((join(prefix, "bias"), b));
        }
        params
    }
}
