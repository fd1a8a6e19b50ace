//! Layer normalization module

use super::{join, Parameterized};
use crate::autograd::layer_norm;
use crate::Tensor;

/// Epsilon used by every ViT LayerNorm
pub const LAYER_NORM_EPS: f32 = 1e-6;

/// Layer normalization over the last dimension
pub struct LayerNorm {
    /// Scale
    pub weight: Tensor,
    /// Shift
    pub bias: Tensor,
    eps: f32,
}

impl LayerNorm {
    /// Create with unit scale and zero shift
    pub fn new(dim: usize, eps: f32) -> Self {
        Self {
            weight: Tensor::ones(&[dim], true),
            bias: Tensor::zeros(&[dim], true),
            eps,
        }
    }

    /// Forward pass
    ///
    /// LayerNorm(x) = (x - mean) / sqrt(var + eps) * weight + bias
    pub fn forward(&self, x: &Tensor) -> Tensor {
        layer_norm(x, &self.weight, &self.bias, self.eps)
    }
}

impl Parameterized for LayerNorm {
    fn named_parameters(&self, prefix: &str) -> Vec<(String, &Tensor)> {
        vec![
            (join(prefix, "weight"), &self.weight),
            (join(prefix, "bias"), &self.bias),
        ]
    }

    fn named_parameters_mut(&mut self, prefix: &str) -> Vec<(String, &mut Tensor)> {
        vec![
            (join(prefix, "weight"), &mut self.weight),
            (join(prefix, "bias"), &mut self.bias),
        ]
    }
}
