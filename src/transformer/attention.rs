//! Multi-head self-attention with a packed qkv projection

use super::init::ParamInit;
use super::linear::Linear;
use super::{join, Parameterized};
use crate::autograd::{multi_head_attention, AttentionShape};
use crate::Tensor;

/// Multi-head self-attention layer
pub struct Attention {
    /// Packed query/key/value projection (3 * dim x dim)
    pub qkv: Linear,
    /// Output projection (dim x dim)
    pub proj: Linear,
    num_heads: usize,
}

impl Attention {
    /// Create a new attention layer
    pub fn new(dim: usize, num_heads: usize, init: &mut ParamInit) -> Self {
        Self {
            qkv: Linear::new(dim, 3 * dim, init),
            proj: Linear::new(dim, dim, init),
            num_heads,
        }
    }

    /// Number of heads
    pub fn num_heads(&self) -> usize {
        self.num_heads
    }

    /// Forward pass over `(batch, tokens, dim)`
    pub fn forward(&self, x: &Tensor) -> Tensor {
        let (batch, seq_len, dim) = match x.shape() {
            [b, n, d] => (*b, *n, *d),
            other => panic!("attention: expected (batch, tokens, dim), got {other:?}"),
        };
        let shape = AttentionShape {
            batch,
            seq_len,
            num_heads: self.num_heads,
            head_dim: dim / self.num_heads,
        };

        let qkv = self.qkv.forward(x);
        let mixed = multi_head_attention(&qkv, shape);
        self.proj.forward(&mixed)
    }
}

impl Parameterized for Attention {
    fn named_parameters(&self, prefix: &str) -> Vec<(String, &Tensor)> {
        let mut params = self.qkv.named_parameters(&join(prefix, "qkv"));
        params.extend(self.proj.named_parameters(&join(prefix, "proj")));
        params
    }

    fn named_parameters_mut(&mut self, prefix: &str) -> Vec<(String, &mut Tensor)> {
        let mut params = self.qkv.named_parameters_mut(&join(prefix, "qkv"));
        params.extend(self.proj.named_parameters_mut(&join(prefix, "proj")));
        params
    }
}
