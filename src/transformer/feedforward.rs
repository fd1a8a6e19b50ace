//! Two-layer MLP with GELU
//!
//! Serves as the ViT block MLP and as both mixing MLPs of a Mixer block.

use super::init::ParamInit;
use super::linear::Linear;
use super::{join, Parameterized};
use crate::autograd::gelu;
use crate::Tensor;

/// `fc2(gelu(fc1(x)))` over the last dimension
pub struct Mlp {
    /// Expansion layer
    pub fc1: Linear,
    /// Projection back to the input width
    pub fc2: Linear,
}

impl Mlp {
    /// Create an MLP `dim -> hidden -> dim`
    pub fn new(dim: usize, hidden: usize, init: &mut ParamInit) -> Self {
        Self {
            fc1: Linear::new(dim, hidden, init),
            fc2: Linear::new(hidden, dim, init),
        }
    }

    /// Hidden width
    pub fn hidden_dim(&self) -> usize {
        self.fc1.out_features()
    }

    /// Forward pass
    pub fn forward(&self, x: &Tensor) -> Tensor {
        self.fc2.forward(&gelu(&self.fc1.forward(x)))
    }
}

impl Parameterized for Mlp {
    fn named_parameters(&self, prefix: &str) -> Vec<(String, &Tensor)> {
        let mut params = self.fc1.named_parameters(&join(prefix, "fc1"));
        params.extend(self.fc2.named_parameters(&join(prefix, "fc2")));
        params
    }

    fn named_parameters_mut(&mut self, prefix: &str) -> Vec<(String, &mut Tensor)> {
        let mut params = self.fc1.named_parameters_mut(&join(prefix, "fc1"));
        params.extend(self.fc2.named_parameters_mut(&join(prefix, "fc2")));
        params
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mlp_preserves_shape() {
        let mut init = ParamInit::new(0);
        let mlp = Mlp::new(4, 16, &mut init);
        let x = Tensor::from_shape_vec(&[2, 3, 4], vec![0.1; 24], false);
        let y = mlp.forward(&x);
        assert_eq!(y.shape(), &[2, 3, 4]);
        assert_eq!(mlp.hidden_dim(), 16);
    }
}
