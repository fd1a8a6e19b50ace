//! Seeded parameter initialization

use crate::Tensor;
use rand::rngs::StdRng;
use rand::SeedableRng;
use rand_distr::{Distribution, Normal};

/// Default standard deviation for ViT weights and embeddings
pub const INIT_STD: f32 = 0.02;

/// Deterministic source of initial parameter values
pub struct ParamInit {
    rng: StdRng,
}

impl ParamInit {
    /// Create from a seed
    pub fn new(seed: u64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
        }
    }

    /// Normal(0, std) truncated to ±2 std by resampling
    pub fn trunc_normal(&mut self, shape: &[usize], std: f32) -> Tensor {
        let n: usize = shape.iter().product();
        let data = match Normal::new(0.0f32, std) {
            Ok(dist) => (0..n)
                .map(|_| loop {
                    let v = dist.sample(&mut self.rng);
                    if v.abs() <= 2.0 * std {
                        break v;
                    }
                })
                .collect(),
            // Non-positive std: nothing to sample
            Err(_) => vec![0.0; n],
        };
        Tensor::from_shape_vec(shape, data, true)
    }

    /// Trainable zeros
    pub fn zeros(&mut self, shape: &[usize]) -> Tensor {
        Tensor::zeros(shape, true)
    }

    /// Trainable ones
    pub fn ones(&mut self, shape: &[usize]) -> Tensor {
        Tensor::ones(shape, true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_same_seed_same_values() {
        let a = ParamInit::new(7).trunc_normal(&[4, 4], INIT_STD);
        let b = ParamInit::new(7).trunc_normal(&[4, 4], INIT_STD);
        assert_eq!(a.data(), b.data());
    }

    #[test]
    fn test_values_are_truncated() {
        let t = ParamInit::new(0).trunc_normal(&[1000], 1.0);
        assert!(t.data().iter().all(|v| v.abs() <= 2.0));
        assert_eq!(t.shape(), &[1000]);
    }
}
