//! AdamW optimizer (Adam with decoupled weight decay)

use super::adam::Moments;
use super::optimizer::{DecayMask, Optimizer};
use crate::Tensor;

/// AdamW optimizer
///
/// Standard Adam with L2: θ_t = θ_{t-1} - lr * (m_t / (√v_t + ε) + λ * θ_{t-1})
/// AdamW: θ_t = (1 - lr * λ) * θ_{t-1} - lr * m_t / (√v_t + ε)
pub struct AdamW {
    lr: f32,
    beta1: f32,
    beta2: f32,
    epsilon: f32,
    weight_decay: f32,
    decay_mask: DecayMask,
    moments: Moments,
}

impl AdamW {
    /// Create a new AdamW optimizer
    pub fn new(lr: f32, beta1: f32, beta2: f32, epsilon: f32, weight_decay: f32) -> Self {
        Self {
            lr,
            beta1,
            beta2,
            epsilon,
            weight_decay,
            decay_mask: DecayMask::default(),
            moments: Moments::default(),
        }
    }

    /// Create AdamW with default parameters (weight_decay = 0.01)
    pub fn default_params(lr: f32) -> Self {
        Self::new(lr, 0.9, 0.999, 1e-8, 0.01)
    }

    /// Restrict weight decay to the parameters flagged in `mask`
    pub fn with_decay_mask(mut self, mask: DecayMask) -> Self {
        self.decay_mask = mask;
        self
    }

    /// Get weight decay hyperparameter.
    #[must_use]
    pub fn weight_decay(&self) -> f32 {
        self.weight_decay
    }

    /// Number of steps taken
    pub fn step_count(&self) -> u64 {
        self.moments.t
    }
}

impl Optimizer for AdamW {
    fn step(&mut self, params: &mut [&mut Tensor]) {
        self.moments.begin_step(params.len());
        let lr_t = self.moments.corrected_lr(self.lr, self.beta1, self.beta2);

        for (i, param) in params.iter_mut().enumerate() {
            let Some(grad) = param.grad() else {
                continue;
            };
            let dir = self
                .moments
                .direction(i, &grad, self.beta1, self.beta2, self.epsilon);
            let data = param.data_mut();
            if self.decay_mask.decays(i) {
                *data *= 1.0 - self.lr * self.weight_decay;
            }
            data.scaled_add(-lr_t, &dir);
        }
    }

    fn lr(&self) -> f32 {
        self.lr
    }

    fn set_lr(&mut self, lr: f32) {
        self.lr = lr;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::optim::testing::{descend_quadratic, loss_never_increases};
    use crate::optim::Adam;
    use proptest::prelude::*;

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(16))]

        #[test]
        fn prop_adamw_converges_quadratic(lr in 0.05f32..0.5) {
            prop_assert!(descend_quadratic(AdamW::default_params(lr), 150) < 1.5);
        }

        #[test]
        fn prop_adamw_loss_decreases(lr in 0.01f32..0.2) {
            prop_assert!(loss_never_increases(AdamW::default_params(lr), 30));
        }
    }

    #[test]
    fn test_adamw_weight_decay_effect() {
        // Zero gradients leave only the decoupled shrink (1 - lr * wd) per step
        let mut wp = Tensor::from_vec(vec![2.0, -2.0], true);
        let mut ap = Tensor::from_vec(vec![2.0, -2.0], true);
        let mut adamw = AdamW::new(0.1, 0.9, 0.999, 1e-8, 0.1);
        let mut adam = Adam::new(0.1, 0.9, 0.999, 1e-8);

        for _ in 0..50 {
            wp.set_grad(ndarray::arr1(&[0.0, 0.0]));
            ap.set_grad(ndarray::arr1(&[0.0, 0.0]));
            adamw.step(&mut [&mut wp]);
            adam.step(&mut [&mut ap]);
        }
        let shrink = 0.99f32.powi(50);
        approx::assert_abs_diff_eq!(wp.data()[0], 2.0 * shrink, epsilon = 1e-4);
        approx::assert_abs_diff_eq!(wp.data()[1], -2.0 * shrink, epsilon = 1e-4);
        assert_eq!(ap.data().to_vec(), vec![2.0, -2.0]);
    }

    #[test]
    fn test_adamw_decay_pulls_toward_zero_under_constant_gradient() {
        let mut wp = Tensor::from_vec(vec![2.0], true);
        let mut ap = Tensor::from_vec(vec![2.0], true);
        let mut adamw = AdamW::new(0.1, 0.9, 0.999, 1e-8, 0.1);
        let mut adam = Adam::new(0.1, 0.9, 0.999, 1e-8);

        for _ in 0..50 {
            wp.set_grad(ndarray::arr1(&[0.1]));
            ap.set_grad(ndarray::arr1(&[0.1]));
            adamw.step(&mut [&mut wp]);
            adam.step(&mut [&mut ap]);
        }
        assert!(wp.data()[0].abs() < ap.data()[0].abs());
    }

    #[test]
    fn test_masked_param_skips_decay() {
        let mut decayed = Tensor::from_vec(vec![1.0], true);
        let mut exempt = Tensor::from_vec(vec![1.0], true);
        let mut opt = AdamW::new(0.1, 0.9, 0.999, 1e-8, 0.5)
            .with_decay_mask(DecayMask::new(vec![true, false]));

        decayed.set_grad(ndarray::arr1(&[0.0]));
        exempt.set_grad(ndarray::arr1(&[0.0]));
        opt.step(&mut [&mut decayed, &mut exempt]);

        approx::assert_abs_diff_eq!(decayed.data()[0], 0.95, epsilon = 1e-6);
        approx::assert_abs_diff_eq!(exempt.data()[0], 1.0, epsilon = 1e-6);
    }
}
