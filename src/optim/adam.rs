//! Adam optimizer (L2 penalty folded into the gradient)

use super::optimizer::{ensure_slots, DecayMask, Optimizer};
use crate::Tensor;
use ndarray::Array1;

/// First and second moment estimates shared by Adam and AdamW
#[derive(Debug, Default)]
pub(crate) struct Moments {
    pub(crate) t: u64,
    m: Vec<Option<Array1<f32>>>,
    v: Vec<Option<Array1<f32>>>,
}

impl Moments {
    /// Advance the step counter and size the buffers
    pub(crate) fn begin_step(&mut self, num_params: usize) {
        ensure_slots(&mut self.m, num_params);
        ensure_slots(&mut self.v, num_params);
        self.t += 1;
    }

    /// Bias-corrected step size for the current step
    pub(crate) fn corrected_lr(&self, lr: f32, beta1: f32, beta2: f32) -> f32 {
        let t = self.t as i32;
        lr * (1.0 - beta2.powi(t)).sqrt() / (1.0 - beta1.powi(t))
    }

    /// Update the moments of slot `i` with `grad` and return `m / (sqrt(v) + eps)`
    pub(crate) fn direction(
        &mut self,
        i: usize,
        grad: &Array1<f32>,
        beta1: f32,
        beta2: f32,
        eps: f32,
    ) -> Array1<f32> {
        let m = self.m[i].get_or_insert_with(|| Array1::zeros(grad.len()));
        let v = self.v[i].get_or_insert_with(|| Array1::zeros(grad.len()));
        m.zip_mut_with(grad, |m, &g| *m = beta1 * *m + (1.0 - beta1) * g);
        v.zip_mut_with(grad, |v, &g| *v = beta2 * *v + (1.0 - beta2) * g * g);
        let mut dir = m.clone();
        dir.zip_mut_with(v, |d, &v| *d /= v.sqrt() + eps);
        dir
    }
}

/// Adam optimizer
///
/// Weight decay is classic L2: `g += λ·θ` before the moment update.
pub struct Adam {
    lr: f32,
    beta1: f32,
    beta2: f32,
    epsilon: f32,
    weight_decay: f32,
    decay_mask: DecayMask,
    moments: Moments,
}

impl Adam {
    /// Create a new Adam optimizer
    pub fn new(lr: f32, beta1: f32, beta2: f32, epsilon: f32) -> Self {
        Self {
            lr,
            beta1,
            beta2,
            epsilon,
            weight_decay: 0.0,
            decay_mask: DecayMask::default(),
            moments: Moments::default(),
        }
    }

    /// Create Adam with default parameters
    pub fn default_params(lr: f32) -> Self {
        Self::new(lr, 0.9, 0.999, 1e-8)
    }

    /// Set the L2 penalty and which parameters it applies to
    pub fn with_weight_decay(mut self, weight_decay: f32, mask: DecayMask) -> Self {
        self.weight_decay = weight_decay;
        self.decay_mask = mask;
        self
    }

    /// Number of steps taken
    pub fn step_count(&self) -> u64 {
        self.moments.t
    }
}

impl Optimizer for Adam {
    fn step(&mut self, params: &mut [&mut Tensor]) {
        self.moments.begin_step(params.len());
        let lr_t = self.moments.corrected_lr(self.lr, self.beta1, self.beta2);

        for (i, param) in params.iter_mut().enumerate() {
            let Some(mut grad) = param.grad() else {
                continue;
            };
            if self.weight_decay > 0.0 && self.decay_mask.decays(i) {
                grad.scaled_add(self.weight_decay, param.data());
            }
            let dir = self
                .moments
                .direction(i, &grad, self.beta1, self.beta2, self.epsilon);
            param.data_mut().scaled_add(-lr_t, &dir);
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
    use proptest::prelude::*;

    #[test]
    fn test_first_step_moves_by_lr() {
        // Bias correction makes the first step exactly lr * sign(g)
        let mut opt = Adam::default_params(0.1);
        let mut p = Tensor::from_vec(vec![1.0, -1.0], true);
        p.set_grad(ndarray::arr1(&[0.5, -3.0]));
        opt.step(&mut [&mut p]);

        approx::assert_abs_diff_eq!(p.data()[0], 0.9, epsilon = 1e-5);
        approx::assert_abs_diff_eq!(p.data()[1], -0.9, epsilon = 1e-5);
        assert_eq!(opt.step_count(), 1);
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(16))]

        #[test]
        fn prop_adam_converges_quadratic(lr in 0.05f32..0.5) {
            prop_assert!(descend_quadratic(Adam::default_params(lr), 150) < 1.5);
        }

        #[test]
        fn prop_adam_loss_decreases(lr in 0.01f32..0.2) {
            prop_assert!(loss_never_increases(Adam::default_params(lr), 30));
        }
    }
}
