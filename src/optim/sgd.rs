//! Stochastic Gradient Descent optimizer

use super::optimizer::{ensure_slots, DecayMask, Optimizer};
use crate::Tensor;
use ndarray::Array1;

/// SGD with momentum and L2 weight decay
///
/// `buf = μ·buf + g; θ -= lr·buf`, with `g += λ·θ` first for decayed
/// parameters. The first step initializes `buf = g`.
pub struct SGD {
    lr: f32,
    momentum: f32,
    weight_decay: f32,
    decay_mask: DecayMask,
    velocities: Vec<Option<Array1<f32>>>,
}

impl SGD {
    /// Create a new SGD optimizer
    pub fn new(lr: f32, momentum: f32) -> Self {
        Self {
            lr,
            momentum,
            weight_decay: 0.0,
            decay_mask: DecayMask::default(),
            velocities: Vec::new(),
        }
    }

    /// Set the L2 penalty and which parameters it applies to
    pub fn with_weight_decay(mut self, weight_decay: f32, mask: DecayMask) -> Self {
        self.weight_decay = weight_decay;
        self.decay_mask = mask;
        self
    }
}

impl Optimizer for SGD {
    fn step(&mut self, params: &mut [&mut Tensor]) {
        ensure_slots(&mut self.velocities, params.len());

        for (i, param) in params.iter_mut().enumerate() {
            let Some(mut grad) = param.grad() else {
                continue;
            };
            if self.weight_decay > 0.0 && self.decay_mask.decays(i) {
                grad.scaled_add(self.weight_decay, param.data());
            }
            let update = if self.momentum > 0.0 {
                let buf = match self.velocities[i].take() {
                    Some(mut v) => {
                        v *= self.momentum;
                        v += &grad;
                        v
                    }
                    None => grad,
                };
                let update = buf.clone();
                self.velocities[i] = Some(buf);
                update
            } else {
                grad
            };
            param.data_mut().scaled_add(-self.lr, &update);
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
    use ndarray::arr1;

    #[test]
    fn test_plain_step() {
        let mut opt = SGD::new(0.1, 0.0);
        let mut p = Tensor::from_vec(vec![1.0, 2.0], true);
        p.set_grad(arr1(&[0.5, 1.0]));
        opt.step(&mut [&mut p]);
        approx::assert_abs_diff_eq!(p.data()[0], 0.95, epsilon = 1e-6);
        approx::assert_abs_diff_eq!(p.data()[1], 1.9, epsilon = 1e-6);
    }

    #[test]
    fn test_momentum_accumulates() {
        let mut opt = SGD::new(0.1, 0.9);
        let mut p = Tensor::from_vec(vec![0.0], true);
        p.set_grad(arr1(&[1.0]));
        opt.step(&mut [&mut p]);
        p.set_grad(arr1(&[1.0]));
        opt.step(&mut [&mut p]);
        // -0.1 * 1 then -0.1 * (0.9 + 1)
        approx::assert_abs_diff_eq!(p.data()[0], -0.29, epsilon = 1e-6);
    }

    #[test]
    fn test_converges_quadratic() {
        assert!(descend_quadratic(SGD::new(0.1, 0.0), 100) < 1e-3);
        assert!(descend_quadratic(SGD::new(0.05, 0.9), 200) < 1e-2);
        assert!(loss_never_increases(SGD::new(0.1, 0.0), 30));
    }
}
