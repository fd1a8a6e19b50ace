//! Loss scaling for reduced-precision gradients
//!
//! Checkpoints may arrive as fp16/bf16, and `--amp` scales the loss before
//! backward so small gradients survive. The scaler backs off when an unscaled
//! gradient is not finite and grows again after a run of clean steps.

use crate::autograd::Tensor;

/// Default number of successful steps before the loss scale is increased
const DEFAULT_SCALE_GROWTH_INTERVAL: usize = 2000;

/// Gradient scaler for mixed-precision training
#[derive(Debug)]
pub struct GradScaler {
    scale: f32,
    growth_factor: f32,
    backoff_factor: f32,
    growth_interval: usize,
    steps_since_growth: usize,
    /// Disabled scalers keep a scale of 1 and never skip a step
    enabled: bool,
    overflow_count: usize,
}

impl GradScaler {
    /// Create a new gradient scaler
    pub fn new(initial_scale: f32) -> Self {
        Self {
            scale: initial_scale,
            growth_factor: 2.0,
            backoff_factor: 0.5,
            growth_interval: DEFAULT_SCALE_GROWTH_INTERVAL,
            steps_since_growth: 0,
            enabled: true,
            overflow_count: 0,
        }
    }

    /// Scaler that leaves gradients untouched
    pub fn disabled() -> Self {
        Self {
            enabled: false,
            ..Self::new(1.0)
        }
    }

    /// Override the growth interval
    pub fn with_growth_interval(mut self, interval: usize) -> Self {
        self.growth_interval = interval.max(1);
        self
    }

    /// Get current scale
    pub fn scale(&self) -> f32 {
        if self.enabled {
            self.scale
        } else {
            1.0
        }
    }

    /// Whether loss scaling is active
    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Divide every gradient by the current scale.
    ///
    /// Returns false if any unscaled gradient is NaN or infinite.
    pub fn unscale_and_check(&self, params: &[&mut Tensor]) -> bool {
        let inv_scale = 1.0 / self.scale();
        let mut valid = true;

        for param in params {
            if let Some(mut grad) = param.grad() {
                if self.enabled {
                    grad.mapv_inplace(|g| g * inv_scale);
                }
                if grad.iter().any(|g| !g.is_finite()) {
                    valid = false;
                }
                param.set_grad(grad);
            }
        }

        valid
    }

    /// Update the scale after a step. Pass `true` if gradients were valid.
    pub fn update(&mut self, grads_valid: bool) {
        if !self.enabled {
            return;
        }

        if grads_valid {
            self.steps_since_growth += 1;
            if self.steps_since_growth >= self.growth_interval {
                self.scale *= self.growth_factor;
                self.steps_since_growth = 0;
            }
        } else {
            self.overflow_count += 1;
            self.scale = (self.scale * self.backoff_factor).max(1.0);
            self.steps_since_growth = 0;
        }
    }

    /// Number of skipped steps
    pub fn overflow_count(&self) -> usize {
        self.overflow_count
    }
}

impl Default for GradScaler {
    fn default() -> Self {
        Self::new(65536.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    #[test]
    fn test_backoff_on_overflow() {
        let mut scaler = GradScaler::new(1024.0);
        scaler.update(false);
        assert_abs_diff_eq!(scaler.scale(), 512.0);
        assert_eq!(scaler.overflow_count(), 1);
    }

    #[test]
    fn test_growth_after_interval() {
        let mut scaler = GradScaler::new(8.0).with_growth_interval(2);
        scaler.update(true);
        assert_abs_diff_eq!(scaler.scale(), 8.0);
        scaler.update(true);
        assert_abs_diff_eq!(scaler.scale(), 16.0);
    }

    #[test]
    fn test_unscale_divides_and_detects_nan() {
        let scaler = GradScaler::new(4.0);
        let mut a = Tensor::from_vec(vec![0.0, 0.0], true);
        a.set_grad(ndarray::arr1(&[8.0, 4.0]));
        assert!(scaler.unscale_and_check(&[&mut a]));
        assert_eq!(a.grad().unwrap().to_vec(), vec![2.0, 1.0]);

        let mut b = Tensor::from_vec(vec![0.0], true);
        b.set_grad(ndarray::arr1(&[f32::NAN]));
        assert!(!scaler.unscale_and_check(&[&mut b]));
    }

    #[test]
    fn test_disabled_scaler_is_identity() {
        let mut scaler = GradScaler::disabled();
        scaler.update(false);
        assert_abs_diff_eq!(scaler.scale(), 1.0);
        assert_eq!(scaler.overflow_count(), 0);
    }
}
