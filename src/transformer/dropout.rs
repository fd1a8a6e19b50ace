//! Training-time regularizers: element dropout and stochastic depth

use crate::autograd::mul_mask;
use crate::Tensor;
use ndarray::Array1;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::cell::RefCell;

/// Inverted dropout, active only in training mode
pub struct Dropout {
    p: f32,
    rng: RefCell<StdRng>,
}

impl Dropout {
    /// Create with drop probability `p`
    pub fn new(p: f32, seed: u64) -> Self {
        Self {
            p,
            rng: RefCell::new(StdRng::seed_from_u64(seed)),
        }
    }

    /// Drop probability
    pub fn p(&self) -> f32 {
        self.p
    }

    /// Zero each element with probability `p` and rescale the rest
    pub fn forward(&self, x: &Tensor, training: bool) -> Tensor {
        if !training || self.p <= 0.0 {
            return x.clone();
        }
        let keep = 1.0 - self.p;
        let mut rng = self.rng.borrow_mut();
        let mask: Array1<f32> = (0..x.len())
            .map(|_| if rng.gen::<f32>() < keep { 1.0 / keep } else { 0.0 })
            .collect();
        mul_mask(x, &mask)
    }
}

/// Stochastic depth on a residual branch
///
/// In training mode each sample's branch output is dropped with
/// probability `p` and the kept ones are scaled by `1 / (1 - p)`. Outside
/// training it is the identity.
pub struct DropPath {
    p: f32,
    rng: RefCell<StdRng>,
}

impl DropPath {
    /// Create with drop probability `p`
    pub fn new(p: f32, seed: u64) -> Self {
        Self {
            p,
            rng: RefCell::new(StdRng::seed_from_u64(seed)),
        }
    }

    /// Never drops anything
    pub fn disabled() -> Self {
        Self::new(0.0, 0)
    }

    /// Drop probability
    pub fn p(&self) -> f32 {
        self.p
    }

    /// `x`: `(batch, ...)`; one keep/drop draw per sample
    pub fn forward(&self, x: &Tensor, training: bool) -> Tensor {
        if !training || self.p <= 0.0 {
            return x.clone();
        }
        let batch = x.shape().first().copied().unwrap_or(1).max(1);
        let per_sample = x.len() / batch;
        let keep = 1.0 - self.p;
        let mut rng = self.rng.borrow_mut();
        let mut mask = Vec::with_capacity(x.len());
        for _ in 0..batch {
            let scale = if rng.gen::<f32>() < keep { 1.0 / keep } else { 0.0 };
            mask.extend(std::iter::repeat(scale).take(per_sample));
        }
        mul_mask(x, &Array1::from(mask))
    }
}

/// Per-block drop-path rates rising linearly from 0 to `max_rate`
pub fn drop_path_rates(max_rate: f32, depth: usize) -> Vec<f32> {
    match depth {
        0 => Vec::new(),
        1 => vec![0.0],
        _ => (0..depth)
            .map(|i| max_rate * i as f32 / (depth - 1) as f32)
            .collect(),
    }
}
