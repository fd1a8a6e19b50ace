//! Per-epoch learning rate schedulers
//!
//! - `CosineLR`: linear warmup, then cosine decay to `lr_min`
//! - `ConstantLR`: linear warmup, then a flat rate

use serde::{Deserialize, Serialize};
use std::f32::consts::PI;

/// Learning rate scheduler trait
pub trait LRScheduler {
    /// Learning rate for `epoch` (0-based)
    fn lr_at(&self, epoch: usize) -> f32;
}

/// Linear ramp from `warmup_lr` to the base rate over `warmup_epochs`
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Warmup {
    pub warmup_lr: f32,
    pub warmup_epochs: usize,
}

impl Warmup {
    fn lr_at(&self, epoch: usize, base: f32) -> Option<f32> {
        (epoch < self.warmup_epochs).then(|| {
            self.warmup_lr + (base - self.warmup_lr) * epoch as f32 / self.warmup_epochs as f32
        })
    }
}

/// Cosine Annealing with warmup
///
/// After warmup: lr_t = lr_min + 0.5 * (lr_max - lr_min) * (1 + cos(π * t / T))
/// where T is the total epoch count. Epochs at or past T return `lr_min`.
#[derive(Debug, Clone)]
pub struct CosineLR {
    lr_max: f32,
    lr_min: f32,
    t_max: usize,
    warmup: Warmup,
}

impl CosineLR {
    /// Create a new cosine scheduler spanning `t_max` epochs
    pub fn new(lr_max: f32, lr_min: f32, t_max: usize, warmup: Warmup) -> Self {
        Self {
            lr_max,
            lr_min,
            t_max,
            warmup,
        }
    }
}

impl LRScheduler for CosineLR {
    fn lr_at(&self, epoch: usize) -> f32 {
        if let Some(lr) = self.warmup.lr_at(epoch, self.lr_max) {
            return lr;
        }
        if epoch >= self.t_max {
            return self.lr_min;
        }
        let progress = epoch as f32 / self.t_max as f32;
        let cosine_decay = 0.5 * (1.0 + (PI * progress).cos());
        self.lr_min + (self.lr_max - self.lr_min) * cosine_decay
    }
}

/// Flat learning rate after warmup
#[derive(Debug, Clone)]
pub struct ConstantLR {
    lr: f32,
    warmup: Warmup,
}

impl ConstantLR {
    pub fn new(lr: f32, warmup: Warmup) -> Self {
        Self { lr, warmup }
    }
}

impl LRScheduler for ConstantLR {
    fn lr_at(&self, epoch: usize) -> f32 {
        self.warmup.lr_at(epoch, self.lr).unwrap_or(self.lr)
    }
}

/// Scheduler selector
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum SchedulerKind {
    #[default]
    Cosine,
    Constant,
}
