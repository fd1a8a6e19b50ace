//! Optimizers, gradient clipping and learning-rate schedules

mod adam;
mod adamw;
mod clip;
mod factory;
mod optimizer;
mod scheduler;
mod sgd;
#[cfg(test)]
mod testing;

pub use adam::Adam;
pub use adamw::AdamW;
pub use clip::clip_grad_norm;
pub use factory::{create_optimizer, create_scheduler, OptimizerKind, OptimizerSettings};
pub use optimizer::{DecayMask, Optimizer, NO_WEIGHT_DECAY};
pub use scheduler::{ConstantLR, CosineLR, LRScheduler, SchedulerKind, Warmup};
pub use sgd::SGD;
