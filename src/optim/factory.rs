//! Build optimizers and schedulers from run settings

use super::{Adam, AdamW, ConstantLR, CosineLR, DecayMask, LRScheduler, Optimizer, SchedulerKind, Warmup, SGD};
use crate::{Error, Result};
use serde::{Deserialize, Serialize};

/// Optimizer selector
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum OptimizerKind {
    #[default]
    Adamw,
    Adam,
    Sgd,
}

/// Hyperparameters for [`create_optimizer`]
#[derive(Debug, Clone, PartialEq)]
pub struct OptimizerSettings {
    pub kind: OptimizerKind,
    pub lr: f32,
    pub eps: f32,
    /// `None` keeps the optimizer's own betas (0.9, 0.999)
    pub betas: Option<(f32, f32)>,
    pub momentum: f32,
    pub weight_decay: f32,
}

/// Construct the optimizer named by `settings`
///
/// `mask` marks which of the parameters later passed to `step` decay.
pub fn create_optimizer(settings: &OptimizerSettings, mask: DecayMask) -> Result<Box<dyn Optimizer>> {
    if !(settings.lr.is_finite() && settings.lr > 0.0) {
        return Err(Error::InvalidParameter(format!(
            "learning rate must be positive, got {}",
            settings.lr
        )));
    }
    let (beta1, beta2) = settings.betas.unwrap_or((0.9, 0.999));
    let optimizer: Box<dyn Optimizer> = match settings.kind {
        OptimizerKind::Adamw => Box::new(
            AdamW::new(settings.lr, beta1, beta2, settings.eps, settings.weight_decay)
                .with_decay_mask(mask),
        ),
        OptimizerKind::Adam => Box::new(
            Adam::new(settings.lr, beta1, beta2, settings.eps)
                .with_weight_decay(settings.weight_decay, mask),
        ),
        OptimizerKind::Sgd => Box::new(
            SGD::new(settings.lr, settings.momentum).with_weight_decay(settings.weight_decay, mask),
        ),
    };
    tracing::debug!(kind = ?settings.kind, lr = settings.lr, "created optimizer");
    Ok(optimizer)
}

/// Construct a per-epoch scheduler over `epochs` epochs
pub fn create_scheduler(
    kind: SchedulerKind,
    lr: f32,
    min_lr: f32,
    epochs: usize,
    warmup: Warmup,
) -> Box<dyn LRScheduler> {
    match kind {
        SchedulerKind::Cosine => Box::new(CosineLR::new(lr, min_lr, epochs, warmup)),
        SchedulerKind::Constant => Box::new(ConstantLR::new(lr, warmup)),
    }
}
