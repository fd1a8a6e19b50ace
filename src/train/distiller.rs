//! Distillation trainer state

use super::TrainSettings;
use crate::autograd::GradScaler;
use crate::distill::CosineSimilarityLoss;
use crate::optim::{LRScheduler, Optimizer};
use crate::transformer::VisionTransformer;

/// Trains a student's unfrozen blocks to match a frozen teacher's features
///
/// Both models are expected to be truncated at the same depth so their
/// `forward_features` outputs line up token for token.
pub struct Distiller<'m> {
    pub(crate) student: &'m mut VisionTransformer,
    pub(crate) teacher: &'m VisionTransformer,
    pub(crate) criterion: CosineSimilarityLoss,
    pub(crate) optimizer: Box<dyn Optimizer>,
    pub(crate) scaler: GradScaler,
    pub(crate) scheduler: Box<dyn LRScheduler>,
    pub(crate) settings: TrainSettings,
    pub(crate) global_step: usize,
}

impl<'m> Distiller<'m> {
    pub fn new(
        student: &'m mut VisionTransformer,
        teacher: &'m VisionTransformer,
        criterion: CosineSimilarityLoss,
        optimizer: Box<dyn Optimizer>,
        scaler: GradScaler,
        scheduler: Box<dyn LRScheduler>,
        settings: TrainSettings,
    ) -> Self {
        Self {
            student,
            teacher,
            criterion,
            optimizer,
            scaler,
            scheduler,
            settings,
            global_step: 0,
        }
    }

    /// Current learning rate
    pub fn lr(&self) -> f32 {
        self.optimizer.lr()
    }

    /// Optimizer steps taken so far
    pub fn global_step(&self) -> usize {
        self.global_step
    }

    /// Steps skipped because of non-finite gradients
    pub fn skipped_steps(&self) -> usize {
        self.scaler.overflow_count()
    }

    pub fn settings(&self) -> &TrainSettings {
        &self.settings
    }
}
