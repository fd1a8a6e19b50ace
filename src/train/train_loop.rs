//! Multi-epoch distillation loop

use super::distiller::Distiller;
use super::result::{EpochLog, EpochStats, TrainResult};
use crate::autograd::GradScaler;
use crate::data::DataLoader;
use crate::distill::{save_student_checkpoint, CosineSimilarityLoss, StudentCheckpointMeta};
use crate::optim::{LRScheduler, Optimizer};
use crate::transformer::VisionTransformer;
use crate::Result;
use std::path::PathBuf;
use std::time::Instant;

/// Latest student weights, rewritten every epoch
pub const CHECKPOINT_FILE: &str = "checkpoint.safetensors";
/// Student weights at the lowest validation loss
pub const BEST_FILE: &str = "best.safetensors";
/// JSON-lines epoch log
pub const LOG_FILE: &str = "log.txt";

/// Loop-level settings for a distillation run
#[derive(Debug, Clone, PartialEq)]
pub struct TrainSettings {
    /// Epoch count; training runs `start_epoch..epochs`
    pub epochs: usize,
    pub start_epoch: usize,
    /// Global gradient-norm ceiling
    pub clip_grad: Option<f32>,
    /// Log every this many steps
    pub log_every: usize,
    pub output_dir: PathBuf,
    /// Registered model name, stored in checkpoint metadata
    pub model_name: String,
    /// Replaced block indices, stored in checkpoint metadata
    pub replace: Vec<usize>,
    /// Trainable scalar count, echoed in every log line
    pub n_parameters: usize,
}

impl Distiller<'_> {
    /// Train `start_epoch..epochs`, validating and checkpointing each epoch
    pub fn train(
        &mut self,
        train_loader: &mut DataLoader<'_>,
        val_loader: &mut DataLoader<'_>,
    ) -> Result<TrainResult> {
        let output_dir = self.settings.output_dir.clone();
        std::fs::create_dir_all(&output_dir)?;
        let log = EpochLog::new(output_dir.join(LOG_FILE));
        let start = Instant::now();

        tracing::info!(
            epochs = self.settings.epochs,
            start_epoch = self.settings.start_epoch,
            output_dir = %output_dir.display(),
            "start training"
        );

        let mut history = Vec::new();
        let mut best_val_loss = f32::INFINITY;
        let mut final_loss = 0.0;

        for epoch in self.settings.start_epoch..self.settings.epochs {
            let lr = self.scheduler.lr_at(epoch);
            self.optimizer.set_lr(lr);

            let train_loss = self.train_epoch(epoch, train_loader)?;
            let val = self.validate(val_loader)?;
            final_loss = train_loss;

            let mut meta = StudentCheckpointMeta {
                model: self.settings.model_name.clone(),
                replace: self.settings.replace.clone(),
                epoch,
                val_loss: Some(val.loss),
            };
            save_student_checkpoint(&*self.student, &meta, &output_dir, CHECKPOINT_FILE)?;
            if val.loss < best_val_loss {
                best_val_loss = val.loss;
                meta.val_loss = Some(best_val_loss);
                save_student_checkpoint(&*self.student, &meta, &output_dir, BEST_FILE)?;
            }

            let stats = EpochStats {
                epoch,
                train_loss,
                val_loss: val.loss,
                val_cosine: val.cosine,
                lr,
                n_parameters: self.settings.n_parameters,
            };
            log.append(&stats)?;
            tracing::info!(
                epoch,
                train_loss,
                val_loss = val.loss,
                val_cosine = val.cosine,
                best_val_loss,
                "epoch finished"
            );
            history.push(stats);
        }

        let elapsed_secs = start.elapsed().as_secs_f64();
        tracing::info!(elapsed_secs, "training time");
        Ok(TrainResult {
            final_epoch: history.last().map_or(self.settings.start_epoch, |s| s.epoch),
            final_loss,
            best_val_loss,
            history,
            elapsed_secs,
            output_dir,
        })
    }
}

/// Distill `student` towards `teacher` with the given machinery
#[allow(clippy::too_many_arguments)]
pub fn train_model(
    student: &mut VisionTransformer,
    teacher: &VisionTransformer,
    criterion: CosineSimilarityLoss,
    optimizer: Box<dyn Optimizer>,
    scaler: GradScaler,
    scheduler: Box<dyn LRScheduler>,
    train_loader: &mut DataLoader<'_>,
    val_loader: &mut DataLoader<'_>,
    settings: TrainSettings,
) -> Result<TrainResult> {
    Distiller::new(student, teacher, criterion, optimizer, scaler, scheduler, settings)
        .train(train_loader, val_loader)
}
