//! Epoch-level training and evaluation

use super::distiller::Distiller;
use super::metrics::AccuracyMeter;
use crate::data::DataLoader;
use crate::distill::CosineSimilarityLoss;
use crate::transformer::VisionTransformer;
use crate::Result;

/// Feature agreement between student and teacher over a dataset
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct SimilarityStats {
    /// Mean cosine-similarity loss per batch
    pub loss: f32,
    /// Mean cosine similarity per token
    pub cosine: f32,
    pub samples: usize,
}

/// Classification quality of a full model
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct AccuracyStats {
    pub acc1: f32,
    pub acc5: f32,
    pub loss: f32,
    pub samples: usize,
}

impl Distiller<'_> {
    /// Train for one epoch and return the mean batch loss
    pub fn train_epoch(&mut self, epoch: usize, loader: &mut DataLoader<'_>) -> Result<f32> {
        self.student.set_training(true);
        let log_every = self.settings.log_every.max(1);
        let num_batches = loader.len();
        let mut total_loss = 0.0;
        let mut seen = 0;

        for (i, batch) in loader.epoch().enumerate() {
            let loss = self.train_step(&batch?)?;
            total_loss += loss;
            seen += 1;

            if (i + 1) % log_every == 0 || i + 1 == num_batches {
                tracing::info!(
                    epoch,
                    step = i + 1,
                    of = num_batches,
                    loss = total_loss / seen as f32,
                    lr = self.lr(),
                    "train"
                );
            }
        }

        Ok(if seen > 0 { total_loss / seen as f32 } else { 0.0 })
    }

    /// Student/teacher agreement on `loader`
    pub fn validate(&mut self, loader: &mut DataLoader<'_>) -> Result<SimilarityStats> {
        self.student.set_training(false);
        evaluate_similarity(&*self.student, self.teacher, &self.criterion, loader)
    }
}

/// Mean cosine loss and similarity between two models' features
pub fn evaluate_similarity(
    student: &VisionTransformer,
    teacher: &VisionTransformer,
    criterion: &CosineSimilarityLoss,
    loader: &mut DataLoader<'_>,
) -> Result<SimilarityStats> {
    let mut loss_sum = 0.0;
    let mut cos_sum = 0.0f64;
    let mut tokens = 0usize;
    let mut batches = 0usize;
    let mut samples = 0usize;

    for batch in loader.epoch() {
        let batch = batch?;
        let s = student.forward_features(&batch.images).detach();
        let t = teacher.forward_features(&batch.images).detach();
        let sims = criterion.similarities(&s, &t);

        loss_sum += criterion.forward(&s, &t).data()[0];
        cos_sum += sims.iter().map(|&c| f64::from(c)).sum::<f64>();
        tokens += sims.len();
        batches += 1;
        samples += batch.size();
    }

    Ok(SimilarityStats {
        loss: if batches > 0 { loss_sum / batches as f32 } else { 0.0 },
        cosine: if tokens > 0 { (cos_sum / tokens as f64) as f32 } else { 0.0 },
        samples,
    })
}

/// Top-1/top-5 accuracy and cross-entropy of a model with its head attached
pub fn evaluate_accuracy(model: &VisionTransformer, loader: &mut DataLoader<'_>) -> Result<AccuracyStats> {
    let mut meter = AccuracyMeter::default();
    for batch in loader.epoch() {
        let batch = batch?;
        let logits = model.forward(&batch.images).detach();
        let num_classes = logits.shape().last().copied().unwrap_or(1);
        meter.update(logits.as_slice(), num_classes, &batch.labels);
    }
    tracing::info!(
        acc1 = meter.acc1(),
        acc5 = meter.acc5(),
        loss = meter.loss(),
        samples = meter.count(),
        "evaluation"
    );
    Ok(AccuracyStats {
        acc1: meter.acc1(),
        acc5: meter.acc5(),
        loss: meter.loss(),
        samples: meter.count(),
    })
}
