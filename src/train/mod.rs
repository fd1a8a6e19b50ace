//! Distillation training loop
//!
//! A [`Distiller`] pairs a trainable student with a frozen teacher and
//! minimizes the cosine distance between their token features. Each epoch
//! validates on held-out data, rewrites `checkpoint.safetensors`, keeps
//! `best.safetensors` at the lowest validation loss and appends a line to
//! `log.txt`.

mod distiller;
mod epoch;
mod metrics;
mod result;
mod step;
mod train_loop;
#[cfg(test)]
pub(crate) mod testing;

pub use distiller::Distiller;
pub use epoch::{evaluate_accuracy, evaluate_similarity, AccuracyStats, SimilarityStats};
pub use metrics::{cross_entropy, in_top_k, AccuracyMeter};
pub use result::{EpochLog, EpochStats, TrainResult};
pub use train_loop::{train_model, TrainSettings, BEST_FILE, CHECKPOINT_FILE, LOG_FILE};
