//! Per-epoch records and run results

use serde::{Deserialize, Serialize};
use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};

/// One line of `log.txt`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EpochStats {
    pub epoch: usize,
    pub train_loss: f32,
    pub val_loss: f32,
    pub val_cosine: f32,
    pub lr: f32,
    pub n_parameters: usize,
}

/// Result of a training run
#[derive(Debug, Clone)]
pub struct TrainResult {
    /// Last epoch trained
    pub final_epoch: usize,
    pub final_loss: f32,
    /// Lowest validation loss seen
    pub best_val_loss: f32,
    pub history: Vec<EpochStats>,
    pub elapsed_secs: f64,
    /// Directory holding checkpoints and the log
    pub output_dir: PathBuf,
}

/// Append-only JSON-lines epoch log
#[derive(Debug, Clone)]
pub struct EpochLog {
    path: PathBuf,
}

impl EpochLog {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append `stats` as a single JSON line
    pub fn append(&self, stats: &EpochStats) -> crate::Result<()> {
        let mut file = OpenOptions::new().create(true).append(true).open(&self.path)?;
        writeln!(file, "{}", serde_json::to_string(stats)?)?;
        Ok(())
    }

    /// Read every record back
    pub fn read(&self) -> crate::Result<Vec<EpochStats>> {
        std::fs::read_to_string(&self.path)?
            .lines()
            .filter(|l| !l.trim().is_empty())
            .map(|l| serde_json::from_str(l).map_err(Into::into))
            .collect()
    }
}
