//! Run specification for block distillation
//!
//! Every field has a default, so an empty YAML document is a valid (if
//! mode-less) spec. Field names match the long CLI flags with `_` for `-`.

use crate::data::{DataSetKind, DataSettings};
use crate::optim::{OptimizerKind, OptimizerSettings, SchedulerKind, Warmup};
use crate::transformer::ArchTable;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Complete distillation run specification
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct DistillSpec {
    // Model
    /// Registered model name
    pub d_model: String,
    /// Input image side length
    pub input_size: usize,
    /// Pretrained checkpoint (path or URL); empty means random init
    pub d_weight: String,
    /// Block indices to replace with Mixer blocks
    pub replace: Vec<usize>,
    /// Mixer hyperparameters added to (or overriding) the built-in table
    pub mixer_params: ArchTable,

    // Mode
    pub train: bool,
    pub eval: bool,
    /// Checkpoint evaluated in eval mode
    pub eval_model: String,

    // Data
    pub data_path: PathBuf,
    pub data_set: DataSetKind,
    pub nb_classes: usize,
    pub eval_crop_ratio: f32,

    // Optimizer
    pub opt: OptimizerKind,
    pub opt_eps: f32,
    pub opt_betas: Option<[f32; 2]>,
    pub clip_grad: Option<f32>,
    pub momentum: f32,
    pub weight_decay: f32,

    // Training
    /// Parent of the timestamped run directory
    pub output_dir: PathBuf,
    pub epochs: usize,
    pub start_epoch: usize,
    pub batch_size: usize,
    /// Head dropout rate
    pub drop: f32,
    /// Stochastic depth rate of the last attention block
    pub drop_path: f32,
    pub seed: u64,
    /// Scale loss before backward and skip steps with non-finite gradients
    pub amp: bool,
    pub log_every: usize,
    /// Download directory for remote checkpoints
    pub cache_dir: Option<PathBuf>,

    // Schedule
    /// Use `lr` as given instead of scaling by `batch_size / 512`
    pub unscale_lr: bool,
    pub lr: f32,
    pub sched: SchedulerKind,
    pub min_lr: f32,
    pub warmup_lr: f32,
    pub warmup_epochs: usize,
}

impl Default for DistillSpec {
    fn default() -> Self {
        Self {
            d_model: "deit_tiny_patch16_224".to_string(),
            input_size: 224,
            d_weight: String::new(),
            replace: Vec::new(),
            mixer_params: ArchTable::default(),
            train: false,
            eval: false,
            eval_model: String::new(),
            data_path: PathBuf::from("datasets"),
            data_set: DataSetKind::Cifar,
            nb_classes: 100,
            eval_crop_ratio: 0.875,
            opt: OptimizerKind::Adamw,
            opt_eps: 1e-8,
            opt_betas: None,
            clip_grad: None,
            momentum: 0.9,
            weight_decay: 0.05,
            output_dir: PathBuf::from("output"),
            epochs: 2,
            start_epoch: 0,
            batch_size: 256,
            drop: 0.0,
            drop_path: 0.1,
            seed: 42,
            amp: false,
            log_every: 10,
            cache_dir: None,
            unscale_lr: false,
            lr: 5e-4,
            sched: SchedulerKind::Cosine,
            min_lr: 0.0,
            warmup_lr: 1e-5,
            warmup_epochs: 0,
        }
    }
}

impl DistillSpec {
    /// Built-in Mixer table extended with `mixer_params`
    pub fn arch_table(&self) -> ArchTable {
        let mut table = ArchTable::builtin();
        table.extend(&self.mixer_params);
        table
    }

    pub fn data_settings(&self) -> DataSettings<'_> {
        DataSettings {
            kind: self.data_set,
            root: &self.data_path,
            input_size: self.input_size,
            eval_crop_ratio: self.eval_crop_ratio,
        }
    }

    /// Learning rate after linear batch-size scaling
    pub fn effective_lr(&self) -> f32 {
        if self.unscale_lr {
            self.lr
        } else {
            self.lr * self.batch_size as f32 / 512.0
        }
    }

    /// Validation batch size (1.5× the training batch)
    pub fn val_batch_size(&self) -> usize {
        (1.5 * self.batch_size as f32) as usize
    }

    pub fn optimizer_settings(&self, lr: f32) -> OptimizerSettings {
        OptimizerSettings {
            kind: self.opt,
            lr,
            eps: self.opt_eps,
            betas: self.opt_betas.map(|[b1, b2]| (b1, b2)),
            momentum: self.momentum,
            weight_decay: self.weight_decay,
        }
    }

    pub fn warmup(&self) -> Warmup {
        Warmup {
            warmup_lr: self.warmup_lr,
            warmup_epochs: self.warmup_epochs,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_yaml_gives_defaults() {
        let spec: DistillSpec = serde_yaml::from_str("{}").unwrap();
        assert_eq!(spec, DistillSpec::default());
    }

    #[test]
    fn test_partial_yaml() {
        let yaml = r"
d_model: deit_small_patch16_224
replace: [1, 3]
train: true
data_set: IMNET
opt: sgd
opt_betas: [0.8, 0.99]
mixer_params:
  custom_vit:
    num_patches: 4
    token_hid_dim: 8
    channels_dim: 8
    channels_hid_dim: 32
";
        let spec: DistillSpec = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(spec.replace, vec![1, 3]);
        assert_eq!(spec.data_set, DataSetKind::Imnet);
        assert_eq!(spec.opt, OptimizerKind::Sgd);
        assert_eq!(spec.optimizer_settings(0.1).betas, Some((0.8, 0.99)));
        assert_eq!(spec.arch_table().get("custom_vit").unwrap().channels_hid_dim, 32);
        assert!(spec.arch_table().get("deit_tiny_patch16_224").is_ok());
    }

    #[test]
    fn test_unknown_field_rejected() {
        assert!(serde_yaml::from_str::<DistillSpec>("batchsize: 3").is_err());
    }

    #[test]
    fn test_lr_scaling() {
        let spec = DistillSpec {
            batch_size: 128,
            lr: 4e-4,
            ..Default::default()
        };
        approx::assert_abs_diff_eq!(spec.effective_lr(), 1e-4);
        assert_eq!(spec.val_batch_size(), 192);
        let unscaled = DistillSpec {
            unscale_lr: true,
            ..spec
        };
        approx::assert_abs_diff_eq!(unscaled.effective_lr(), 4e-4);
    }
}
