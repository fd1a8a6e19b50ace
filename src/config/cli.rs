//! Command-line arguments
//!
//! Flat flags, one per spec field. Each value flag is optional and, when
//! given, overrides the YAML file (or the defaults without one).

use super::schema::DistillSpec;
use crate::data::DataSetKind;
use crate::optim::{OptimizerKind, SchedulerKind};
use clap::Parser;
use std::path::PathBuf;

/// Distill DeiT blocks into MLP-Mixer blocks
#[derive(Parser, Debug, Clone, PartialEq)]
#[command(name = "blockdistill")]
#[command(version)]
#[command(about = "Replace vision-transformer blocks with MLP-Mixer blocks and train them to match the original features")]
pub struct Cli {
    /// YAML file with a full or partial run specification
    #[arg(long, value_name = "YAML")]
    pub config: Option<PathBuf>,

    /// Model name (e.g. deit_tiny_patch16_224)
    #[arg(long, value_name = "MODEL")]
    pub d_model: Option<String>,

    /// Expected input image size
    #[arg(long)]
    pub input_size: Option<usize>,

    /// Pretrained checkpoint path or URL
    #[arg(long)]
    pub d_weight: Option<String>,

    /// Indices of blocks to replace
    #[arg(long, num_args = 1.., value_name = "INDEX")]
    pub replace: Option<Vec<usize>>,

    /// Train the replaced Mixer blocks
    #[arg(long)]
    pub train: bool,

    /// Evaluate a trained model
    #[arg(long)]
    pub eval: bool,

    /// Checkpoint to evaluate
    #[arg(long)]
    pub eval_model: Option<String>,

    /// Dataset root
    #[arg(long)]
    pub data_path: Option<PathBuf>,

    /// Dataset layout
    #[arg(long, value_enum)]
    pub data_set: Option<DataSetKind>,

    /// Number of classes
    #[arg(long)]
    pub nb_classes: Option<usize>,

    /// Crop ratio for evaluation
    #[arg(long)]
    pub eval_crop_ratio: Option<f32>,

    /// Optimizer
    #[arg(long, value_enum)]
    pub opt: Option<OptimizerKind>,

    /// Optimizer epsilon
    #[arg(long)]
    pub opt_eps: Option<f32>,

    /// Optimizer betas
    #[arg(long, num_args = 2, value_names = ["BETA1", "BETA2"])]
    pub opt_betas: Option<Vec<f32>>,

    /// Clip gradient norm
    #[arg(long, value_name = "NORM")]
    pub clip_grad: Option<f32>,

    /// SGD momentum
    #[arg(long)]
    pub momentum: Option<f32>,

    /// Weight decay
    #[arg(long)]
    pub weight_decay: Option<f32>,

    /// Parent directory for run outputs
    #[arg(long)]
    pub output_dir: Option<PathBuf>,

    #[arg(long)]
    pub epochs: Option<usize>,

    #[arg(long)]
    pub start_epoch: Option<usize>,

    #[arg(long)]
    pub batch_size: Option<usize>,

    /// Dropout rate
    #[arg(long, value_name = "PCT")]
    pub drop: Option<f32>,

    /// Stochastic depth rate
    #[arg(long, value_name = "PCT")]
    pub drop_path: Option<f32>,

    #[arg(long)]
    pub seed: Option<u64>,

    /// Do not scale the learning rate by batch_size / 512
    #[arg(long)]
    pub unscale_lr: bool,

    /// Learning rate
    #[arg(long)]
    pub lr: Option<f32>,

    /// LR scheduler
    #[arg(long, value_enum)]
    pub sched: Option<SchedulerKind>,

    /// Lower bound of the cosine schedule
    #[arg(long)]
    pub min_lr: Option<f32>,

    /// Epochs of linear warmup
    #[arg(long)]
    pub warmup_epochs: Option<usize>,

    /// Log every N training steps
    #[arg(long)]
    pub log_every: Option<usize>,

    /// Scale the loss and skip steps with non-finite gradients
    #[arg(long)]
    pub amp: bool,

    /// Download cache for remote checkpoints
    #[arg(long)]
    pub cache_dir: Option<PathBuf>,

    /// Enable verbose output
    #[arg(short, long)]
    pub verbose: bool,

    /// Suppress all output except errors
    #[arg(short, long, conflicts_with = "verbose")]
    pub quiet: bool,
}

/// Parse CLI arguments from a string slice (for testing)
pub fn parse_args<I, T>(args: I) -> Result<Cli, clap::Error>
where
    I: IntoIterator<Item = T>,
    T: Into<std::ffi::OsString> + Clone,
{
    Cli::try_parse_from(args)
}

macro_rules! override_fields {
    ($spec:ident, $cli:ident, $($field:ident),+ $(,)?) => {
        $(
            if let Some(value) = &$cli.$field {
                $spec.$field = value.clone();
            }
        )+
    };
}

/// Apply command-line overrides to a DistillSpec
///
/// Boolean switches only ever turn a setting on.
pub fn apply_overrides(spec: &mut DistillSpec, cli: &Cli) {
    override_fields!(
        spec,
        cli,
        d_model,
        input_size,
        d_weight,
        replace,
        eval_model,
        data_path,
        data_set,
        nb_classes,
        eval_crop_ratio,
        opt,
        opt_eps,
        momentum,
        weight_decay,
        output_dir,
        epochs,
        start_epoch,
        batch_size,
        drop,
        drop_path,
        seed,
        lr,
        sched,
        min_lr,
        warmup_epochs,
        log_every,
    );
    if let Some([b1, b2]) = cli.opt_betas.as_deref() {
        spec.opt_betas = Some([*b1, *b2]);
    }
    if cli.clip_grad.is_some() {
        spec.clip_grad = cli.clip_grad;
    }
    if cli.cache_dir.is_some() {
        spec.cache_dir = cli.cache_dir.clone();
    }
    spec.train |= cli.train;
    spec.eval |= cli.eval;
    spec.unscale_lr |= cli.unscale_lr;
    spec.amp |= cli.amp;
}
