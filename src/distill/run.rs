//! End-to-end distillation and evaluation runs

use super::checkpoint::{load_weight_with_cache, LoadReport};
use super::loss::CosineSimilarityLoss;
use super::replace::replace_blocks;
use super::trainable::set_trainable;
use super::truncate::truncate;
use crate::autograd::GradScaler;
use crate::config::{validate_spec, DistillSpec};
use crate::data::{build_dataset, DataLoader, ImageDataset};
use crate::io::default_cache_dir;
use crate::optim::{create_optimizer, create_scheduler, DecayMask};
use crate::train::{evaluate_accuracy, train_model, AccuracyStats, TrainResult, TrainSettings};
use crate::transformer::{create_model, ModelOptions, VisionTransformer};
use crate::{Error, Result};
use std::path::PathBuf;

/// Timestamp format of the per-run output directory
const RUN_DIR_FORMAT: &str = "%Y-%m-%d-%H-%M";

/// What a run does
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunMode {
    Train,
    Eval,
}

impl RunMode {
    /// Exactly one of `train` and `eval` must be set
    pub fn from_flags(train: bool, eval: bool) -> Result<Self> {
        match (train, eval) {
            (true, false) => Ok(Self::Train),
            (false, true) => Ok(Self::Eval),
            _ => Err(Error::ConfigError(
                "Please specify running mode (eval/train).".to_string(),
            )),
        }
    }
}

/// Result of [`run`]
#[derive(Debug, Clone)]
pub enum RunOutcome {
    Trained(TrainResult),
    Evaluated(AccuracyStats),
}

/// Execute the run described by `spec`
///
/// The mode and the spec are checked before any dataset, model or
/// directory is touched.
pub fn run(spec: &DistillSpec) -> Result<RunOutcome> {
    let mode = RunMode::from_flags(spec.train, spec.eval)?;
    validate_spec(spec).map_err(|e| Error::ConfigError(format!("Invalid config: {e}")))?;
    tracing::info!(?mode, model = %spec.d_model, replace = ?spec.replace, seed = spec.seed, "starting run");

    let data = spec.data_settings();
    let (dataset_train, nb_classes) = build_dataset(true, &data)?;
    let (dataset_val, _) = build_dataset(false, &data)?;
    if nb_classes != spec.nb_classes {
        tracing::info!(configured = spec.nb_classes, found = nb_classes, "using dataset class count");
    }

    let mut val_loader = DataLoader::new(dataset_val.as_ref(), spec.val_batch_size(), spec.seed);

    tracing::info!(model = %spec.d_model, "creating model");
    let options = ModelOptions {
        num_classes: nb_classes,
        img_size: Some(spec.input_size),
        drop_rate: spec.drop,
        drop_path_rate: spec.drop_path,
        seed: spec.seed,
    };
    let mut student = create_model(&spec.d_model, &options)?;
    replace_blocks(&mut student, &spec.replace, &spec.arch_table(), &spec.d_model)?;

    match mode {
        RunMode::Eval => {
            let stats = run_eval(spec, &mut student, &mut val_loader)?;
            Ok(RunOutcome::Evaluated(stats))
        }
        RunMode::Train => {
            let teacher = create_model(&spec.d_model, &options)?;
            let result = run_train(spec, student, teacher, dataset_train.as_ref(), &mut val_loader)?;
            Ok(RunOutcome::Trained(result))
        }
    }
}

fn cache_dir(spec: &DistillSpec) -> PathBuf {
    spec.cache_dir.clone().unwrap_or_else(default_cache_dir)
}

fn load_pretrained(model: &mut VisionTransformer, spec: &DistillSpec, source: &str) -> Result<LoadReport> {
    let report = load_weight_with_cache(model, source, &cache_dir(spec))?;
    tracing::info!(
        source,
        loaded = report.loaded,
        missing = report.missing.len(),
        unexpected = report.unexpected.len(),
        mismatched = report.mismatched.len(),
        "applied checkpoint"
    );
    Ok(report)
}

fn run_eval(
    spec: &DistillSpec,
    model: &mut VisionTransformer,
    val_loader: &mut DataLoader<'_>,
) -> Result<AccuracyStats> {
    if !spec.d_weight.is_empty() {
        load_pretrained(model, spec, &spec.d_weight)?;
    }
    tracing::info!(eval_model = %spec.eval_model, "evaluating");
    load_pretrained(model, spec, &spec.eval_model)?;
    model.set_training(false);

    let stats = evaluate_accuracy(model, val_loader)?;
    tracing::info!(
        "Accuracy of the network on the {} test images: {:.1}%",
        stats.samples,
        stats.acc1
    );
    Ok(stats)
}

fn run_train(
    spec: &DistillSpec,
    mut student: VisionTransformer,
    mut teacher: VisionTransformer,
    dataset_train: &dyn ImageDataset,
    val_loader: &mut DataLoader<'_>,
) -> Result<TrainResult> {
    tracing::info!(model = %spec.d_model, targets = ?spec.replace, "training");
    if spec.d_weight.is_empty() {
        tracing::warn!("no pretrained weights given, teacher and student start from random init");
    } else {
        load_pretrained(&mut student, spec, &spec.d_weight)?;
        load_pretrained(&mut teacher, spec, &spec.d_weight)?;
    }

    let max_index = spec
        .replace
        .iter()
        .copied()
        .max()
        .ok_or_else(|| Error::ConfigError("no blocks to replace".to_string()))?;
    truncate(&mut student, max_index)?;
    truncate(&mut teacher, max_index)?;

    let n_parameters = set_trainable(&mut student, &spec.replace, true);
    set_trainable(&mut teacher, &[], true);
    teacher.set_training(false);
    tracing::info!(n_parameters, "number of trainable params");

    let lr = spec.effective_lr();
    let named = student.named_parameters();
    let mask = DecayMask::from_named(
        named
            .iter()
            .filter(|(_, t)| t.requires_grad())
            .map(|(name, t)| (name.as_str(), t.shape())),
    );
    let optimizer = create_optimizer(&spec.optimizer_settings(lr), mask)?;
    let scheduler = create_scheduler(spec.sched, lr, spec.min_lr, spec.epochs, spec.warmup());
    let scaler = if spec.amp {
        GradScaler::default()
    } else {
        GradScaler::disabled()
    };

    let mut train_loader = DataLoader::new(dataset_train, spec.batch_size, spec.seed)
        .shuffled()
        .drop_last();
    if train_loader.is_empty() {
        return Err(Error::Data(format!(
            "{} training samples cannot fill one batch of {}",
            train_loader.dataset_len(),
            spec.batch_size
        )));
    }

    let output_dir = spec
        .output_dir
        .join(chrono::Local::now().format(RUN_DIR_FORMAT).to_string());
    std::fs::create_dir_all(&output_dir)?;

    let settings = TrainSettings {
        epochs: spec.epochs,
        start_epoch: spec.start_epoch,
        clip_grad: spec.clip_grad,
        log_every: spec.log_every,
        output_dir,
        model_name: spec.d_model.clone(),
        replace: spec.replace.clone(),
        n_parameters,
    };
    train_model(
        &mut student,
        &teacher,
        CosineSimilarityLoss::default(),
        optimizer,
        scaler,
        scheduler,
        &mut train_loader,
        val_loader,
        settings,
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mode_flags() {
        assert_eq!(RunMode::from_flags(true, false).unwrap(), RunMode::Train);
        assert_eq!(RunMode::from_flags(false, true).unwrap(), RunMode::Eval);
        assert!(matches!(RunMode::from_flags(true, true), Err(Error::ConfigError(_))));
        assert!(matches!(RunMode::from_flags(false, false), Err(Error::ConfigError(_))));
    }

    #[test]
    fn test_no_mode_fails_before_side_effects() {
        let dir = tempfile::tempdir().unwrap();
        let spec = DistillSpec {
            output_dir: dir.path().join("out"),
            data_path: dir.path().join("missing"),
            ..Default::default()
        };
        let err = run(&spec).unwrap_err();
        assert!(matches!(err, Error::ConfigError(_)));
        assert!(!dir.path().join("out").exists());
    }

    #[test]
    fn test_invalid_spec_is_config_error() {
        let spec = DistillSpec {
            train: true,
            replace: vec![],
            ..Default::default()
        };
        assert!(matches!(run(&spec), Err(Error::ConfigError(_))));
    }
}
