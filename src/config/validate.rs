//! Configuration validation
//!
//! Checks value ranges and cross-field requirements. Filesystem and
//! network access are left to the stages that need them.

use super::schema::DistillSpec;
use crate::transformer::registered_models;

/// Validation error type
#[derive(Debug, thiserror::Error, PartialEq)]
pub enum ValidationError {
    #[error("Unknown model: {0} (registered: {1})")]
    UnknownModel(String, String),

    #[error("Invalid input size: {0} (must be > 0)")]
    InvalidInputSize(usize),

    #[error("Invalid learning rate: {0} (must be > 0.0 and <= 1.0)")]
    InvalidLearningRate(f32),

    #[error("Invalid batch size: {0} (must be > 0)")]
    InvalidBatchSize(usize),

    #[error("Invalid epochs: {0} (must be > 0)")]
    InvalidEpochs(usize),

    #[error("Invalid gradient clip value: {0} (must be > 0.0)")]
    InvalidGradClip(f32),

    #[error("Invalid dropout rate: {0} (must be in [0.0, 1.0))")]
    InvalidDropRate(f32),

    #[error("Invalid drop path rate: {0} (must be in [0.0, 1.0))")]
    InvalidDropPath(f32),

    #[error("Invalid eval crop ratio: {0} (must be in (0.0, 1.0])")]
    InvalidCropRatio(f32),

    #[error("Invalid optimizer betas: {0:?} (each must be in [0.0, 1.0))")]
    InvalidBetas([f32; 2]),

    #[error("Invalid weight decay: {0} (must be >= 0.0)")]
    InvalidWeightDecay(f32),

    #[error("Invalid number of classes: {0} (must be > 0)")]
    InvalidClassCount(usize),

    #[error("Training requires at least one block index in `replace`")]
    EmptyReplace,

    #[error("Evaluation requires `eval_model`")]
    MissingEvalModel,
}

/// Validate a distillation specification
pub fn validate_spec(spec: &DistillSpec) -> Result<(), ValidationError> {
    let table = spec.arch_table();
    let known = registered_models().contains(&spec.d_model.as_str()) && table.get(&spec.d_model).is_ok();
    if !known {
        return Err(ValidationError::UnknownModel(
            spec.d_model.clone(),
            registered_models().join(", "),
        ));
    }
    if spec.input_size == 0 {
        return Err(ValidationError::InvalidInputSize(spec.input_size));
    }
    if !(spec.lr > 0.0 && spec.lr <= 1.0) {
        return Err(ValidationError::InvalidLearningRate(spec.lr));
    }
    if spec.batch_size == 0 {
        return Err(ValidationError::InvalidBatchSize(spec.batch_size));
    }
    if spec.epochs == 0 {
        return Err(ValidationError::InvalidEpochs(spec.epochs));
    }
    if let Some(clip) = spec.clip_grad {
        if !(clip > 0.0) {
            return Err(ValidationError::InvalidGradClip(clip));
        }
    }
    if !(0.0..1.0).contains(&spec.drop) {
        return Err(ValidationError::InvalidDropRate(spec.drop));
    }
    if !(0.0..1.0).contains(&spec.drop_path) {
        return Err(ValidationError::InvalidDropPath(spec.drop_path));
    }
    if !(spec.eval_crop_ratio > 0.0 && spec.eval_crop_ratio <= 1.0) {
        return Err(ValidationError::InvalidCropRatio(spec.eval_crop_ratio));
    }
    if let Some(betas) = spec.opt_betas {
        if !betas.iter().all(|b| (0.0..1.0).contains(b)) {
            return Err(ValidationError::InvalidBetas(betas));
        }
    }
    if !(spec.weight_decay >= 0.0) {
        return Err(ValidationError::InvalidWeightDecay(spec.weight_decay));
    }
    if spec.nb_classes == 0 {
        return Err(ValidationError::InvalidClassCount(spec.nb_classes));
    }
    if spec.train && spec.replace.is_empty() {
        return Err(ValidationError::EmptyReplace);
    }
    if spec.eval && spec.eval_model.is_empty() {
        return Err(ValidationError::MissingEvalModel);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn train_spec() -> DistillSpec {
        DistillSpec {
            train: true,
            replace: vec![1],
            ..Default::default()
        }
    }

    #[test]
    fn test_default_train_spec_is_valid() {
        assert_eq!(validate_spec(&train_spec()), Ok(()));
    }

    #[test]
    fn test_unknown_model() {
        let spec = DistillSpec {
            d_model: "resnet50".into(),
            ..train_spec()
        };
        assert!(matches!(validate_spec(&spec), Err(ValidationError::UnknownModel(..))));
    }

    #[test]
    fn test_train_needs_replace() {
        let spec = DistillSpec {
            replace: vec![],
            ..train_spec()
        };
        assert_eq!(validate_spec(&spec), Err(ValidationError::EmptyReplace));
    }

    #[test]
    fn test_eval_needs_model() {
        let spec = DistillSpec {
            train: false,
            eval: true,
            ..train_spec()
        };
        assert_eq!(validate_spec(&spec), Err(ValidationError::MissingEvalModel));
    }

    #[test]
    fn test_nan_lr_rejected() {
        let spec = DistillSpec {
            lr: f32::NAN,
            ..train_spec()
        };
        assert!(matches!(validate_spec(&spec), Err(ValidationError::InvalidLearningRate(_))));
    }

    #[test]
    fn test_drop_path_out_of_range() {
        let spec = DistillSpec {
            drop_path: 1.0,
            ..train_spec()
        };
        assert_eq!(validate_spec(&spec), Err(ValidationError::InvalidDropPath(1.0)));
    }

    proptest! {
        #[test]
        fn prop_crop_ratio_range(ratio in -2.0f32..2.0) {
            let spec = DistillSpec { eval_crop_ratio: ratio, ..train_spec() };
            let ok = ratio > 0.0 && ratio <= 1.0;
            prop_assert_eq!(validate_spec(&spec).is_ok(), ok);
        }

        #[test]
        fn prop_batch_size_positive(batch in 0usize..1024) {
            let spec = DistillSpec { batch_size: batch, ..train_spec() };
            prop_assert_eq!(validate_spec(&spec).is_ok(), batch > 0);
        }
    }
}
