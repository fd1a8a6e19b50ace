//! Shared fixtures for training tests

use super::{Distiller, TrainSettings};
use crate::autograd::GradScaler;
use crate::data::{Batch, Sample, TensorDataset};
use crate::distill::{replace_blocks, set_trainable, truncate, CosineSimilarityLoss};
use crate::optim::{AdamW, ConstantLR, Warmup};
use crate::transformer::testing::{tiny_config, tiny_images};
use crate::transformer::{ArchTable, MixerParams, VisionTransformer};
use std::path::Path;

pub(crate) struct Fixture {
    pub student: VisionTransformer,
    pub teacher: VisionTransformer,
    pub batches: Vec<Batch>,
}

pub(crate) fn tiny_table() -> ArchTable {
    let mut table = ArchTable::default();
    table.insert(
        "tiny",
        MixerParams {
            num_patches: 4,
            token_hid_dim: 6,
            channels_dim: 8,
            channels_hid_dim: 16,
        },
    );
    table
}

/// Student with block 1 replaced, both models cut after block 1
pub(crate) fn fixture() -> Fixture {
    let mut student = VisionTransformer::new(tiny_config(), 7);
    let mut teacher = VisionTransformer::new(tiny_config(), 7);
    replace_blocks(&mut student, &[1], &tiny_table(), "tiny").expect("tiny table fits");
    truncate(&mut student, 1).expect("depth 3");
    truncate(&mut teacher, 1).expect("depth 3");
    set_trainable(&mut student, &[1], true);
    set_trainable(&mut teacher, &[], true);

    let batches = vec![Batch {
        images: tiny_images(2),
        labels: vec![0, 1],
    }];
    Fixture {
        student,
        teacher,
        batches,
    }
}

/// `n` deterministic 8px samples
pub(crate) fn tiny_dataset(n: usize) -> TensorDataset {
    let samples = (0..n)
        .map(|i| Sample {
            pixels: (0..3 * 64)
                .map(|p| ((p * (i + 1)) as f32 * 0.031).cos())
                .collect(),
            label: i % 5,
        })
        .collect();
    TensorDataset::new(8, samples).expect("8px samples")
}

/// Learning rate of the fixture distiller
pub(crate) const FIXTURE_LR: f32 = 1e-3;

pub(crate) fn distiller<'m>(student: &'m mut VisionTransformer, teacher: &'m VisionTransformer) -> Distiller<'m> {
    distiller_with(student, teacher, Path::new("unused"), 1)
}

pub(crate) fn distiller_with<'m>(
    student: &'m mut VisionTransformer,
    teacher: &'m VisionTransformer,
    output_dir: &Path,
    epochs: usize,
) -> Distiller<'m> {
    let settings = TrainSettings {
        epochs,
        start_epoch: 0,
        clip_grad: Some(5.0),
        log_every: 1,
        output_dir: output_dir.to_path_buf(),
        model_name: "tiny".into(),
        replace: vec![1],
        n_parameters: student.num_trainable_parameters(),
    };
    Distiller::new(
        student,
        teacher,
        CosineSimilarityLoss::default(),
        Box::new(AdamW::default_params(FIXTURE_LR)),
        GradScaler::disabled(),
        Box::new(ConstantLR::new(
            FIXTURE_LR,
            Warmup {
                warmup_lr: 0.0,
                warmup_epochs: 0,
            },
        )),
        settings,
    )
}
