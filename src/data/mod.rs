//! Datasets, preprocessing and batching
//!
//! `build_dataset` picks a reader for the configured dataset kind and
//! returns it along with its class count.

mod cifar;
mod dataset;
mod folder;
mod loader;
mod transform;

pub use cifar::{Cifar100, CIFAR100_CLASSES};
pub use dataset::{ImageDataset, Sample, TensorDataset};
pub use folder::ImageFolder;
pub use loader::{Batch, DataLoader, Epoch};
pub use transform::{normalize, Transform, IMAGENET_MEAN, IMAGENET_STD};

use crate::Result;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Supported dataset layouts
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "UPPERCASE")]
#[value(rename_all = "UPPERCASE")]
pub enum DataSetKind {
    /// CIFAR-100 binary files
    #[default]
    Cifar,
    /// ImageNet `train/` and `val/` folders
    Imnet,
    /// iNaturalist 2018, folder layout
    Inat,
    /// iNaturalist 2019, folder layout
    Inat19,
}

/// Where and how to read a dataset
#[derive(Debug, Clone, Copy)]
pub struct DataSettings<'a> {
    pub kind: DataSetKind,
    pub root: &'a Path,
    pub input_size: usize,
    pub eval_crop_ratio: f32,
}

/// Open the train or validation split and report its class count
pub fn build_dataset(is_train: bool, settings: &DataSettings<'_>) -> Result<(Box<dyn ImageDataset>, usize)> {
    let transform = Transform::new(settings.input_size, settings.eval_crop_ratio, is_train);
    let split = if is_train { "train" } else { "val" };
    tracing::info!(kind = ?settings.kind, split, root = %settings.root.display(), "loading dataset");

    match settings.kind {
        DataSetKind::Cifar => {
            let ds = Cifar100::open(settings.root, is_train, transform)?;
            Ok((Box::new(ds), CIFAR100_CLASSES))
        }
        DataSetKind::Imnet | DataSetKind::Inat | DataSetKind::Inat19 => {
            let ds = ImageFolder::open(&settings.root.join(split), transform)?;
            let classes = ds.classes().len();
            Ok((Box::new(ds), classes))
        }
    }
}
