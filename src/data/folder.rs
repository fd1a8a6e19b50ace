//! Class-per-subdirectory image folders (ImageNet and iNaturalist layouts)

use super::dataset::{ImageDataset, Sample};
use super::transform::Transform;
use crate::{Error, Result};
use rand::rngs::StdRng;
use std::path::{Path, PathBuf};

const EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "JPEG"];

/// `root/<class>/<image>` with classes sorted by directory name
pub struct ImageFolder {
    classes: Vec<String>,
    items: Vec<(PathBuf, usize)>,
    transform: Transform,
}

impl ImageFolder {
    /// Scan `root` for class directories and their images
    pub fn open(root: &Path, transform: Transform) -> Result<Self> {
        if !root.is_dir() {
            return Err(Error::Data(format!("image folder {} not found", root.display())));
        }
        let mut classes: Vec<String> = std::fs::read_dir(root)?
            .filter_map(|entry| entry.ok())
            .filter(|entry| entry.path().is_dir())
            .filter_map(|entry| entry.file_name().into_string().ok())
            .collect();
        classes.sort();

        let mut items = Vec::new();
        for (label, class) in classes.iter().enumerate() {
            let mut files: Vec<PathBuf> = std::fs::read_dir(root.join(class))?
                .filter_map(|entry| entry.ok().map(|e| e.path()))
                .filter(|p| {
                    p.extension()
                        .and_then(|e| e.to_str())
                        .is_some_and(|e| EXTENSIONS.contains(&e))
                })
                .collect();
            files.sort();
            items.extend(files.into_iter().map(|p| (p, label)));
        }
        if items.is_empty() {
            return Err(Error::Data(format!("no images found under {}", root.display())));
        }
        tracing::debug!(root = %root.display(), classes = classes.len(), images = items.len(), "scanned image folder");
        Ok(Self {
            classes,
            items,
            transform,
        })
    }

    /// Class names in label order
    pub fn classes(&self) -> &[String] {
        &self.classes
    }
}

impl ImageDataset for ImageFolder {
    fn len(&self) -> usize {
        self.items.len()
    }

    fn image_size(&self) -> usize {
        self.transform.input_size
    }

    fn get(&self, index: usize, rng: &mut StdRng) -> Result<Sample> {
        let (path, label) = self
            .items
            .get(index)
            .ok_or_else(|| Error::Data(format!("image index {index} out of range")))?;
        let img = image::open(path)?;
        Ok(Sample {
            pixels: self.transform.apply(&img, rng),
            label: *label,
        })
    }
}
