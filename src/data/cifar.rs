//! CIFAR-100 binary format reader
//!
//! Each record is `<coarse label:1><fine label:1><pixels:3072>`, pixels
//! stored as three 32×32 planes (R, G, B). The fine label is the class.

use super::dataset::{ImageDataset, Sample};
use super::transform::Transform;
use crate::{Error, Result};
use image::{DynamicImage, RgbImage};
use rand::rngs::StdRng;
use std::path::Path;

/// Class count of CIFAR-100 fine labels
pub const CIFAR100_CLASSES: usize = 100;

const SIDE: usize = 32;
const PLANE: usize = SIDE * SIDE;
const RECORD: usize = 2 + 3 * PLANE;

/// CIFAR-100 split held in memory as raw bytes
pub struct Cifar100 {
    records: Vec<u8>,
    transform: Transform,
}

impl Cifar100 {
    /// Open `train.bin` or `test.bin` under `root`
    ///
    /// Also looks inside `root/cifar-100-binary/`, the archive's folder.
    pub fn open(root: &Path, train: bool, transform: Transform) -> Result<Self> {
        let file = if train { "train.bin" } else { "test.bin" };
        let path = [root.join(file), root.join("cifar-100-binary").join(file)]
            .into_iter()
            .find(|p| p.is_file())
            .ok_or_else(|| {
                Error::Data(format!("CIFAR-100 file {file} not found under {}", root.display()))
            })?;
        Self::from_bytes(std::fs::read(&path)?, transform).map_err(|e| match e {
            Error::Data(msg) => Error::Data(format!("{}: {msg}", path.display())),
            other => other,
        })
    }

    /// Parse records from an in-memory buffer
    pub fn from_bytes(records: Vec<u8>, transform: Transform) -> Result<Self> {
        if records.len() % RECORD != 0 {
            return Err(Error::Data(format!(
                "size {} is not a multiple of the {RECORD}-byte record",
                records.len()
            )));
        }
        tracing::debug!(records = records.len() / RECORD, "loaded CIFAR-100 split");
        Ok(Self { records, transform })
    }

    fn record(&self, index: usize) -> Result<&[u8]> {
        self.records
            .get(index * RECORD..(index + 1) * RECORD)
            .ok_or_else(|| Error::Data(format!("CIFAR index {index} out of range")))
    }
}

impl ImageDataset for Cifar100 {
    fn len(&self) -> usize {
        self.records.len() / RECORD
    }

    fn image_size(&self) -> usize {
        self.transform.input_size
    }

    fn get(&self, index: usize, rng: &mut StdRng) -> Result<Sample> {
        let record = self.record(index)?;
        let label = record[1] as usize;
        let planes = &record[2..];
        let img = RgbImage::from_fn(SIDE as u32, SIDE as u32, |x, y| {
            let i = y as usize * SIDE + x as usize;
            image::Rgb([planes[i], planes[PLANE + i], planes[2 * PLANE + i]])
        });
        Ok(Sample {
            pixels: self.transform.apply(&DynamicImage::ImageRgb8(img), rng),
            label,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;

    fn fake_records(labels: &[u8]) -> Vec<u8> {
        let mut out = Vec::new();
        for &label in labels {
            out.push(label / 5);
            out.push(label);
            out.extend(std::iter::repeat(label.wrapping_mul(2)).take(3 * PLANE));
        }
        out
    }

    #[test]
    fn test_reads_fine_labels() {
        let ds = Cifar100::from_bytes(fake_records(&[3, 99, 0]), Transform::new(32, 1.0, false)).unwrap();
        let mut rng = StdRng::seed_from_u64(0);
        assert_eq!(ds.len(), 3);
        assert_eq!(ds.get(1, &mut rng).unwrap().label, 99);
        assert_eq!(ds.get(0, &mut rng).unwrap().pixels.len(), 3 * 32 * 32);
        assert!(ds.get(3, &mut rng).is_err());
    }

    #[test]
    fn test_truncated_file_rejected() {
        let mut bytes = fake_records(&[1]);
        bytes.pop();
        assert!(Cifar100::from_bytes(bytes, Transform::new(32, 1.0, false)).is_err());
    }

    #[test]
    fn test_open_from_directory() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("test.bin"), fake_records(&[7, 8])).unwrap();
        let ds = Cifar100::open(dir.path(), false, Transform::new(16, 0.875, false)).unwrap();
        assert_eq!(ds.len(), 2);
        assert_eq!(ds.image_size(), 16);
        assert!(Cifar100::open(dir.path(), true, Transform::new(16, 0.875, true)).is_err());
    }
}
