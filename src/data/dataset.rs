//! Indexed image datasets

use crate::{Error, Result};
use rand::rngs::StdRng;

/// One preprocessed example
#[derive(Debug, Clone, PartialEq)]
pub struct Sample {
    /// Normalized pixels, channel-major `(3, size, size)`
    pub pixels: Vec<f32>,
    pub label: usize,
}

/// Random-access collection of labelled images
///
/// `rng` drives per-sample augmentation and is ignored by eval-mode
/// datasets.
pub trait ImageDataset {
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Side length of every returned image
    fn image_size(&self) -> usize;

    fn get(&self, index: usize, rng: &mut StdRng) -> Result<Sample>;
}

/// Preprocessed samples held in memory
///
/// Mostly useful for synthetic data and tests.
#[derive(Debug, Clone)]
pub struct TensorDataset {
    size: usize,
    samples: Vec<Sample>,
}

impl TensorDataset {
    /// Every sample must hold `3 * size * size` pixels
    pub fn new(size: usize, samples: Vec<Sample>) -> Result<Self> {
        let expected = 3 * size * size;
        if let Some(bad) = samples.iter().find(|s| s.pixels.len() != expected) {
            return Err(Error::ShapeMismatch {
                expected: vec![3, size, size],
                actual: vec![bad.pixels.len()],
            });
        }
        Ok(Self { size, samples })
    }
}

impl ImageDataset for TensorDataset {
    fn len(&self) -> usize {
        self.samples.len()
    }

    fn image_size(&self) -> usize {
        self.size
    }

    fn get(&self, index: usize, _rng: &mut StdRng) -> Result<Sample> {
        self.samples
            .get(index)
            .cloned()
            .ok_or_else(|| Error::Data(format!("index {index} out of range for {} samples", self.len())))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;

    #[test]
    fn test_tensor_dataset_checks_size() {
        let ok = Sample {
            pixels: vec![0.0; 12],
            label: 0,
        };
        let bad = Sample {
            pixels: vec![0.0; 5],
            label: 1,
        };
        assert!(TensorDataset::new(2, vec![ok.clone()]).is_ok());
        assert!(TensorDataset::new(2, vec![ok, bad]).is_err());
    }

    #[test]
    fn test_out_of_range_index() {
        let ds = TensorDataset::new(1, vec![]).unwrap();
        let mut rng = StdRng::seed_from_u64(0);
        assert!(ds.is_empty());
        assert!(matches!(ds.get(0, &mut rng), Err(Error::Data(_))));
    }
}
