//! Seeded mini-batch loader

use super::dataset::ImageDataset;
use crate::{Result, Tensor};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;

/// A batch of images and their labels
#[derive(Clone)]
pub struct Batch {
    /// `(batch, 3, size, size)`
    pub images: Tensor,
    pub labels: Vec<usize>,
}

impl Batch {
    /// Number of samples in the batch
    pub fn size(&self) -> usize {
        self.labels.len()
    }
}

/// Batches a dataset, optionally shuffled and dropping the ragged tail
pub struct DataLoader<'a> {
    dataset: &'a dyn ImageDataset,
    batch_size: usize,
    shuffle: bool,
    drop_last: bool,
    rng: StdRng,
}

impl<'a> DataLoader<'a> {
    /// Sequential loader
    pub fn new(dataset: &'a dyn ImageDataset, batch_size: usize, seed: u64) -> Self {
        Self {
            dataset,
            batch_size: batch_size.max(1),
            shuffle: false,
            drop_last: false,
            rng: StdRng::seed_from_u64(seed),
        }
    }

    /// Visit samples in a fresh random order each epoch
    pub fn shuffled(mut self) -> Self {
        self.shuffle = true;
        self
    }

    /// Skip the final batch when it would be smaller than `batch_size`
    pub fn drop_last(mut self) -> Self {
        self.drop_last = true;
        self
    }

    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    pub fn dataset_len(&self) -> usize {
        self.dataset.len()
    }

    /// Batches per epoch
    pub fn len(&self) -> usize {
        let n = self.dataset.len();
        if self.drop_last {
            n / self.batch_size
        } else {
            n.div_ceil(self.batch_size)
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Start an epoch; the order is drawn from the loader's seeded RNG
    pub fn epoch(&mut self) -> Epoch<'_, 'a> {
        let mut order: Vec<usize> = (0..self.dataset.len()).collect();
        if self.shuffle {
            order.shuffle(&mut self.rng);
        }
        let batches = self.len();
        Epoch {
            loader: self,
            order,
            next: 0,
            batches,
        }
    }
}

/// Iterator over one epoch's batches
pub struct Epoch<'l, 'a> {
    loader: &'l mut DataLoader<'a>,
    order: Vec<usize>,
    next: usize,
    batches: usize,
}

impl Iterator for Epoch<'_, '_> {
    type Item = Result<Batch>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.next >= self.batches {
            return None;
        }
        let start = self.next * self.loader.batch_size;
        let end = (start + self.loader.batch_size).min(self.order.len());
        self.next += 1;
        Some(collate(
            self.loader.dataset,
            &self.order[start..end],
            &mut self.loader.rng,
        ))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let left = self.batches - self.next;
        (left, Some(left))
    }
}

fn collate(dataset: &dyn ImageDataset, indices: &[usize], rng: &mut StdRng) -> Result<Batch> {
    let size = dataset.image_size();
    let mut pixels = Vec::with_capacity(indices.len() * 3 * size * size);
    let mut labels = Vec::with_capacity(indices.len());
    for &i in indices {
        let sample = dataset.get(i, rng)?;
        pixels.extend_from_slice(&sample.pixels);
        labels.push(sample.label);
    }
    Ok(Batch {
        images: Tensor::from_shape_vec(&[indices.len(), 3, size, size], pixels, false),
        labels,
    })
}
