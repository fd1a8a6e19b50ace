//! Classification metrics on logits

/// Whether `label` is among the `k` largest logits
pub fn in_top_k(logits: &[f32], label: usize, k: usize) -> bool {
    let Some(&target) = logits.get(label) else {
        return false;
    };
    // Ties rank ahead of the label only when they come earlier
    let ahead = logits
        .iter()
        .enumerate()
        .filter(|&(i, &v)| v > target || (v == target && i < label))
        .count();
    ahead < k
}

/// Softmax cross-entropy of one row against `label`
pub fn cross_entropy(logits: &[f32], label: usize) -> f32 {
    let max = logits.iter().copied().fold(f32::NEG_INFINITY, f32::max);
    let log_sum = logits.iter().map(|&v| (v - max).exp()).sum::<f32>().ln() + max;
    log_sum - logits.get(label).copied().unwrap_or(f32::NEG_INFINITY)
}

/// Running top-1/top-5 accuracy and mean cross-entropy
#[derive(Debug, Clone, Copy, Default)]
pub struct AccuracyMeter {
    count: usize,
    top1: usize,
    top5: usize,
    loss_sum: f64,
}

impl AccuracyMeter {
    /// Add a batch of `(batch, num_classes)` logits
    pub fn update(&mut self, logits: &[f32], num_classes: usize, labels: &[usize]) {
        for (row, &label) in logits.chunks_exact(num_classes).zip(labels) {
            self.count += 1;
            self.top1 += usize::from(in_top_k(row, label, 1));
            self.top5 += usize::from(in_top_k(row, label, 5));
            self.loss_sum += f64::from(cross_entropy(row, label));
        }
    }

    pub fn count(&self) -> usize {
        self.count
    }

    /// Percent of rows whose label is the argmax
    pub fn acc1(&self) -> f32 {
        self.percent(self.top1)
    }

    /// Percent of rows whose label is among the top five
    pub fn acc5(&self) -> f32 {
        self.percent(self.top5)
    }

    pub fn loss(&self) -> f32 {
        if self.count == 0 {
            0.0
        } else {
            (self.loss_sum / self.count as f64) as f32
        }
    }

    fn percent(&self, hits: usize) -> f32 {
        if self.count == 0 {
            0.0
        } else {
            100.0 * hits as f32 / self.count as f32
        }
    }
}
