//! Feature-matching loss for block distillation

use crate::autograd::{BackwardOp, GradCell, Tensor};
use ndarray::Array1;
use std::rc::Rc;

/// `1 - mean cosine similarity` between matching feature vectors
///
/// Both inputs are `(..., dim)`; every length-`dim` row of the student is
/// compared with the same row of the teacher. The loss is 0 when the
/// features point the same way and 2 when they are opposite.
///
/// # Example
///
/// ```
/// use blockdistill::distill::CosineSimilarityLoss;
/// use blockdistill::Tensor;
///
/// let a = Tensor::from_shape_vec(&[1, 2, 2], vec![1.0, 0.0, 0.0, 1.0], true);
/// let loss = CosineSimilarityLoss::default().forward(&a, &a.detach());
/// assert!(loss.data()[0].abs() < 1e-6);
/// ```
#[derive(Debug, Clone, Copy)]
pub struct CosineSimilarityLoss {
    /// Lower bound on each vector norm
    pub eps: f32,
}

impl Default for CosineSimilarityLoss {
    fn default() -> Self {
        Self { eps: 1e-8 }
    }
}

struct RowStats {
    cos: Vec<f32>,
    norm_s: Vec<f32>,
    norm_t: Vec<f32>,
}

impl CosineSimilarityLoss {
    fn stats(&self, s: &[f32], t: &[f32], dim: usize) -> RowStats {
        let rows = s.len() / dim;
        let mut stats = RowStats {
            cos: Vec::with_capacity(rows),
            norm_s: Vec::with_capacity(rows),
            norm_t: Vec::with_capacity(rows),
        };
        for (a, b) in s.chunks_exact(dim).zip(t.chunks_exact(dim)) {
            let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
            let na = a.iter().map(|x| x * x).sum::<f32>().sqrt().max(self.eps);
            let nb = b.iter().map(|x| x * x).sum::<f32>().sqrt().max(self.eps);
            stats.cos.push(dot / (na * nb));
            stats.norm_s.push(na);
            stats.norm_t.push(nb);
        }
        stats
    }

    /// Per-row cosine similarities, without building a graph
    pub fn similarities(&self, student: &Tensor, teacher: &Tensor) -> Vec<f32> {
        let dim = feature_dim(student, teacher);
        self.stats(student.as_slice(), teacher.as_slice(), dim).cos
    }

    /// Scalar loss tensor; gradients flow to whichever input tracks them
    ///
    /// # Panics
    /// Panics if the inputs have different shapes.
    pub fn forward(&self, student: &Tensor, teacher: &Tensor) -> Tensor {
        let dim = feature_dim(student, teacher);
        let stats = self.stats(student.as_slice(), teacher.as_slice(), dim);
        let rows = stats.cos.len().max(1);
        let loss = 1.0 - stats.cos.iter().sum::<f32>() / rows as f32;

        let requires_grad = student.requires_grad() || teacher.requires_grad();
        let mut result = Tensor::from_vec(vec![loss], requires_grad);

        if requires_grad {
            let backward_op = Rc::new(CosineBackward {
                student: student.clone(),
                teacher: teacher.clone(),
                dim,
                stats,
                result_grad: result.grad_cell(),
            });
            result.set_backward_op(backward_op);
        }

        result
    }
}

fn feature_dim(student: &Tensor, teacher: &Tensor) -> usize {
    assert_eq!(
        student.shape(),
        teacher.shape(),
        "cosine loss: student and teacher shapes differ"
    );
    student.shape().last().copied().unwrap_or(1).max(1)
}

struct CosineBackward {
    student: Tensor,
    teacher: Tensor,
    dim: usize,
    stats: RowStats,
    result_grad: GradCell,
}

impl CosineBackward {
    /// ∂L/∂a for rows of `a` against rows of `b`:
    /// -(1/R) * (b / (|a||b|) - cos * a / |a|²)
    fn grad_for(&self, a: &[f32], b: &[f32], na: &[f32], nb: &[f32], upstream: f32) -> Array1<f32> {
        let rows = self.stats.cos.len().max(1) as f32;
        let mut grad = Vec::with_capacity(a.len());
        for (r, (ar, br)) in a
            .chunks_exact(self.dim)
            .zip(b.chunks_exact(self.dim))
            .enumerate()
        {
            let cos = self.stats.cos[r];
            let inv = 1.0 / (na[r] * nb[r]);
            let inv_a2 = 1.0 / (na[r] * na[r]);
            grad.extend(
                ar.iter()
                    .zip(br)
                    .map(|(x, y)| -upstream / rows * (y * inv - cos * x * inv_a2)),
            );
        }
        Array1::from(grad)
    }
}

impl BackwardOp for CosineBackward {
    fn backward(&self) {
        if let Some(grad) = self.result_grad.borrow().as_ref() {
            let upstream = grad[0];
            let (s, t) = (self.student.as_slice(), self.teacher.as_slice());
            if self.student.requires_grad() {
                let g = self.grad_for(s, t, &self.stats.norm_s, &self.stats.norm_t, upstream);
                self.student.accumulate_grad(g);
            }
            if self.teacher.requires_grad() {
                let g = self.grad_for(t, s, &self.stats.norm_t, &self.stats.norm_s, upstream);
                self.teacher.accumulate_grad(g);
            }
        }
    }

    fn inputs(&self) -> Vec<&Tensor> {
        vec![&self.student, &self.teacher]
    }
}
