//! Normalization autograd operations: row-wise layer_norm

use crate::autograd::{BackwardOp, GradCell, Tensor};
use ndarray::{Array1, Array2, Axis};
use std::rc::Rc;

/// Layer Normalization over the last dimension
///
/// Every row of width `gamma.len()` is normalized to mean 0 and variance 1,
/// then scaled and shifted:
/// LayerNorm(x) = gamma * (x - mean) / sqrt(var + epsilon) + beta
pub fn layer_norm(x: &Tensor, gamma: &Tensor, beta: &Tensor, epsilon: f32) -> Tensor {
    let dim = gamma.len();
    assert_eq!(beta.len(), dim, "layer_norm: gamma/beta length mismatch");
    assert!(
        dim > 0 && x.len() % dim == 0,
        "layer_norm: {} elements not divisible by width {dim}",
        x.len()
    );
    let rows = x.len() / dim;

    let xv = x
        .data()
        .view()
        .into_shape_with_order((rows, dim))
        .expect("contiguous buffer reshapes");

    let mut normalized = Array2::<f32>::zeros((rows, dim));
    let mut inv_std = Array1::<f32>::zeros(rows);
    for (r, row) in xv.outer_iter().enumerate() {
        let mean = row.sum() / dim as f32;
        let variance = row.mapv(|v| (v - mean).powi(2)).sum() / dim as f32;
        let istd = 1.0 / (variance + epsilon).sqrt();
        inv_std[r] = istd;
        normalized
            .row_mut(r)
            .assign(&row.mapv(|v| (v - mean) * istd));
    }

    let out = &normalized * gamma.data() + beta.data();
    let data: Vec<f32> = out.iter().copied().collect();

    let requires_grad = x.requires_grad() || gamma.requires_grad() || beta.requires_grad();
    let mut result = Tensor::from_vec(data, requires_grad).reshape(x.shape());

    if requires_grad {
        let backward_op = Rc::new(LayerNormBackward {
            x: x.clone(),
            gamma: gamma.clone(),
            beta: beta.clone(),
            normalized,
            inv_std,
            result_grad: result.grad_cell(),
        });
        result.set_backward_op(backward_op);
    }

    result
}

struct LayerNormBackward {
    x: Tensor,
    gamma: Tensor,
    beta: Tensor,
    normalized: Array2<f32>,
    inv_std: Array1<f32>,
    result_grad: GradCell,
}

impl BackwardOp for LayerNormBackward {
    fn backward(&self) {
        if let Some(grad_output) = self.result_grad.borrow().as_ref() {
            let (rows, dim) = self.normalized.dim();
            let gv = grad_output
                .view()
                .into_shape_with_order((rows, dim))
                .expect("contiguous gradient reshapes");

            // ∂L/∂beta = Σ_rows ∂L/∂y
            if self.beta.requires_grad() {
                self.beta.accumulate_grad(gv.sum_axis(Axis(0)));
            }

            // ∂L/∂gamma = Σ_rows ∂L/∂y * x_normalized
            if self.gamma.requires_grad() {
                let grad_gamma = (&gv * &self.normalized).sum_axis(Axis(0));
                self.gamma.accumulate_grad(grad_gamma);
            }

            if self.x.requires_grad() {
                let n = dim as f32;
                let mut grad_x = Vec::with_capacity(rows * dim);
                for r in 0..rows {
                    let grad_normalized = &gv.row(r) * self.gamma.data();
                    let norm_row = self.normalized.row(r);
                    let sum_grad = grad_normalized.sum();
                    let sum_grad_normalized = (&grad_normalized * &norm_row).sum();
                    let istd = self.inv_std[r];

                    // ∂L/∂x_i = (1/std) * [g_i - mean(g) - x̂_i * mean(g * x̂)]
                    grad_x.extend(grad_normalized.iter().zip(norm_row.iter()).map(
                        |(&g, &xh)| istd * (g - sum_grad / n - xh * sum_grad_normalized / n),
                    ));
                }
                self.x.accumulate_grad(Array1::from(grad_x));
            }
        }
    }

    fn inputs(&self) -> Vec<&Tensor> {
        vec![&self.x, &self.gamma, &self.beta]
    }
}
