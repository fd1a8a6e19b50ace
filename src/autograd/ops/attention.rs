//! Attention autograd operations: fused multi-head self-attention
//!
//! Works on the packed `qkv` projection used by ViT checkpoints, so a single
//! linear layer feeds all three streams.

use super::activations::softmax_in_place;
use crate::autograd::{BackwardOp, GradCell, Tensor};
use ndarray::{s, Array1, Array2, Array3};
use std::rc::Rc;

/// Geometry of a packed attention input
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AttentionShape {
    /// Batch size
    pub batch: usize,
    /// Tokens per sample
    pub seq_len: usize,
    /// Number of heads
    pub num_heads: usize,
    /// Per-head width
    pub head_dim: usize,
}

impl AttentionShape {
    fn dim(&self) -> usize {
        self.num_heads * self.head_dim
    }

    /// Gather one stream (0 = q, 1 = k, 2 = v) of one head as `(seq_len, head_dim)`
    fn gather(&self, qkv: &[f32], b: usize, stream: usize, h: usize) -> Array2<f32> {
        let dim = self.dim();
        let mut out = Array2::<f32>::zeros((self.seq_len, self.head_dim));
        for n in 0..self.seq_len {
            let base = (b * self.seq_len + n) * 3 * dim + stream * dim + h * self.head_dim;
            out.row_mut(n)
                .assign(&ndarray::ArrayView1::from(&qkv[base..base + self.head_dim]));
        }
        out
    }

    /// Add a `(seq_len, head_dim)` block back into a packed `qkv` gradient
    fn scatter(&self, dst: &mut [f32], src: &Array2<f32>, b: usize, stream: usize, h: usize) {
        let dim = self.dim();
        for n in 0..self.seq_len {
            let base = (b * self.seq_len + n) * 3 * dim + stream * dim + h * self.head_dim;
            for (d, v) in src.row(n).iter().enumerate() {
                dst[base + d] += v;
            }
        }
    }
}

/// Scaled dot-product self-attention over all heads
///
/// - `qkv`: `(batch, seq_len, 3 * num_heads * head_dim)` flattened
///
/// Returns `(batch, seq_len, num_heads * head_dim)`:
/// per head, `softmax(Q Kᵀ / √head_dim) V`, heads concatenated per token.
pub fn multi_head_attention(qkv: &Tensor, shape: AttentionShape) -> Tensor {
    let AttentionShape {
        batch,
        seq_len,
        num_heads,
        head_dim,
    } = shape;
    let dim = shape.dim();
    assert_eq!(
        qkv.len(),
        batch * seq_len * 3 * dim,
        "attention: packed qkv length mismatch"
    );
    let scale = 1.0 / (head_dim as f32).sqrt();
    let src = qkv.as_slice();

    let mut output = vec![0.0f32; batch * seq_len * dim];
    let mut probs = Array3::<f32>::zeros((batch * num_heads, seq_len, seq_len));

    for b in 0..batch {
        for h in 0..num_heads {
            let q = shape.gather(src, b, 0, h);
            let k = shape.gather(src, b, 1, h);
            let v = shape.gather(src, b, 2, h);

            // `dot` may hand back a column-major product (head_dim == 1)
            let mut scores = (q.dot(&k.t()) * scale).as_standard_layout().into_owned();
            for mut row in scores.rows_mut() {
                let row = row
                    .as_slice_mut()
                    .expect("rows of a standard layout array are contiguous");
                softmax_in_place(row);
            }

            let out = scores.dot(&v);
            for n in 0..seq_len {
                let base = (b * seq_len + n) * dim + h * head_dim;
                for (d, val) in out.row(n).iter().enumerate() {
                    output[base + d] = *val;
                }
            }
            probs.slice_mut(s![b * num_heads + h, .., ..]).assign(&scores);
        }
    }

    let requires_grad = qkv.requires_grad();
    let mut result = Tensor::from_shape_vec(&[batch, seq_len, dim], output, requires_grad);

    if requires_grad {
        let backward_op = Rc::new(AttentionBackward {
            qkv: qkv.clone(),
            shape,
            probs,
            scale,
            result_grad: result.grad_cell(),
        });
        result.set_backward_op(backward_op);
    }

    result
}

struct AttentionBackward {
    qkv: Tensor,
    shape: AttentionShape,
    probs: Array3<f32>,
    scale: f32,
    result_grad: GradCell,
}

impl BackwardOp for AttentionBackward {
    fn backward(&self) {
        let Some(grad_output) = self.result_grad.borrow().as_ref().cloned() else {
            return;
        };
        if !self.qkv.requires_grad() {
            return;
        }

        let AttentionShape {
            batch,
            seq_len,
            num_heads,
            head_dim,
        } = self.shape;
        let dim = self.shape.dim();
        let src = self.qkv.as_slice();
        let go = grad_output.as_standard_layout();
        let go = go.as_slice().expect("standard layout is contiguous");
        let mut grad_qkv = vec![0.0f32; self.qkv.len()];

        for b in 0..batch {
            for h in 0..num_heads {
                let q = self.shape.gather(src, b, 0, h);
                let k = self.shape.gather(src, b, 1, h);
                let v = self.shape.gather(src, b, 2, h);
                let p = self.probs.slice(s![b * num_heads + h, .., ..]);

                let mut d_out = Array2::<f32>::zeros((seq_len, head_dim));
                for n in 0..seq_len {
                    let base = (b * seq_len + n) * dim + h * head_dim;
                    d_out
                        .row_mut(n)
                        .assign(&ndarray::ArrayView1::from(&go[base..base + head_dim]));
                }

                // dV = Pᵀ dO, dP = dO Vᵀ
                let d_v = p.t().dot(&d_out);
                let d_p = d_out.dot(&v.t());

                // Softmax backward per row: dS = P ⊙ (dP - Σ_j dP ⊙ P)
                let mut d_s = Array2::<f32>::zeros((seq_len, seq_len));
                for i in 0..seq_len {
                    let p_row = p.row(i);
                    let dp_row = d_p.row(i);
                    let dot = (&p_row * &dp_row).sum();
                    for j in 0..seq_len {
                        d_s[[i, j]] = p_row[j] * (dp_row[j] - dot) * self.scale;
                    }
                }

                // dQ = dS K, dK = dSᵀ Q
                let d_q = d_s.dot(&k);
                let d_k = d_s.t().dot(&q);

                self.shape.scatter(&mut grad_qkv, &d_q, b, 0, h);
                self.shape.scatter(&mut grad_qkv, &d_k, b, 1, h);
                self.shape.scatter(&mut grad_qkv, &d_v, b, 2, h);
            }
        }

        self.qkv.accumulate_grad(Array1::from(grad_qkv));
    }

    fn inputs(&self) -> Vec<&Tensor> {
        vec![&self.qkv]
    }
}
