//! Token-sequence reshaping: prepend, narrow, pad, transpose
//!
//! All ops here take `(batch, tokens, dim)` tensors and only move values
//! around, so their backward passes are the matching gathers and scatters.

use crate::autograd::{BackwardOp, GradCell, Tensor};
use ndarray::Array1;
use std::rc::Rc;

fn dims3(t: &Tensor, op: &str) -> (usize, usize, usize) {
    match t.shape() {
        [b, n, d] => (*b, *n, *d),
        other => panic!("{op}: expected (batch, tokens, dim), got {other:?}"),
    }
}

/// Copy `count` tokens starting at `src_start` of every sample in `src` to
/// `dst_start` of the matching sample in `dst`, adding to what is there.
#[allow(clippy::too_many_arguments)]
fn move_tokens(
    src: &[f32],
    src_tokens: usize,
    src_start: usize,
    dst: &mut [f32],
    dst_tokens: usize,
    dst_start: usize,
    count: usize,
    batch: usize,
    dim: usize,
) {
    for b in 0..batch {
        let s = (b * src_tokens + src_start) * dim;
        let d = (b * dst_tokens + dst_start) * dim;
        for (dv, sv) in dst[d..d + count * dim]
            .iter_mut()
            .zip(&src[s..s + count * dim])
        {
            *dv += sv;
        }
    }
}

/// Prepend learned tokens to every sample: `[t_0, .., t_k, x_0, .., x_n]`
///
/// Each entry of `prefix` holds `dim` values and is shared across the batch.
pub fn prepend_tokens(x: &Tensor, prefix: &[&Tensor]) -> Tensor {
    let (batch, tokens, dim) = dims3(x, "prepend_tokens");
    let extra = prefix.len();
    let total = extra + tokens;
    for t in prefix {
        assert_eq!(t.len(), dim, "prepend_tokens: prefix token width mismatch");
    }

    let mut out = vec![0.0f32; batch * total * dim];
    for b in 0..batch {
        for (i, t) in prefix.iter().enumerate() {
            let d = (b * total + i) * dim;
            out[d..d + dim].copy_from_slice(t.as_slice());
        }
    }
    move_tokens(x.as_slice(), tokens, 0, &mut out, total, extra, tokens, batch, dim);

    let requires_grad = x.requires_grad() || prefix.iter().any(|t| t.requires_grad());
    let mut result = Tensor::from_shape_vec(&[batch, total, dim], out, requires_grad);

    if requires_grad {
        let backward_op = Rc::new(PrependBackward {
            x: x.clone(),
            prefix: prefix.iter().map(|t| (*t).clone()).collect(),
            result_grad: result.grad_cell(),
        });
        result.set_backward_op(backward_op);
    }

    result
}

struct PrependBackward {
    x: Tensor,
    prefix: Vec<Tensor>,
    result_grad: GradCell,
}

impl BackwardOp for PrependBackward {
    fn backward(&self) {
        if let Some(grad) = self.result_grad.borrow().as_ref() {
            let (batch, tokens, dim) = dims3(&self.x, "prepend_tokens");
            let extra = self.prefix.len();
            let total = extra + tokens;
            let g = grad.as_slice().expect("gradient storage is contiguous");

            for (i, t) in self.prefix.iter().enumerate() {
                if t.requires_grad() {
                    let mut acc = vec![0.0f32; dim];
                    move_tokens(g, total, i, &mut acc, 1, 0, 1, 1, dim);
                    for b in 1..batch {
                        let s = (b * total + i) * dim;
                        for (a, v) in acc.iter_mut().zip(&g[s..s + dim]) {
                            *a += v;
                        }
                    }
                    t.accumulate_grad(Array1::from(acc));
                }
            }
            if self.x.requires_grad() {
                let mut gx = vec![0.0f32; self.x.len()];
                move_tokens(g, total, extra, &mut gx, tokens, 0, tokens, batch, dim);
                self.x.accumulate_grad(Array1::from(gx));
            }
        }
    }

    fn inputs(&self) -> Vec<&Tensor> {
        let mut inputs: Vec<&Tensor> = self.prefix.iter().collect();
        inputs.push(&self.x);
        inputs
    }
}

/// Keep tokens `start..start + len` of every sample
pub fn narrow_tokens(x: &Tensor, start: usize, len: usize) -> Tensor {
    let (batch, tokens, dim) = dims3(x, "narrow_tokens");
    assert!(
        start + len <= tokens,
        "narrow_tokens: range {start}..{} exceeds {tokens} tokens",
        start + len
    );

    let mut out = vec![0.0f32; batch * len * dim];
    move_tokens(x.as_slice(), tokens, start, &mut out, len, 0, len, batch, dim);

    let requires_grad = x.requires_grad();
    let mut result = Tensor::from_shape_vec(&[batch, len, dim], out, requires_grad);

    if requires_grad {
        let backward_op = Rc::new(NarrowBackward {
            x: x.clone(),
            start,
            len,
            result_grad: result.grad_cell(),
        });
        result.set_backward_op(backward_op);
    }

    result
}

struct NarrowBackward {
    x: Tensor,
    start: usize,
    len: usize,
    result_grad: GradCell,
}

impl BackwardOp for NarrowBackward {
    fn backward(&self) {
        if let Some(grad) = self.result_grad.borrow().as_ref() {
            if self.x.requires_grad() {
                let (batch, tokens, dim) = dims3(&self.x, "narrow_tokens");
                let g = grad.as_slice().expect("gradient storage is contiguous");
                let mut gx = vec![0.0f32; self.x.len()];
                move_tokens(g, self.len, 0, &mut gx, tokens, self.start, self.len, batch, dim);
                self.x.accumulate_grad(Array1::from(gx));
            }
        }
    }

    fn inputs(&self) -> Vec<&Tensor> {
        vec![&self.x]
    }
}

/// Insert `front` zero tokens before every sample
pub fn pad_tokens(x: &Tensor, front: usize) -> Tensor {
    let (batch, tokens, dim) = dims3(x, "pad_tokens");
    let total = front + tokens;

    let mut out = vec![0.0f32; batch * total * dim];
    move_tokens(x.as_slice(), tokens, 0, &mut out, total, front, tokens, batch, dim);

    let requires_grad = x.requires_grad();
    let mut result = Tensor::from_shape_vec(&[batch, total, dim], out, requires_grad);

    if requires_grad {
        let backward_op = Rc::new(PadBackward {
            x: x.clone(),
            front,
            result_grad: result.grad_cell(),
        });
        result.set_backward_op(backward_op);
    }

    result
}

struct PadBackward {
    x: Tensor,
    front: usize,
    result_grad: GradCell,
}

impl BackwardOp for PadBackward {
    fn backward(&self) {
        if let Some(grad) = self.result_grad.borrow().as_ref() {
            if self.x.requires_grad() {
                let (batch, tokens, dim) = dims3(&self.x, "pad_tokens");
                let g = grad.as_slice().expect("gradient storage is contiguous");
                let mut gx = vec![0.0f32; self.x.len()];
                move_tokens(
                    g,
                    self.front + tokens,
                    self.front,
                    &mut gx,
                    tokens,
                    0,
                    tokens,
                    batch,
                    dim,
                );
                self.x.accumulate_grad(Array1::from(gx));
            }
        }
    }

    fn inputs(&self) -> Vec<&Tensor> {
        vec![&self.x]
    }
}

fn transpose_last2(src: &[f32], batch: usize, rows: usize, cols: usize) -> Vec<f32> {
    let mut out = vec![0.0f32; src.len()];
    for b in 0..batch {
        let base = b * rows * cols;
        for r in 0..rows {
            for c in 0..cols {
                out[base + c * rows + r] = src[base + r * cols + c];
            }
        }
    }
    out
}

/// Swap the token and channel axes: `(batch, n, d)` to `(batch, d, n)`
pub fn transpose_tokens(x: &Tensor) -> Tensor {
    let (batch, tokens, dim) = dims3(x, "transpose_tokens");
    let out = transpose_last2(x.as_slice(), batch, tokens, dim);

    let requires_grad = x.requires_grad();
    let mut result = Tensor::from_shape_vec(&[batch, dim, tokens], out, requires_grad);

    if requires_grad {
        let backward_op = Rc::new(TransposeBackward {
            x: x.clone(),
            result_grad: result.grad_cell(),
        });
        result.set_backward_op(backward_op);
    }

    result
}

struct TransposeBackward {
    x: Tensor,
    result_grad: GradCell,
}

impl BackwardOp for TransposeBackward {
    fn backward(&self) {
        if let Some(grad) = self.result_grad.borrow().as_ref() {
            if self.x.requires_grad() {
                let (batch, tokens, dim) = dims3(&self.x, "transpose_tokens");
                let g = grad.as_slice().expect("gradient storage is contiguous");
                self.x
                    .accumulate_grad(Array1::from(transpose_last2(g, batch, dim, tokens)));
            }
        }
    }

    fn inputs(&self) -> Vec<&Tensor> {
        vec![&self.x]
    }
}
