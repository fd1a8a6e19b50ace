//! Linear layers: `y = x · Wᵀ + b`

use crate::autograd::{BackwardOp, GradCell, Tensor};
use ndarray::{Array1, ArrayView2, Axis};
use std::rc::Rc;

fn view2(data: &Array1<f32>, rows: usize, cols: usize) -> ArrayView2<'_, f32> {
    data.view()
        .into_shape_with_order((rows, cols))
        .expect("contiguous buffer reshapes")
}

fn flatten(a: ndarray::Array2<f32>) -> Vec<f32> {
    match a.as_slice() {
        Some(slice) => slice.to_vec(),
        None => a.iter().copied().collect(),
    }
}

/// Affine map `y = x · Wᵀ + b` applied to every row of `x`
///
/// - `x`: `(rows, in_features)` flattened, rows inferred from the length
/// - `weight`: `(out_features, in_features)`, the PyTorch layout
/// - `bias`: optional `(out_features)`
///
/// Returns `(rows, out_features)`.
pub fn linear(x: &Tensor, weight: &Tensor, bias: Option<&Tensor>) -> Tensor {
    let (out_features, in_features) = match weight.shape() {
        [o, i] => (*o, *i),
        other => panic!("linear: weight must be 2-D, got {other:?}"),
    };
    assert!(
        x.len() % in_features == 0,
        "linear: input length {} not divisible by in_features {in_features}",
        x.len()
    );
    let rows = x.len() / in_features;

    let xv = view2(x.data(), rows, in_features);
    let wv = view2(weight.data(), out_features, in_features);
    let mut out = xv.dot(&wv.t());
    if let Some(b) = bias {
        assert_eq!(b.len(), out_features, "linear: bias length mismatch");
        out += b.data();
    }

    let requires_grad =
        x.requires_grad() || weight.requires_grad() || bias.is_some_and(|b| b.requires_grad());
    let mut result =
        Tensor::from_shape_vec(&[rows, out_features], flatten(out), requires_grad);

    if requires_grad {
        let backward_op = Rc::new(LinearBackward {
            x: x.clone(),
            weight: weight.clone(),
            bias: bias.cloned(),
            rows,
            in_features,
            out_features,
            result_grad: result.grad_cell(),
        });
        result.set_backward_op(backward_op);
    }

    result
}

struct LinearBackward {
    x: Tensor,
    weight: Tensor,
    bias: Option<Tensor>,
    rows: usize,
    in_features: usize,
    out_features: usize,
    result_grad: GradCell,
}

impl BackwardOp for LinearBackward {
    fn backward(&self) {
        if let Some(grad) = self.result_grad.borrow().as_ref() {
            let gv = view2(grad, self.rows, self.out_features);

            if self.x.requires_grad() {
                // ∂L/∂x = ∂L/∂y · W
                let wv = view2(self.weight.data(), self.out_features, self.in_features);
                self.x.accumulate_grad(Array1::from(flatten(gv.dot(&wv))));
            }
            if self.weight.requires_grad() {
                // ∂L/∂W = (∂L/∂y)ᵀ · x
                let xv = view2(self.x.data(), self.rows, self.in_features);
                self.weight.accumulate_grad(Array1::from(flatten(gv.t().dot(&xv))));
            }
            if let Some(b) = &self.bias {
                if b.requires_grad() {
                    b.accumulate_grad(gv.sum_axis(Axis(0)));
                }
            }
        }
    }

    fn inputs(&self) -> Vec<&Tensor> {
        let mut inputs = vec![&self.x, &self.weight];
        if let Some(b) = &self.bias {
            inputs.push(b);
        }
        inputs
    }
}
