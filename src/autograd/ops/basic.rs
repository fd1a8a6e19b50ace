//! Basic autograd operations: add, scale, broadcast add, mean, masking

use crate::autograd::{BackwardOp, GradCell, Tensor};
use ndarray::{Array1, Axis};
use std::rc::Rc;

/// Add two tensors of equal length; the result takes `a`'s shape
pub fn add(a: &Tensor, b: &Tensor) -> Tensor {
    assert_eq!(a.len(), b.len(), "add: length mismatch");
    let data = a.data() + b.data();
    let requires_grad = a.requires_grad() || b.requires_grad();

    let mut result = Tensor::new(data, requires_grad).reshape(a.shape());

    if requires_grad {
        let backward_op = Rc::new(AddBackward {
            a: a.clone(),
            b: b.clone(),
            result_grad: result.grad_cell(),
        });
        result.set_backward_op(backward_op);
    }

    result
}

struct AddBackward {
    a: Tensor,
    b: Tensor,
    result_grad: GradCell,
}

impl BackwardOp for AddBackward {
    fn backward(&self) {
        if let Some(grad) = self.result_grad.borrow().as_ref() {
            if self.a.requires_grad() {
                self.a.accumulate_grad(grad.clone());
            }
            if self.b.requires_grad() {
                self.b.accumulate_grad(grad.clone());
            }
        }
    }

    fn inputs(&self) -> Vec<&Tensor> {
        vec![&self.a, &self.b]
    }
}

/// Scale tensor by a scalar
pub fn scale(a: &Tensor, factor: f32) -> Tensor {
    let data = a.data() * factor;
    let requires_grad = a.requires_grad();

    let mut result = Tensor::new(data, requires_grad).reshape(a.shape());

    if requires_grad {
        let backward_op = Rc::new(ScaleBackward {
            a: a.clone(),
            factor,
            result_grad: result.grad_cell(),
        });
        result.set_backward_op(backward_op);
    }

    result
}

struct ScaleBackward {
    a: Tensor,
    factor: f32,
    result_grad: GradCell,
}

impl BackwardOp for ScaleBackward {
    fn backward(&self) {
        if let Some(grad) = self.result_grad.borrow().as_ref() {
            if self.a.requires_grad() {
                // ∂L/∂a = ∂L/∂out * factor
                self.a.accumulate_grad(grad * self.factor);
            }
        }
    }

    fn inputs(&self) -> Vec<&Tensor> {
        vec![&self.a]
    }
}

/// Add `bias` to every consecutive `bias.len()` chunk of `x`
///
/// Used for the positional embedding (one chunk per image) and for linear
/// biases (one chunk per row).
pub fn add_broadcast(x: &Tensor, bias: &Tensor) -> Tensor {
    let width = bias.len();
    assert!(
        width > 0 && x.len() % width == 0,
        "add_broadcast: {} elements not divisible by bias length {width}",
        x.len()
    );
    let repeats = x.len() / width;

    let mut data = x.data().clone();
    {
        let mut view = data
            .view_mut()
            .into_shape_with_order((repeats, width))
            .expect("contiguous buffer reshapes");
        view += bias.data();
    }

    let requires_grad = x.requires_grad() || bias.requires_grad();
    let mut result = Tensor::new(data, requires_grad).reshape(x.shape());

    if requires_grad {
        let backward_op = Rc::new(AddBroadcastBackward {
            x: x.clone(),
            bias: bias.clone(),
            repeats,
            result_grad: result.grad_cell(),
        });
        result.set_backward_op(backward_op);
    }

    result
}

struct AddBroadcastBackward {
    x: Tensor,
    bias: Tensor,
    repeats: usize,
    result_grad: GradCell,
}

impl BackwardOp for AddBroadcastBackward {
    fn backward(&self) {
        if let Some(grad) = self.result_grad.borrow().as_ref() {
            if self.x.requires_grad() {
                self.x.accumulate_grad(grad.clone());
            }
            if self.bias.requires_grad() {
                // ∂L/∂bias = sum over repeated chunks
                let view = grad
                    .view()
                    .into_shape_with_order((self.repeats, self.bias.len()))
                    .expect("contiguous gradient reshapes");
                self.bias.accumulate_grad(view.sum_axis(Axis(0)));
            }
        }
    }

    fn inputs(&self) -> Vec<&Tensor> {
        vec![&self.x, &self.bias]
    }
}

/// Mean of all elements (scalar tensor)
pub fn mean(a: &Tensor) -> Tensor {
    let n = a.len().max(1) as f32;
    let data = Array1::from(vec![a.data().sum() / n]);
    let requires_grad = a.requires_grad();

    let mut result = Tensor::new(data, requires_grad);

    if requires_grad {
        let backward_op = Rc::new(MeanBackward {
            a: a.clone(),
            result_grad: result.grad_cell(),
        });
        result.set_backward_op(backward_op);
    }

    result
}

struct MeanBackward {
    a: Tensor,
    result_grad: GradCell,
}

impl BackwardOp for MeanBackward {
    fn backward(&self) {
        if let Some(grad) = self.result_grad.borrow().as_ref() {
            if self.a.requires_grad() {
                let g = grad[0] / self.a.len().max(1) as f32;
                self.a.accumulate_grad(Array1::from_elem(self.a.len(), g));
            }
        }
    }

    fn inputs(&self) -> Vec<&Tensor> {
        vec![&self.a]
    }
}

/// Multiply elementwise by a constant mask (no gradient flows to the mask)
pub fn mul_mask(a: &Tensor, mask: &Array1<f32>) -> Tensor {
    assert_eq!(a.len(), mask.len(), "mul_mask: length mismatch");
    let data = a.data() * mask;
    let requires_grad = a.requires_grad();

    let mut result = Tensor::new(data, requires_grad).reshape(a.shape());

    if requires_grad {
        let backward_op = Rc::new(MulMaskBackward {
            a: a.clone(),
            mask: mask.clone(),
            result_grad: result.grad_cell(),
        });
        result.set_backward_op(backward_op);
    }

    result
}

struct MulMaskBackward {
    a: Tensor,
    mask: Array1<f32>,
    result_grad: GradCell,
}

impl BackwardOp for MulMaskBackward {
    fn backward(&self) {
        if let Some(grad) = self.result_grad.borrow().as_ref() {
            if self.a.requires_grad() {
                self.a.accumulate_grad(grad * &self.mask);
            }
        }
    }

    fn inputs(&self) -> Vec<&Tensor> {
        vec![&self.a]
    }
}
