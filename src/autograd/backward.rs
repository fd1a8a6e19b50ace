//! Backward pass: op trait and reverse topological traversal

use super::Tensor;
use ndarray::Array1;
use std::collections::HashSet;
use std::rc::Rc;

/// A recorded operation that can push its output gradient to its inputs.
///
/// `backward` only computes the local gradient contribution; graph traversal
/// is done once by [`backward`], so a tensor used by several consumers
/// receives the sum of their gradients before its own op runs.
pub trait BackwardOp {
    /// Accumulate gradients into the inputs from the output's grad cell
    fn backward(&self);

    /// Inputs of the operation
    fn inputs(&self) -> Vec<&Tensor>;
}

/// Perform backward pass on a tensor
///
/// `grad_output` defaults to ones (scalar loss).
pub fn backward(tensor: &mut Tensor, grad_output: Option<Array1<f32>>) {
    let seed = grad_output.unwrap_or_else(|| Array1::ones(tensor.len()));
    tensor.set_grad(seed);

    for op in topological_ops(tensor).iter().rev() {
        op.backward();
    }
}

/// Ops reachable from `root`, ordered so every op comes after the ops of its
/// inputs.
fn topological_ops(root: &Tensor) -> Vec<Rc<dyn BackwardOp>> {
    enum Visit {
        Enter(Tensor),
        Exit(Rc<dyn BackwardOp>),
    }

    let mut order = Vec::new();
    let mut seen = HashSet::new();
    let mut stack = vec![Visit::Enter(root.clone())];

    while let Some(visit) = stack.pop() {
        match visit {
            Visit::Enter(t) => {
                if !seen.insert(t.id()) {
                    continue;
                }
                if let Some(op) = t.backward_op() {
                    stack.push(Visit::Exit(Rc::clone(&op)));
                    for input in op.inputs() {
                        if input.backward_op().is_some() && !seen.contains(&input.id()) {
                            stack.push(Visit::Enter(input.clone()));
                        }
                    }
                }
            }
            Visit::Exit(op) => order.push(op),
        }
    }

    order
}
