//! Tape-based autograd engine
//!
//! Every differentiable op records a [`BackwardOp`] on its output. [`backward`]
//! walks the recorded graph once in reverse topological order, so tensors
//! shared by several consumers (residual streams, reused weights) receive the
//! sum of all their gradient contributions.

mod backward;
mod ops;
pub mod precision;
mod tensor;

#[cfg(test)]
mod tests;

pub use backward::{backward, BackwardOp};
pub use ops::*;
pub use precision::GradScaler;
pub use tensor::{GradCell, Tensor};
