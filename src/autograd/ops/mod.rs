//! Autograd operations with backward passes
//!
//! This module provides differentiable operations for automatic differentiation.

mod activations;
mod attention;
mod basic;
mod linear;
mod normalize;
mod tokens;

// Re-export all public operations
pub use activations::gelu;
pub use attention::{multi_head_attention, AttentionShape};
pub use basic::{add, add_broadcast, mean, mul_mask, scale};
pub use linear::linear;
pub use normalize::layer_norm;
pub use tokens::{narrow_tokens, pad_tokens, prepend_tokens, transpose_tokens};
