//! Vision transformer layers with automatic differentiation support
//!
//! ## Architecture Components
//!
//! - `PatchEmbed`: image to patch tokens
//! - `Attention`, `Mlp`, `LayerNorm`: building blocks of an `AttentionBlock`
//! - `MixerBlock`: token-mixing / channel-mixing replacement block
//! - `Block`: one slot of the block sequence (attention, mixer or identity)
//! - `VisionTransformer`: the full classifier, built by `create_model`
//!
//! Parameters carry timm's dotted names (`blocks.3.attn.qkv.weight`) so
//! checkpoints exported from timm load by name.

mod attention;
mod block;
mod config;
mod dropout;
mod embedding;
mod feedforward;
mod init;
mod linear;
mod mixer;
mod model;
mod norm;
#[cfg(test)]
pub(crate) mod testing;

pub use attention::Attention;
pub use block::{AttentionBlock, Block};
pub use config::{registered_models, ViTConfig};
pub use embedding::PatchEmbed;
pub use feedforward::Mlp;
pub use init::{ParamInit, INIT_STD};
pub use linear::Linear;
pub use mixer::{ArchTable, MixerBlock, MixerParams};
pub use dropout::{drop_path_rates, DropPath, Dropout};
pub use model::{create_model, ModelOptions, ParamOwner, VisionTransformer};
pub use norm::{LayerNorm, LAYER_NORM_EPS};

use crate::Tensor;

/// A layer that owns named parameters
pub trait Parameterized {
    /// Parameters with their dotted names under `prefix`
    fn named_parameters(&self, prefix: &str) -> Vec<(String, &Tensor)>;

    /// Mutable parameters with their dotted names under `prefix`
    fn named_parameters_mut(&mut self, prefix: &str) -> Vec<(String, &mut Tensor)>;

    /// Mutable parameters without names
    fn parameters_mut(&mut self) -> Vec<&mut Tensor> {
        self.named_parameters_mut("")
            .into_iter()
            .map(|(_, t)| t)
            .collect()
    }
}

/// Dotted name join that tolerates an empty prefix
pub(crate) fn join(prefix: &str, name: &str) -> String {
    if prefix.is_empty() {
        name.to_string()
    } else {
        format!("{prefix}.{name}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_join() {
        assert_eq!(join("", "weight"), "weight");
        assert_eq!(join("blocks.1.mlp", "fc1"), "blocks.1.mlp.fc1");
    }
}
