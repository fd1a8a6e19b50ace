//! Small models for unit tests

use super::config::ViTConfig;
use crate::Tensor;

/// Three-block, 8px ViT with 4 patches of width 8
pub(crate) fn tiny_config() -> ViTConfig {
    ViTConfig {
        img_size: 8,
        patch_size: 4,
        in_chans: 3,
        embed_dim: 8,
        depth: 3,
        num_heads: 2,
        mlp_ratio: 2,
        num_classes: 5,
        distilled: false,
        drop_rate: 0.0,
        drop_path_rate: 0.0,
    }
}

/// Deterministic `(batch, 3, 8, 8)` input
pub(crate) fn tiny_images(batch: usize) -> Tensor {
    let n = batch * 3 * 8 * 8;
    Tensor::from_shape_vec(
        &[batch, 3, 8, 8],
        (0..n).map(|v| (v as f32 * 0.013).sin()).collect(),
        false,
    )
}
