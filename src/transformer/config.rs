//! Vision transformer configuration and the model name registry

use crate::{Error, Result};
use serde::{Deserialize, Serialize};

/// Names accepted by [`ViTConfig::from_name`]
const REGISTERED_MODELS: &[&str] = &[
    "deit_tiny_patch16_224",
    "deit_small_patch16_224",
    "deit_base_patch16_224",
    "deit_tiny_distilled_patch16_224",
    "deit_small_distilled_patch16_224",
    "deit_base_distilled_patch16_224",
    "deit_base_patch16_384",
];

/// Registered model names
pub fn registered_models() -> &'static [&'static str] {
    REGISTERED_MODELS
}

/// Configuration for ViT/DeiT models
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ViTConfig {
    /// Input image side in pixels
    pub img_size: usize,
    /// Patch side in pixels
    pub patch_size: usize,
    /// Input channels
    pub in_chans: usize,
    /// Embedding width
    pub embed_dim: usize,
    /// Number of blocks
    pub depth: usize,
    /// Attention heads per block
    pub num_heads: usize,
    /// MLP hidden width as a multiple of `embed_dim`
    pub mlp_ratio: usize,
    /// Classifier outputs
    pub num_classes: usize,
    /// Adds a distillation token and head
    pub distilled: bool,
    /// Dropout before the classifier
    pub drop_rate: f32,
    /// Stochastic depth rate of the last block; earlier blocks scale linearly
    #[serde(default)]
    pub drop_path_rate: f32,
}

impl ViTConfig {
    fn deit(embed_dim: usize, num_heads: usize, img_size: usize, distilled: bool) -> Self {
        Self {
            img_size,
            patch_size: 16,
            in_chans: 3,
            embed_dim,
            depth: 12,
            num_heads,
            mlp_ratio: 4,
            num_classes: 1000,
            distilled,
            drop_rate: 0.0,
            drop_path_rate: 0.0,
        }
    }

    /// DeiT-Ti/16 at 224px
    pub fn deit_tiny() -> Self {
        Self::deit(192, 3, 224, false)
    }

    /// DeiT-S/16 at 224px
    pub fn deit_small() -> Self {
        Self::deit(384, 6, 224, false)
    }

    /// DeiT-B/16 at 224px
    pub fn deit_base() -> Self {
        Self::deit(768, 12, 224, false)
    }

    /// Look up a registered model name
    pub fn from_name(name: &str) -> Result<Self> {
        let config = match name {
            "deit_tiny_patch16_224" => Self::deit_tiny(),
            "deit_small_patch16_224" => Self::deit_small(),
            "deit_base_patch16_224" => Self::deit_base(),
            "deit_tiny_distilled_patch16_224" => Self::deit(192, 3, 224, true),
            "deit_small_distilled_patch16_224" => Self::deit(384, 6, 224, true),
            "deit_base_distilled_patch16_224" => Self::deit(768, 12, 224, true),
            "deit_base_patch16_384" => Self::deit(768, 12, 384, false),
            other => {
                return Err(Error::ConfigError(format!(
                    "unknown model '{other}' (known: {})",
                    REGISTERED_MODELS.join(", ")
                )))
            }
        };
        Ok(config)
    }

    /// Patches per side
    pub fn grid_size(&self) -> usize {
        self.img_size / self.patch_size
    }

    /// Patch tokens per image
    pub fn num_patches(&self) -> usize {
        self.grid_size() * self.grid_size()
    }

    /// Class token plus optional distillation token
    pub fn num_prefix_tokens(&self) -> usize {
        1 + usize::from(self.distilled)
    }

    /// Tokens per image entering the blocks
    pub fn seq_len(&self) -> usize {
        self.num_prefix_tokens() + self.num_patches()
    }

    /// Per-head width
    pub fn head_dim(&self) -> usize {
        self.embed_dim / self.num_heads
    }

    /// Check internal consistency
    pub fn validate(&self) -> Result<()> {
        if self.patch_size == 0 || self.img_size % self.patch_size != 0 {
            return Err(Error::ConfigError(format!(
                "input size {} is not a multiple of patch size {}",
                self.img_size, self.patch_size
            )));
        }
        if self.num_heads == 0 || self.embed_dim % self.num_heads != 0 {
            return Err(Error::ConfigError(format!(
                "embed_dim {} is not divisible by {} heads",
                self.embed_dim, self.num_heads
            )));
        }
        if !(0.0..1.0).contains(&self.drop_rate) {
            return Err(Error::InvalidParameter(format!(
                "drop rate {} outside [0, 1)",
                self.drop_rate
            )));
        }
        if !(0.0..1.0).contains(&self.drop_path_rate) {
            return Err(Error::InvalidParameter(format!(
                "drop path rate {} outside [0, 1)",
                self.drop_path_rate
            )));
        }
        Ok(())
    }
}
