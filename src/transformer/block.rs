//! Transformer block variants
//!
//! A model's blocks live in an indexed `Vec<Block>`. Replacing a block is a
//! single element assignment and truncating sets trailing slots to
//! [`Block::Identity`].

use super::attention::Attention;
use super::dropout::DropPath;
use super::feedforward::Mlp;
use super::init::ParamInit;
use super::mixer::MixerBlock;
use super::norm::{LayerNorm, LAYER_NORM_EPS};
use super::{join, Parameterized};
use crate::autograd::add;
use crate::Tensor;

/// Pre-norm ViT block: attention then MLP, each with a residual
pub struct AttentionBlock {
    /// Norm before attention
    pub norm1: LayerNorm,
    /// Self-attention
    pub attn: Attention,
    /// Norm before the MLP
    pub norm2: LayerNorm,
    /// Feed-forward network
    pub mlp: Mlp,
    /// Stochastic depth on both residual branches
    pub drop_path: DropPath,
}

impl AttentionBlock {
    /// Create new block with initialized weights
    pub fn new(dim: usize, num_heads: usize, mlp_hidden: usize, init: &mut ParamInit) -> Self {
        Self {
            norm1: LayerNorm::new(dim, LAYER_NORM_EPS),
            attn: Attention::new(dim, num_heads, init),
            norm2: LayerNorm::new(dim, LAYER_NORM_EPS),
            mlp: Mlp::new(dim, mlp_hidden, init),
            drop_path: DropPath::disabled(),
        }
    }

    /// Replace the residual drop path
    pub fn with_drop_path(mut self, drop_path: DropPath) -> Self {
        self.drop_path = drop_path;
        self
    }

    /// Forward pass
    ///
    /// x = x + drop_path(attn(norm1(x))); x = x + drop_path(mlp(norm2(x)))
    pub fn forward(&self, x: &Tensor, training: bool) -> Tensor {
        let attn = self.attn.forward(&self.norm1.forward(x));
        let x = add(x, &self.drop_path.forward(&attn, training));
        let mlp = self.mlp.forward(&self.norm2.forward(&x));
        add(&x, &self.drop_path.forward(&mlp, training))
    }
}

impl Parameterized for AttentionBlock {
    fn named_parameters(&self, prefix: &str) -> Vec<(String, &Tensor)> {
        let mut params = self.norm1.named_parameters(&join(prefix, "norm1"));
        params.extend(self.attn.named_parameters(&join(prefix, "attn")));
        params.extend(self.norm2.named_parameters(&join(prefix, "norm2")));
        params.extend(self.mlp.named_parameters(&join(prefix, "mlp")));
        params
    }

    fn named_parameters_mut(&mut self, prefix: &str) -> Vec<(String, &mut Tensor)> {
        let mut params = self.norm1.named_parameters_mut(&join(prefix, "norm1"));
        params.extend(self.attn.named_parameters_mut(&join(prefix, "attn")));
        params.extend(self.norm2.named_parameters_mut(&join(prefix, "norm2")));
        params.extend(self.mlp.named_parameters_mut(&join(prefix, "mlp")));
        params
    }
}

/// One slot of a model's block sequence
pub enum Block {
    /// Original self-attention block
    Attention(AttentionBlock),
    /// Replacement MLP-Mixer block
    Mixer(MixerBlock),
    /// No-op pass-through left by truncation
    Identity,
}

impl Block {
    /// Forward pass; `Identity` returns its input unchanged
    ///
    /// `training` only affects the drop path of attention blocks.
    pub fn forward(&self, x: &Tensor, training: bool) -> Tensor {
        match self {
            Block::Attention(b) => b.forward(x, training),
            Block::Mixer(b) => b.forward(x),
            Block::Identity => x.clone(),
        }
    }

    /// Short variant name, for logs
    pub fn kind(&self) -> &'static str {
        match self {
            Block::Attention(_) => "attention",
            Block::Mixer(_) => "mixer",
            Block::Identity => "identity",
        }
    }

    /// The Mixer block in this slot, if any
    pub fn as_mixer(&self) -> Option<&MixerBlock> {
        match self {
            Block::Mixer(b) => Some(b),
            _ => None,
        }
    }

    /// Whether this slot is a no-op
    pub fn is_identity(&self) -> bool {
        matches!(self, Block::Identity)
    }
}

impl Parameterized for Block {
    fn named_parameters(&self, prefix: &str) -> Vec<(String, &Tensor)> {
        match self {
            Block::Attention(b) => b.named_parameters(prefix),
            Block::Mixer(b) => b.named_parameters(prefix),
            Block::Identity => Vec::new(),
        }
    }

    fn named_parameters_mut(&mut self, prefix: &str) -> Vec<(String, &mut Tensor)> {
        match self {
            Block::Attention(b) => b.named_parameters_mut(prefix),
            Block::Mixer(b) => b.named_parameters_mut(prefix),
            Block::Identity => Vec::new(),
        }
    }
}
