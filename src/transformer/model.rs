//! Vision transformer model
//!
//! Structure and parameter names follow timm's `VisionTransformer`, so
//! state dicts exported from timm load by name.

use super::block::{AttentionBlock, Block};
use super::dropout::{drop_path_rates, DropPath, Dropout};
use super::config::ViTConfig;
use super::embedding::PatchEmbed;
use super::init::{ParamInit, INIT_STD};
use super::linear::Linear;
use super::norm::{LayerNorm, LAYER_NORM_EPS};
use super::Parameterized;
use crate::autograd::{add_broadcast, narrow_tokens, prepend_tokens, scale};
use crate::io::StateDict;
use crate::{Result, Tensor};

/// Which part of the model a parameter belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ParamOwner {
    /// Patch embedding, class/distillation tokens, positional embedding
    Stem,
    /// Block at this index
    Block(usize),
    /// Final norms and classifier heads
    Head,
}

/// Options applied on top of a registered configuration
#[derive(Debug, Clone, PartialEq)]
pub struct ModelOptions {
    /// Classifier outputs
    pub num_classes: usize,
    /// Input side override (positional embedding follows it)
    pub img_size: Option<usize>,
    /// Dropout before the classifier
    pub drop_rate: f32,
    /// Stochastic depth rate of the last block
    pub drop_path_rate: f32,
    /// Initialization seed
    pub seed: u64,
}

impl Default for ModelOptions {
    fn default() -> Self {
        Self {
            num_classes: 1000,
            img_size: None,
            drop_rate: 0.0,
            drop_path_rate: 0.0,
            seed: 0,
        }
    }
}

/// Build a registered model
///
/// Two calls with the same name and options produce identical, independent
/// models.
pub fn create_model(name: &str, options: &ModelOptions) -> Result<VisionTransformer> {
    let mut config = ViTConfig::from_name(name)?;
    config.num_classes = options.num_classes;
    config.drop_rate = options.drop_rate;
    config.drop_path_rate = options.drop_path_rate;
    if let Some(img_size) = options.img_size {
        config.img_size = img_size;
    }
    config.validate()?;
    tracing::debug!(
        model = name,
        img_size = config.img_size,
        num_classes = config.num_classes,
        "creating model"
    );
    Ok(VisionTransformer::new(config, options.seed))
}

/// ViT / DeiT classifier
pub struct VisionTransformer {
    config: ViTConfig,
    seed: u64,
    training: bool,
    /// Patch embedding
    pub patch_embed: PatchEmbed,
    /// Class token (1 x 1 x dim)
    pub cls_token: Tensor,
    /// Distillation token, distilled variants only
    pub dist_token: Option<Tensor>,
    /// Positional embedding (1 x seq_len x dim)
    pub pos_embed: Tensor,
    /// Block sequence
    pub blocks: Vec<Block>,
    /// Final norm; `None` is identity
    pub norm: Option<LayerNorm>,
    /// Norm after pooling; `None` is identity
    pub fc_norm: Option<LayerNorm>,
    /// Dropout before the classifier; `None` is identity
    pub head_drop: Option<Dropout>,
    /// Classifier; `None` is identity
    pub head: Option<Linear>,
    /// Distillation classifier; `None` is identity
    pub head_dist: Option<Linear>,
}

impl VisionTransformer {
    /// Create a model with seeded initialization
    pub fn new(config: ViTConfig, seed: u64) -> Self {
        let mut init = ParamInit::new(seed);
        let dim = config.embed_dim;

        let patch_embed =
            PatchEmbed::new(config.img_size, config.patch_size, config.in_chans, dim, &mut init);
        let cls_token = init.trunc_normal(&[1, 1, dim], INIT_STD);
        let dist_token = config
            .distilled
            .then(|| init.trunc_normal(&[1, 1, dim], INIT_STD));
        let pos_embed = init.trunc_normal(&[1, config.seq_len(), dim], INIT_STD);
        let blocks = drop_path_rates(config.drop_path_rate, config.depth)
            .into_iter()
            .enumerate()
            .map(|(i, rate)| {
                let drop_path = DropPath::new(rate, seed ^ (0xD20B_0000 + i as u64));
                let block =
                    AttentionBlock::new(dim, config.num_heads, dim * config.mlp_ratio, &mut init);
                Block::Attention(block.with_drop_path(drop_path))
            })
            .collect();
        let head = Linear::new(dim, config.num_classes, &mut init);
        let head_dist = config
            .distilled
            .then(|| Linear::new(dim, config.num_classes, &mut init));

        Self {
            seed,
            training: false,
            patch_embed,
            cls_token,
            dist_token,
            pos_embed,
            blocks,
            norm: Some(LayerNorm::new(dim, LAYER_NORM_EPS)),
            fc_norm: None,
            head_drop: Some(Dropout::new(config.drop_rate, seed ^ 0x5EED)),
            head: Some(head),
            head_dist,
            config,
        }
    }

    /// Configuration
    pub fn config(&self) -> &ViTConfig {
        &self.config
    }

    /// Initialization seed
    pub fn seed(&self) -> u64 {
        self.seed
    }

    /// Number of block slots
    pub fn depth(&self) -> usize {
        self.blocks.len()
    }

    /// Embedding width
    pub fn embed_dim(&self) -> usize {
        self.config.embed_dim
    }

    /// Patch tokens per image
    pub fn num_patches(&self) -> usize {
        self.patch_embed.num_patches()
    }

    /// Whether dropout and drop path are active
    pub fn is_training(&self) -> bool {
        self.training
    }

    /// Switch between training and evaluation behaviour
    pub fn set_training(&mut self, training: bool) {
        self.training = training;
    }

    /// Token sequence after the last block (and final norm, if present)
    ///
    /// `images`: `(batch, in_chans, img_size, img_size)`.
    /// Returns `(batch, seq_len, embed_dim)`.
    pub fn forward_features(&self, images: &Tensor) -> Tensor {
        let x = self.patch_embed.forward(images);
        let mut prefix = vec![&self.cls_token];
        if let Some(dist) = &self.dist_token {
            prefix.push(dist);
        }
        let x = prepend_tokens(&x, &prefix);
        let mut x = add_broadcast(&x, &self.pos_embed);

        for block in &self.blocks {
            x = block.forward(&x, self.training);
        }
        match &self.norm {
            Some(norm) => norm.forward(&x),
            None => x,
        }
    }

    fn classify(&self, x: &Tensor, head: Option<&Linear>) -> Tensor {
        let x = match &self.fc_norm {
            Some(norm) => norm.forward(x),
            None => x.clone(),
        };
        let x = match &self.head_drop {
            Some(drop) => drop.forward(&x, self.training),
            None => x,
        };
        match head {
            Some(head) => head.forward(&x),
            None => x,
        }
    }

    /// Logits `(batch, num_classes)`
    ///
    /// Pools the class token. Distilled models average the class-token and
    /// distillation-token heads. With the head removed the pooled token
    /// itself is returned.
    pub fn forward(&self, images: &Tensor) -> Tensor {
        let features = self.forward_features(images);
        let batch = features.shape()[0];
        let dim = self.embed_dim();

        let cls = narrow_tokens(&features, 0, 1).reshape(&[batch, dim]);
        let logits = self.classify(&cls, self.head.as_ref());

        match (&self.dist_token, &self.head_dist) {
            (Some(_), Some(head_dist)) => {
                let dist = narrow_tokens(&features, 1, 1).reshape(&[batch, dim]);
                let dist_logits = self.classify(&dist, Some(head_dist));
                scale(&crate::autograd::add(&logits, &dist_logits), 0.5)
            }
            _ => logits,
        }
    }

    /// Every parameter with its owner and full name
    pub fn parameters_by_owner_mut(&mut self) -> Vec<(ParamOwner, String, &mut Tensor)> {
        let mut params: Vec<(ParamOwner, String, &mut Tensor)> = Vec::new();
        // Disjoint field borrows so stem, blocks and head can coexist
        let Self {
            patch_embed,
            cls_token,
            dist_token,
            pos_embed,
            blocks,
            norm,
            fc_norm,
            head,
            head_dist,
            ..
        } = self;

        for (name, t) in patch_embed.named_parameters_mut("patch_embed") {
            params.push((ParamOwner::Stem, name, t));
        }
        params.push((ParamOwner::Stem, "cls_token".into(), cls_token));
        if let Some(dist) = dist_token {
            params.push((ParamOwner::Stem, "dist_token".into(), dist));
        }
        params.push((ParamOwner::Stem, "pos_embed".into(), pos_embed));

        for (i, block) in blocks.iter_mut().enumerate() {
            for (name, t) in block.named_parameters_mut(&format!("blocks.{i}")) {
                params.push((ParamOwner::Block(i), name, t));
            }
        }

        let head_layers = [
            norm.as_mut().map(|n| n.named_parameters_mut("norm")),
            fc_norm.as_mut().map(|n| n.named_parameters_mut("fc_norm")),
            head.as_mut().map(|h| h.named_parameters_mut("head")),
            head_dist.as_mut().map(|h| h.named_parameters_mut("head_dist")),
        ];
        for (name, t) in head_layers.into_iter().flatten().flatten() {
            params.push((ParamOwner::Head, name, t));
        }
        params
    }

    /// Every parameter with its full name, in registration order
    pub fn named_parameters(&self) -> Vec<(String, &Tensor)> {
        let mut params = self.patch_embed.named_parameters("patch_embed");
        params.push(("cls_token".to_string(), &self.cls_token));
        if let Some(dist) = &self.dist_token {
            params.push(("dist_token".to_string(), dist));
        }
        params.push(("pos_embed".to_string(), &self.pos_embed));
        for (i, block) in self.blocks.iter().enumerate() {
            params.extend(block.named_parameters(&format!("blocks.{i}")));
        }
        if let Some(norm) = &self.norm {
            params.extend(norm.named_parameters("norm"));
        }
        if let Some(norm) = &self.fc_norm {
            params.extend(norm.named_parameters("fc_norm"));
        }
        if let Some(head) = &self.head {
            params.extend(head.named_parameters("head"));
        }
        if let Some(head) = &self.head_dist {
            params.extend(head.named_parameters("head_dist"));
        }
        params
    }

    /// Every parameter with its full name, mutable
    pub fn named_parameters_mut(&mut self) -> Vec<(String, &mut Tensor)> {
        self.parameters_by_owner_mut()
            .into_iter()
            .map(|(_, name, t)| (name, t))
            .collect()
    }

    /// Parameters with gradient tracking enabled
    pub fn trainable_parameters_mut(&mut self) -> Vec<&mut Tensor> {
        self.parameters_by_owner_mut()
            .into_iter()
            .filter(|(_, _, t)| t.requires_grad())
            .map(|(_, _, t)| t)
            .collect()
    }

    /// Total scalar parameter count
    pub fn num_parameters(&self) -> usize {
        self.named_parameters().iter().map(|(_, t)| t.len()).sum()
    }

    /// Scalar count of parameters with gradient tracking enabled
    pub fn num_trainable_parameters(&self) -> usize {
        self.named_parameters()
            .iter()
            .filter(|(_, t)| t.requires_grad())
            .map(|(_, t)| t.len())
            .sum()
    }

    /// Detached copy of every parameter
    pub fn state_dict(&self) -> StateDict {
        self.named_parameters()
            .into_iter()
            .map(|(name, t)| (name, t.detach()))
            .collect()
    }

    /// Clear all parameter gradients
    pub fn zero_grad(&self) {
        for (_, t) in self.named_parameters() {
            t.zero_grad();
        }
    }
}
