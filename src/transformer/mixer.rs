//! MLP-Mixer block and its architecture parameter table
//!
//! A Mixer block replaces self-attention with an MLP across the patch axis
//! (token mixing) followed by an MLP across channels (channel mixing). It
//! consumes and produces the same `(batch, tokens, dim)` sequence as an
//! attention block, so it can be dropped into any slot of a ViT.

use super::feedforward::Mlp;
use super::init::ParamInit;
use super::norm::{LayerNorm, LAYER_NORM_EPS};
use super::{join, Parameterized};
use crate::autograd::{add, narrow_tokens, pad_tokens, transpose_tokens};
use crate::{Error, Result, Tensor};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Hyperparameters of a Mixer block
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MixerParams {
    /// Patch tokens mixed by the token MLP
    pub num_patches: usize,
    /// Hidden width of the token MLP
    pub token_hid_dim: usize,
    /// Channel width (must equal the host model's embedding width)
    pub channels_dim: usize,
    /// Hidden width of the channel MLP
    pub channels_hid_dim: usize,
}

/// Model name to Mixer hyperparameters
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ArchTable {
    entries: BTreeMap<String, MixerParams>,
}

impl ArchTable {
    /// Table with an entry for every registered DeiT model
    pub fn builtin() -> Self {
        let p224 = |dim: usize| MixerParams {
            num_patches: 196,
            token_hid_dim: 384,
            channels_dim: dim,
            channels_hid_dim: 4 * dim,
        };
        let mut table = Self::default();
        for (name, params) in [
            ("deit_tiny_patch16_224", p224(192)),
            ("deit_small_patch16_224", p224(384)),
            ("deit_base_patch16_224", p224(768)),
            ("deit_tiny_distilled_patch16_224", p224(192)),
            ("deit_small_distilled_patch16_224", p224(384)),
            ("deit_base_distilled_patch16_224", p224(768)),
            (
                "deit_base_patch16_384",
                MixerParams {
                    num_patches: 576,
                    token_hid_dim: 384,
                    channels_dim: 768,
                    channels_hid_dim: 3072,
                },
            ),
        ] {
            table.insert(name, params);
        }
        table
    }

    /// Add or overwrite an entry
    pub fn insert(&mut self, name: impl Into<String>, params: MixerParams) {
        self.entries.insert(name.into(), params);
    }

    /// Merge entries from another table; `other` wins on conflicts
    pub fn extend(&mut self, other: &ArchTable) {
        self.entries
            .extend(other.entries.iter().map(|(k, v)| (k.clone(), *v)));
    }

    /// Look up a model name
    pub fn get(&self, name: &str) -> Result<MixerParams> {
        self.entries.get(name).copied().ok_or_else(|| {
            Error::ConfigError(format!(
                "no mixer parameters for model '{name}' (known: {})",
                self.entries.keys().cloned().collect::<Vec<_>>().join(", ")
            ))
        })
    }

    /// Registered names
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }
}

/// Token-mixing then channel-mixing block with pre-norm residuals
pub struct MixerBlock {
    params: MixerParams,
    /// Norm before token mixing
    pub norm1: LayerNorm,
    /// MLP across patches (num_patches -> token_hid_dim -> num_patches)
    pub token_mixing: Mlp,
    /// Norm before channel mixing
    pub norm2: LayerNorm,
    /// MLP across channels (channels_dim -> channels_hid_dim -> channels_dim)
    pub channel_mixing: Mlp,
}

impl MixerBlock {
    /// Create a freshly initialized block
    pub fn new(params: MixerParams, init: &mut ParamInit) -> Self {
        Self {
            params,
            norm1: LayerNorm::new(params.channels_dim, LAYER_NORM_EPS),
            token_mixing: Mlp::new(params.num_patches, params.token_hid_dim, init),
            norm2: LayerNorm::new(params.channels_dim, LAYER_NORM_EPS),
            channel_mixing: Mlp::new(params.channels_dim, params.channels_hid_dim, init),
        }
    }

    /// Hyperparameters this block was built with
    pub fn params(&self) -> MixerParams {
        self.params
    }

    /// Forward pass over `(batch, extra + num_patches, channels_dim)`
    ///
    /// Leading extra tokens (class, distillation) bypass token mixing and
    /// only go through channel mixing.
    pub fn forward(&self, x: &Tensor) -> Tensor {
        let tokens = x.shape()[1];
        let extra = tokens
            .checked_sub(self.params.num_patches)
            .unwrap_or_else(|| {
                panic!(
                    "mixer: {tokens} tokens but block mixes {} patches",
                    self.params.num_patches
                )
            });

        let y = self.norm1.forward(x);
        let patches = narrow_tokens(&y, extra, self.params.num_patches);
        let mixed = transpose_tokens(&self.token_mixing.forward(&transpose_tokens(&patches)));
        let mixed = if extra > 0 { pad_tokens(&mixed, extra) } else { mixed };
        let x = add(x, &mixed);

        let y = self.channel_mixing.forward(&self.norm2.forward(&x));
        add(&x, &y)
    }
}

impl Parameterized for MixerBlock {
    fn named_parameters(&self, prefix: &str) -> Vec<(String, &Tensor)> {
        let mut params = self.norm1.named_parameters(&join(prefix, "norm1"));
        params.extend(self.token_mixing.named_parameters(&join(prefix, "token_mixing")));
        params.extend(self.norm2.named_parameters(&join(prefix, "norm2")));
        params.extend(self.channel_mixing.named_parameters(&join(prefix, "channel_mixing")));
        params
    }

    fn named_parameters_mut(&mut self, prefix: &str) -> Vec<(String, &mut Tensor)> {
        let mut params = self.norm1.named_parameters_mut(&join(prefix, "norm1"));
        params.extend(
            self.token_mixing
                .named_parameters_mut(&join(prefix, "token_mixing")),
        );
        params.extend(self.norm2.named_parameters_mut(&join(prefix, "norm2")));
        params.extend(
            self.channel_mixing
                .named_parameters_mut(&join(prefix, "channel_mixing")),
        );
        params
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::autograd::backward;

    fn small() -> MixerParams {
        MixerParams {
            num_patches: 4,
            token_hid_dim: 6,
            channels_dim: 8,
            channels_hid_dim: 16,
        }
    }

    #[test]
    fn test_builtin_table_covers_registry() {
        let table = ArchTable::builtin();
        for name in crate::transformer::registered_models() {
            assert!(table.get(name).is_ok(), "missing {name}");
        }
        assert_eq!(table.get("deit_small_patch16_224").unwrap().channels_dim, 384);
    }

    #[test]
    fn test_unknown_name_is_config_error() {
        let err = ArchTable::builtin().get("resnet50").unwrap_err();
        assert!(matches!(err, Error::ConfigError(_)));
    }

    #[test]
    fn test_forward_keeps_shape_with_class_token() {
        let block = MixerBlock::new(small(), &mut ParamInit::new(0));
        let x = Tensor::from_shape_vec(&[2, 5, 8], vec![0.3; 80], false);
        assert_eq!(block.forward(&x).shape(), &[2, 5, 8]);
    }

    #[test]
    fn test_class_token_skips_token_mixing() {
        // Zeroing channel mixing leaves only the token branch; the class token
        // row must then come through unchanged.
        let mut block = MixerBlock::new(small(), &mut ParamInit::new(1));
        for p in block.channel_mixing.parameters_mut() {
            p.data_mut().fill(0.0);
        }
        let data: Vec<f32> = (0..40).map(|v| (v as f32 * 0.37).sin()).collect();
        let x = Tensor::from_shape_vec(&[1, 5, 8], data.clone(), false);
        let y = block.forward(&x);
        assert_eq!(&y.as_slice()[..8], &data[..8]);
        assert_ne!(&y.as_slice()[8..], &data[8..]);
    }

    #[test]
    fn test_all_parameters_receive_gradients() {
        let block = MixerBlock::new(small(), &mut ParamInit::new(2));
        let data: Vec<f32> = (0..32).map(|v| (v as f32 * 0.11).cos()).collect();
        let x = Tensor::from_shape_vec(&[1, 4, 8], data, false);
        let mut y = block.forward(&x);
        let ramp = ndarray::Array1::from_iter((0..y.len()).map(|i| 1.0 + i as f32 * 0.01));
        backward(&mut y, Some(ramp));

        for (name, p) in block.named_parameters("") {
            assert!(p.grad().is_some(), "{name} has no gradient");
        }
    }
}
