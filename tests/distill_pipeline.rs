//! Block replacement, truncation and selective gradients on a small ViT
//!
//! Runs the same sequence a training run does: load weights, replace,
//! truncate, then pick the trainable parameters.

use blockdistill::distill::{
    load_weight_with_cache, replace_blocks, resample_pos_embed, set_trainable, truncate,
};
use blockdistill::io::save_state_dict;
use blockdistill::transformer::{ArchTable, Block, MixerParams, ViTConfig, VisionTransformer};
use blockdistill::{Error, Tensor};
use std::path::Path;

fn small_config(img_size: usize) -> ViTConfig {
    ViTConfig {
        img_size,
        patch_size: 4,
        in_chans: 3,
        embed_dim: 8,
        depth: 4,
        num_heads: 2,
        mlp_ratio: 2,
        num_classes: 5,
        distilled: false,
        drop_rate: 0.0,
        drop_path_rate: 0.0,
    }
}

fn small_table(num_patches: usize) -> ArchTable {
    let mut table = ArchTable::default();
    table.insert(
        "small",
        MixerParams {
            num_patches,
            token_hid_dim: 6,
            channels_dim: 8,
            channels_hid_dim: 16,
        },
    );
    table
}

fn images(batch: usize, side: usize) -> Tensor {
    let n = batch * 3 * side * side;
    let data = (0..n).map(|i| ((i % 17) as f32 - 8.0) / 8.0).collect();
    Tensor::from_shape_vec(&[batch, 3, side, side], data, false)
}

fn save(model: &VisionTransformer, dir: &Path) -> String {
    let path = dir.join("pretrained.safetensors");
    save_state_dict(&path, &model.state_dict(), None).unwrap();
    path.to_string_lossy().into_owned()
}

#[test]
fn test_replaced_block_has_mixer_shapes() {
    let mut model = VisionTransformer::new(small_config(8), 3);
    replace_blocks(&mut model, &[1], &small_table(4), "small").unwrap();

    assert!(matches!(model.blocks[0], Block::Attention(_)));
    assert!(matches!(model.blocks[1], Block::Mixer(_)));
    assert!(matches!(model.blocks[2], Block::Attention(_)));

    let names: Vec<String> = model
        .named_parameters()
        .into_iter()
        .map(|(n, _)| n)
        .filter(|n| n.starts_with("blocks.1."))
        .collect();
    assert!(names.iter().any(|n| n.contains("token_mixing")));
    assert!(names.iter().any(|n| n.contains("channel_mixing")));
    assert!(!names.iter().any(|n| n.contains("attn")));

    let out = model.forward_features(&images(2, 8));
    assert_eq!(out.shape()[0], 2);
}

#[test]
fn test_replacement_rejects_mismatched_patch_count() {
    let mut model = VisionTransformer::new(small_config(8), 3);
    let before = model.state_dict();
    let err = replace_blocks(&mut model, &[0], &small_table(16), "small").unwrap_err();

    assert!(matches!(err, Error::ConfigError(_)));
    assert!(matches!(model.blocks[0], Block::Attention(_)));
    assert_eq!(before.len(), model.state_dict().len());
}

#[test]
fn test_truncated_blocks_become_identity() {
    let mut model = VisionTransformer::new(small_config(8), 3);
    truncate(&mut model, 1).unwrap();

    assert!(matches!(model.blocks[0], Block::Attention(_)));
    assert!(matches!(model.blocks[1], Block::Attention(_)));
    assert!(model.blocks[2..].iter().all(|b| matches!(b, Block::Identity)));
    assert!(model.head.is_none());
    assert!(model.norm.is_none());
    assert_eq!(model.depth(), 4);
}

#[test]
fn test_trainable_only_in_target_blocks() {
    let mut model = VisionTransformer::new(small_config(8), 3);
    replace_blocks(&mut model, &[1], &small_table(4), "small").unwrap();
    truncate(&mut model, 1).unwrap();
    let n = set_trainable(&mut model, &[1], true);

    assert!(n > 0);
    for (name, t) in model.named_parameters() {
        assert_eq!(t.requires_grad(), name.starts_with("blocks.1."), "{name}");
    }
    assert_eq!(n, model.num_trainable_parameters());
}

#[test]
fn test_empty_targets_freeze_everything() {
    let mut model = VisionTransformer::new(small_config(8), 3);
    assert_eq!(set_trainable(&mut model, &[], true), 0);
    assert!(model.named_parameters().iter().all(|(_, t)| !t.requires_grad()));
}

#[test]
fn test_load_then_replace_keeps_pretrained_neighbours() {
    let dir = tempfile::tempdir().unwrap();
    let pretrained = VisionTransformer::new(small_config(8), 11);
    let source = save(&pretrained, dir.path());

    let mut student = VisionTransformer::new(small_config(8), 12);
    let report = load_weight_with_cache(&mut student, &source, dir.path()).unwrap();
    assert!(report.missing.is_empty());
    replace_blocks(&mut student, &[2], &small_table(4), "small").unwrap();

    let expected = pretrained.state_dict();
    for (name, t) in student.named_parameters() {
        if name.starts_with("blocks.2.") {
            continue;
        }
        assert_eq!(t.data(), expected[&name].data(), "{name}");
    }
}

#[test]
fn test_pos_embed_resampled_to_larger_grid() {
    let dir = tempfile::tempdir().unwrap();
    let pretrained = VisionTransformer::new(small_config(8), 11);
    let source = save(&pretrained, dir.path());

    let mut model = VisionTransformer::new(small_config(16), 12);
    load_weight_with_cache(&mut model, &source, dir.path()).unwrap();

    assert_eq!(model.pos_embed.shape(), &[1, 17, 8]);
    assert_eq!(
        &model.pos_embed.as_slice()[..8],
        &pretrained.pos_embed.as_slice()[..8]
    );
}

#[test]
fn test_pos_embed_at_native_grid_is_unchanged() {
    // 1 + 14x14 rows, the DeiT layout at 224px with patch 16
    let data: Vec<f32> = (0..197 * 4).map(|i| (i as f32 * 0.37).sin()).collect();
    let pos = Tensor::from_shape_vec(&[1, 197, 4], data.clone(), false);
    let out = resample_pos_embed(&pos, 1, 196).unwrap();

    assert_eq!(out.shape(), &[1, 197, 4]);
    for (a, b) in out.as_slice().iter().zip(&data) {
        approx::assert_abs_diff_eq!(*a, *b, epsilon = 1e-5);
    }
}
