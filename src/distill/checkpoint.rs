//! Pretrained weight loading and student checkpoint saving
//!
//! Loading is forgiving: classifier heads of the wrong size are dropped, the
//! positional embedding is resampled to the model's patch grid, and every
//! other key is copied only when name and shape both match.

use super::interpolate::resize_bicubic;
use crate::io::{default_cache_dir, load_state_dict, resolve_source, save_state_dict, StateDict};
use crate::transformer::VisionTransformer;
use crate::{Error, Result, Tensor};
use ndarray::{s, ArrayView3, Axis};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};
use std::path::{Path, PathBuf};

/// Classifier keys that are dropped when their shape does not fit the model
const HEAD_KEYS: [&str; 4] = ["head.weight", "head.bias", "head_dist.weight", "head_dist.bias"];

/// Prefix left by checkpoints that nest the weights under a `model` entry
const NESTED_PREFIX: &str = "model.";

/// Outcome of a partial load
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LoadReport {
    /// Model parameters the checkpoint did not provide
    pub missing: Vec<String>,
    /// Checkpoint keys the model does not have
    pub unexpected: Vec<String>,
    /// Keys present in both with different shapes (left untouched)
    pub mismatched: Vec<String>,
    /// Keys copied into the model
    pub loaded: usize,
}

/// Load pretrained weights into `model`, caching remote files in the
/// default cache directory
pub fn load_weight(model: &mut VisionTransformer, source: &str) -> Result<LoadReport> {
    load_weight_with_cache(model, source, &default_cache_dir())
}

/// Load pretrained weights into `model`
///
/// `source` is a local SafeTensors path or an `http(s)://` URL.
pub fn load_weight_with_cache(
    model: &mut VisionTransformer,
    source: &str,
    cache_dir: &Path,
) -> Result<LoadReport> {
    let path = resolve_source(source, cache_dir)?;
    let checkpoint = load_state_dict(&path)?;
    tracing::info!(
        source,
        tensors = checkpoint.tensors.len(),
        "loaded pretrained checkpoint"
    );

    let mut state = strip_nested_prefix(checkpoint.tensors);
    drop_mismatched_heads(&mut state, model);

    let pos_embed = state.get("pos_embed").ok_or_else(|| {
        Error::Serialization(format!("checkpoint {source} has no 'pos_embed'"))
    })?;
    let extra = model.config().num_prefix_tokens();
    let resampled = resample_pos_embed(pos_embed, extra, model.num_patches())?;
    state.insert("pos_embed".to_string(), resampled);

    let report = load_partial(model, &state);
    tracing::debug!(
        missing = ?report.missing,
        unexpected = ?report.unexpected,
        mismatched = ?report.mismatched,
        "partial load"
    );
    Ok(report)
}

/// Remove a `model.` prefix shared by every key
fn strip_nested_prefix(state: StateDict) -> StateDict {
    if state.is_empty() || !state.keys().all(|k| k.starts_with(NESTED_PREFIX)) {
        return state;
    }
    state
        .into_iter()
        .map(|(k, v)| (k[NESTED_PREFIX.len()..].to_string(), v))
        .collect()
}

fn drop_mismatched_heads(state: &mut StateDict, model: &VisionTransformer) {
    let model_shapes: HashMap<String, Vec<usize>> = model
        .named_parameters()
        .into_iter()
        .map(|(name, t)| (name, t.shape().to_vec()))
        .collect();

    for key in HEAD_KEYS {
        let fits = match (state.get(key), model_shapes.get(key)) {
            (Some(t), Some(shape)) => t.shape() == shape.as_slice(),
            (Some(_), None) => false,
            (None, _) => true,
        };
        if !fits {
            tracing::info!("Removing key {key} from pretrained checkpoint");
            state.remove(key);
        }
    }
}

/// Resample the grid part of a positional embedding to `num_patches` tokens
///
/// The first `extra` rows (class and distillation tokens) are copied as is.
/// The remaining rows must form a square grid; they are bicubically
/// resized to the model's square grid.
pub fn resample_pos_embed(pos_embed: &Tensor, extra: usize, num_patches: usize) -> Result<Tensor> {
    let dim = pos_embed.shape().last().copied().unwrap_or(0);
    if dim == 0 || pos_embed.len() % dim != 0 {
        return Err(Error::ShapeMismatch {
            expected: vec![1, extra + num_patches, dim],
            actual: pos_embed.shape().to_vec(),
        });
    }
    let rows = pos_embed.len() / dim;
    let grid_rows = rows.checked_sub(extra).ok_or_else(|| {
        Error::Serialization(format!(
            "pos_embed has {rows} rows, fewer than {extra} extra tokens"
        ))
    })?;

    let orig_side = integer_sqrt(grid_rows);
    let new_side = integer_sqrt(num_patches);
    if orig_side * orig_side != grid_rows {
        return Err(Error::Serialization(format!(
            "pos_embed grid of {grid_rows} tokens is not square"
        )));
    }
    if new_side * new_side != num_patches {
        return Err(Error::ConfigError(format!(
            "model grid of {num_patches} patches is not square"
        )));
    }
    if orig_side != new_side {
        tracing::info!(
            from = orig_side,
            to = new_side,
            "resampling position embedding"
        );
    }

    let table = pos_embed
        .data()
        .view()
        .into_shape_with_order((rows, dim))
        .map_err(|e| Error::Serialization(format!("pos_embed layout: {e}")))?;
    let grid: ArrayView3<'_, f32> = table
        .slice_move(s![extra.., ..])
        .into_shape_with_order((orig_side, orig_side, dim))
        .map_err(|e| Error::Serialization(format!("pos_embed layout: {e}")))?;
    let resized = resize_bicubic(grid, new_side);

    let mut out = Vec::with_capacity((extra + num_patches) * dim);
    out.extend_from_slice(&pos_embed.as_slice()[..extra * dim]);
    for row in resized.lanes(Axis(2)) {
        out.extend(row.iter().copied());
    }
    Ok(Tensor::from_shape_vec(&[1, extra + num_patches, dim], out, false))
}

fn integer_sqrt(n: usize) -> usize {
    let mut r = (n as f64).sqrt() as usize;
    while r * r > n {
        r -= 1;
    }
    while (r + 1) * (r + 1) <= n {
        r += 1;
    }
    r
}

/// Copy every checkpoint tensor whose name and shape match a model parameter
pub fn load_partial(model: &mut VisionTransformer, state: &StateDict) -> LoadReport {
    let mut report = LoadReport::default();
    let mut seen = BTreeSet::new();

    for (name, param) in model.named_parameters_mut() {
        match state.get(&name) {
            Some(src) if src.shape() == param.shape() => {
                param.copy_from(src);
                report.loaded += 1;
            }
            Some(_) => report.mismatched.push(name.clone()),
            None => report.missing.push(name.clone()),
        }
        seen.insert(name);
    }
    report.unexpected = state
        .keys()
        .filter(|k| !seen.contains(*k))
        .cloned()
        .collect();
    report
}

/// Metadata stored alongside saved student weights
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StudentCheckpointMeta {
    /// Registered model name
    pub model: String,
    /// Replaced block indices
    pub replace: Vec<usize>,
    /// Epoch the weights were taken at
    pub epoch: usize,
    /// Validation loss at that epoch, when evaluated
    pub val_loss: Option<f32>,
}

impl StudentCheckpointMeta {
    fn to_metadata(&self) -> Result<HashMap<String, String>> {
        Ok(HashMap::from([
            ("model".to_string(), self.model.clone()),
            ("replace".to_string(), serde_json::to_string(&self.replace)?),
            ("epoch".to_string(), self.epoch.to_string()),
            ("val_loss".to_string(), serde_json::to_string(&self.val_loss)?),
            ("format".to_string(), "pt".to_string()),
        ]))
    }
}

/// Save a student's weights with distillation metadata
///
/// Returns the path of the written file.
pub fn save_student_checkpoint(
    model: &VisionTransformer,
    meta: &StudentCheckpointMeta,
    output_dir: impl AsRef<Path>,
    filename: &str,
) -> Result<PathBuf> {
    let output_dir = output_dir.as_ref();
    std::fs::create_dir_all(output_dir)?;
    let path = output_dir.join(filename);
    save_state_dict(&path, &model.state_dict(), Some(meta.to_metadata()?))?;
    Ok(path)
}
