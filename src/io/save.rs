//! State dict saving to SafeTensors

use super::StateDict;
use crate::{Error, Result};
use safetensors::tensor::TensorView;
use safetensors::Dtype;
use std::collections::HashMap;
use std::path::Path;

/// Write `state` as an F32 SafeTensors file
pub fn save_state_dict(
    path: impl AsRef<Path>,
    state: &StateDict,
    metadata: Option<HashMap<String, String>>,
) -> Result<()> {
    let path = path.as_ref();

    let tensor_data: Vec<(&str, Vec<u8>, Vec<usize>)> = state
        .iter()
        .map(|(name, t)| {
            let bytes: Vec<u8> = bytemuck::cast_slice(t.as_slice()).to_vec();
            (name.as_str(), bytes, t.shape().to_vec())
        })
        .collect();

    let views = tensor_data
        .iter()
        .map(|(name, bytes, shape)| {
            TensorView::new(Dtype::F32, shape.clone(), bytes)
                .map(|view| (*name, view))
                .map_err(|e| Error::Serialization(format!("tensor '{name}': {e}")))
        })
        .collect::<Result<Vec<_>>>()?;

    let bytes = safetensors::serialize(views, &metadata)
        .map_err(|e| Error::Serialization(format!("SafeTensors serialization failed: {e}")))?;
    std::fs::write(path, bytes)?;

    tracing::debug!(path = %path.display(), tensors = state.len(), "saved state dict");
    Ok(())
}
