//! State dict loading from SafeTensors

use super::StateDict;
use crate::{Error, Result, Tensor};
use safetensors::tensor::TensorView;
use safetensors::{Dtype, SafeTensors};
use std::collections::HashMap;
use std::path::Path;

/// A parsed checkpoint: tensors plus the file's string metadata
#[derive(Debug, Default)]
pub struct Checkpoint {
    /// Parameter name to tensor
    pub tensors: StateDict,
    /// Free-form `__metadata__` entries
    pub metadata: HashMap<String, String>,
}

/// Load a SafeTensors file
pub fn load_state_dict(path: impl AsRef<Path>) -> Result<Checkpoint> {
    let path = path.as_ref();
    let data = std::fs::read(path).map_err(|e| {
        Error::Serialization(format!("failed to read {}: {e}", path.display()))
    })?;
    parse_state_dict(&data)
        .map_err(|e| Error::Serialization(format!("{}: {e}", path.display())))
}

/// Parse SafeTensors bytes. F32, F16 and BF16 tensors are converted to f32.
pub fn parse_state_dict(data: &[u8]) -> Result<Checkpoint> {
    let (_, st_metadata) = SafeTensors::read_metadata(data)
        .map_err(|e| Error::Serialization(format!("SafeTensors parsing failed: {e}")))?;
    let metadata = st_metadata.metadata().clone().unwrap_or_default();

    let tensors = SafeTensors::deserialize(data)
        .map_err(|e| Error::Serialization(format!("SafeTensors parsing failed: {e}")))?;

    let mut state = StateDict::new();
    for (name, view) in tensors.tensors() {
        let values = tensor_to_f32_vec(&view).ok_or_else(|| {
            Error::Serialization(format!(
                "tensor '{name}' has unsupported dtype {:?}",
                view.dtype()
            ))
        })?;
        state.insert(name, Tensor::from_shape_vec(view.shape(), values, false));
    }

    Ok(Checkpoint {
        tensors: state,
        metadata,
    })
}

fn tensor_to_f32_vec(tensor: &TensorView<'_>) -> Option<Vec<f32>> {
    let data = tensor.data();

    match tensor.dtype() {
        Dtype::F32 => Some(
            data.chunks_exact(4)
                .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
                .collect(),
        ),
        Dtype::F16 => Some(
            data.chunks_exact(2)
                .map(|c| half::f16::from_bits(u16::from_le_bytes([c[0], c[1]])).to_f32())
                .collect(),
        ),
        Dtype::BF16 => Some(
            data.chunks_exact(2)
                .map(|c| half::bf16::from_bits(u16::from_le_bytes([c[0], c[1]])).to_f32())
                .collect(),
        ),
        _ => None,
    }
}
