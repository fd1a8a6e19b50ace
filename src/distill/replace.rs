//! Swap attention blocks for freshly initialized Mixer blocks

use crate::transformer::{ArchTable, Block, MixerBlock, ParamInit, VisionTransformer};
use crate::{Error, Result};

/// Offset mixed into the model seed so each replaced slot draws its own init
const REPLACE_SEED_OFFSET: u64 = 0x00B1_0C00;

/// Replace `model.blocks[i]` with a new Mixer block for every `i` in `indices`
///
/// Hyperparameters come from `table[model_name]`. All indices and the
/// table entry are checked before any block is touched, so on error the
/// model is unchanged.
pub fn replace_blocks(
    model: &mut VisionTransformer,
    indices: &[usize],
    table: &ArchTable,
    model_name: &str,
) -> Result<()> {
    let params = table.get(model_name)?;
    if params.channels_dim != model.embed_dim() {
        return Err(Error::ConfigError(format!(
            "mixer channels_dim {} does not match embed_dim {} of '{model_name}'",
            params.channels_dim,
            model.embed_dim()
        )));
    }
    if params.num_patches != model.num_patches() {
        return Err(Error::ConfigError(format!(
            "mixer num_patches {} does not match the model's {} patches (input size {})",
            params.num_patches,
            model.num_patches(),
            model.config().img_size
        )));
    }
    let depth = model.depth();
    if let Some(bad) = indices.iter().find(|&&i| i >= depth) {
        return Err(Error::ConfigError(format!(
            "block index {bad} out of range for depth {depth}"
        )));
    }

    for &i in indices {
        let mut init = ParamInit::new(model.seed() ^ REPLACE_SEED_OFFSET.wrapping_add(i as u64));
        model.blocks[i] = Block::Mixer(MixerBlock::new(params, &mut init));
        tracing::debug!(index = i, ?params, "replaced block with mixer");
    }
    Ok(())
}
