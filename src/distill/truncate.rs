//! Cut a model after a given block

use crate::transformer::{Block, VisionTransformer};
use crate::{Error, Result};

/// Turn every block after `max_index` into an identity and drop the head
///
/// Afterwards `forward_features` returns the token sequence produced by
/// block `max_index`. `norm`, `fc_norm`, `head_drop`, `head` and
/// `head_dist` all become identities.
pub fn truncate(model: &mut VisionTransformer, max_index: usize) -> Result<()> {
    let depth = model.depth();
    if max_index >= depth {
        return Err(Error::ConfigError(format!(
            "truncation index {max_index} out of range for depth {depth}"
        )));
    }

    for block in model.blocks.iter_mut().skip(max_index + 1) {
        *block = Block::Identity;
    }
    model.norm = None;
    model.fc_norm = None;
    model.head_drop = None;
    model.head = None;
    model.head_dist = None;

    tracing::debug!(max_index, depth, "truncated model");
    Ok(())
}
