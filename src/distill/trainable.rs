//! Selective gradient control by parameter ownership

use crate::transformer::{ParamOwner, VisionTransformer};

/// Enable gradients on blocks in `targets`; set every other parameter to
/// `!freeze_others`
///
/// Ownership comes from the model structure, so block 1 never matches
/// block 10. Values are not touched. Returns the number of trainable
/// scalars afterwards.
pub fn set_trainable(model: &mut VisionTransformer, targets: &[usize], freeze_others: bool) -> usize {
    let mut trainable = 0;
    for (owner, _, param) in model.parameters_by_owner_mut() {
        let is_target = matches!(owner, ParamOwner::Block(i) if targets.contains(&i));
        let requires_grad = is_target || !freeze_others;
        param.set_requires_grad(requires_grad);
        if requires_grad {
            trainable += param.len();
        }
    }
    tracing::debug!(?targets, freeze_others, trainable, "set trainable parameters");
    trainable
}
