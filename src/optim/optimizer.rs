//! Optimizer trait

use crate::Tensor;

/// Trait for optimization algorithms
///
/// Parameters are passed as borrowed references collected from a model in
/// a stable order; per-parameter state is indexed by that position.
pub trait Optimizer {
    /// Perform a single optimization step
    ///
    /// Parameters without a gradient are skipped.
    fn step(&mut self, params: &mut [&mut Tensor]);

    /// Clear the gradients of `params`
    fn zero_grad(&self, params: &mut [&mut Tensor]) {
        for param in params.iter_mut() {
            param.zero_grad();
        }
    }

    /// Get learning rate
    fn lr(&self) -> f32;

    /// Set learning rate
    fn set_lr(&mut self, lr: f32);
}

/// Which parameters receive weight decay
///
/// Indexed like the parameter slice handed to [`Optimizer::step`].
/// Positions past the end of the mask decay.
#[derive(Debug, Clone, Default)]
pub struct DecayMask(Vec<bool>);

impl DecayMask {
    /// Build from explicit flags
    pub fn new(flags: Vec<bool>) -> Self {
        Self(flags)
    }

    /// Mask that exempts biases, norm weights and embedding tokens
    ///
    /// Every parameter with fewer than two dimensions is exempt, as are the
    /// names in [`NO_WEIGHT_DECAY`].
    pub fn from_named<'a>(params: impl IntoIterator<Item = (&'a str, &'a [usize])>) -> Self {
        Self(
            params
                .into_iter()
                .map(|(name, shape)| {
                    shape.len() >= 2 && !NO_WEIGHT_DECAY.contains(&name) && !name.ends_with(".bias")
                })
                .collect(),
        )
    }

    /// Whether the parameter at `index` decays
    pub fn decays(&self, index: usize) -> bool {
        self.0.get(index).copied().unwrap_or(true)
    }
}

/// Parameters never decayed regardless of rank
pub const NO_WEIGHT_DECAY: &[&str] = &["pos_embed", "cls_token", "dist_token"];

/// Grow a per-parameter state vector to cover `len` slots
pub(crate) fn ensure_slots<T: Clone>(slots: &mut Vec<Option<T>>, len: usize) {
    if slots.len() < len {
        slots.resize(len, None);
    }
}
