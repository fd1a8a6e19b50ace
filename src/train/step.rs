//! Training step operations

use super::distiller::Distiller;
use crate::autograd::{backward, scale};
use crate::data::Batch;
use crate::optim::clip_grad_norm;
use crate::{Error, Result};

impl Distiller<'_> {
    /// One optimizer step on `batch`
    ///
    /// Returns the unscaled loss. Fails if the loss is not finite. A step
    /// whose unscaled gradients are not finite is skipped and the loss
    /// scale backs off.
    pub fn train_step(&mut self, batch: &Batch) -> Result<f32> {
        let target = self.teacher.forward_features(&batch.images).detach();
        let features = self.student.forward_features(&batch.images);
        let loss = self.criterion.forward(&features, &target);

        let loss_val = loss.data()[0];
        if !loss_val.is_finite() {
            return Err(Error::InvalidParameter(format!(
                "loss is {loss_val}, stopping training"
            )));
        }

        let mut scaled = scale(&loss, self.scaler.scale());
        backward(&mut scaled, None);

        let mut params = self.student.trainable_parameters_mut();
        let valid = self.scaler.unscale_and_check(&params);
        if valid {
            if let Some(max_norm) = self.settings.clip_grad {
                clip_grad_norm(&mut params, max_norm);
            }
            self.optimizer.step(&mut params);
        } else {
            tracing::warn!(scale = self.scaler.scale(), "non-finite gradients, skipping step");
        }
        self.scaler.update(valid);
        self.optimizer.zero_grad(&mut params);
        self.global_step += 1;

        Ok(loss_val)
    }
}
