//! Block distillation
//!
//! Model surgery and the run that ties it together:
//!
//! - **Checkpoint loading**: pretrained weights with head filtering and
//!   positional-embedding resampling
//! - **Block replacement**: attention blocks swapped for Mixer blocks
//! - **Depth truncation**: everything after the last replaced block becomes
//!   an identity
//! - **Selective gradients**: only the replaced blocks train
//!
//! ## Example
//!
//! ```no_run
//! use blockdistill::distill::{replace_blocks, set_trainable, truncate};
//! use blockdistill::transformer::{create_model, ArchTable, ModelOptions};
//!
//! let mut student = create_model("deit_tiny_patch16_224", &ModelOptions::default())?;
//! replace_blocks(&mut student, &[1], &ArchTable::builtin(), "deit_tiny_patch16_224")?;
//! truncate(&mut student, 1)?;
//! let trainable = set_trainable(&mut student, &[1], true);
//! # Ok::<(), blockdistill::Error>(())
//! ```

mod checkpoint;
mod interpolate;
mod loss;
mod replace;
mod run;
mod trainable;
mod truncate;

pub use checkpoint::{
    load_partial, load_weight, load_weight_with_cache, resample_pos_embed, save_student_checkpoint,
    LoadReport, StudentCheckpointMeta,
};
pub use interpolate::resize_bicubic;
pub use loss::CosineSimilarityLoss;
pub use replace::replace_blocks;
pub use run::{run, RunMode, RunOutcome};
pub use trainable::set_trainable;
pub use truncate::truncate;
