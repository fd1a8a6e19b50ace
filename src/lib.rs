//! Block distillation for vision transformers.
//!
//! Replaces selected attention blocks of a pretrained DeiT with MLP-Mixer
//! blocks and trains only the new blocks so that the student's features at
//! the replacement boundary match the original model's under a cosine
//! similarity loss.
//!
//! - [`autograd`]: tape-based tensors and the ops the models need
//! - [`transformer`]: DeiT models and Mixer blocks, named like timm
//! - [`io`]: SafeTensors state dicts and remote checkpoint fetching
//! - [`distill`]: checkpoint loading, block replacement, truncation,
//!   selective gradients and the run orchestrator
//! - [`data`], [`optim`], [`train`]: datasets, optimizers and the loop
//! - [`config`], [`cli`]: YAML spec, CLI flags and logging

pub mod autograd;
pub mod cli;
pub mod config;
pub mod data;
pub mod distill;
pub mod error;
pub mod io;
pub mod optim;
pub mod train;
pub mod transformer;

pub use autograd::Tensor;
pub use error::{Error, Result};
