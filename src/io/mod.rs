//! Checkpoint I/O
//!
//! State dicts are ordered name-to-tensor maps stored as SafeTensors.
//! Remote sources are fetched into a local cache first.

mod fetch;
mod load;
mod save;

pub use fetch::{default_cache_dir, hash_prefix, is_url, resolve_source, sha256_hex, verify_hash};
pub use load::{load_state_dict, parse_state_dict, Checkpoint};
pub use save::save_state_dict;

use crate::Tensor;
use std::collections::BTreeMap;

/// Parameter name to tensor, ordered by name
pub type StateDict = BTreeMap<String, Tensor>;
