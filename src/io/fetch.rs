//! Remote checkpoint download with hash-suffix verification
//!
//! Hub-style file names carry a prefix of the file's SHA-256 digest, e.g.
//! `deit_tiny_patch16_224-a1311bcf.safetensors`. Downloads with such a
//! suffix are verified before they are used.

use crate::{Error, Result};
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Shortest hex suffix treated as a digest prefix
const MIN_HASH_PREFIX: usize = 8;

/// Whether `source` names a remote file
pub fn is_url(source: &str) -> bool {
    source.starts_with("http://") || source.starts_with("https://")
}

/// `$XDG_CACHE_HOME/blockdistill/checkpoints`, falling back to
/// `$HOME/.cache/...` and finally a relative `.cache/...`
pub fn default_cache_dir() -> PathBuf {
    let base = std::env::var_os("XDG_CACHE_HOME")
        .map(PathBuf::from)
        .or_else(|| std::env::var_os("HOME").map(|h| PathBuf::from(h).join(".cache")))
        .unwrap_or_else(|| PathBuf::from(".cache"));
    base.join("blockdistill").join("checkpoints")
}

/// Digest prefix encoded in a file name, if any
///
/// `name-<hex>.ext` yields `<hex>` when it is lowercase hex of at least
/// eight characters.
pub fn hash_prefix(file_name: &str) -> Option<&str> {
    let stem = file_name.split('.').next()?;
    let (_, suffix) = stem.rsplit_once('-')?;
    let is_hex = suffix
        .chars()
        .all(|c| c.is_ascii_digit() || ('a'..='f').contains(&c));
    (suffix.len() >= MIN_HASH_PREFIX && is_hex).then_some(suffix)
}

/// Lowercase hex SHA-256 of `data`
pub fn sha256_hex(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hasher
        .finalize()
        .iter()
        .map(|b| format!("{b:02x}"))
        .collect()
}

/// Check `data` against the digest prefix in `file_name`, if there is one
pub fn verify_hash(file_name: &str, data: &[u8]) -> Result<()> {
    if let Some(expected) = hash_prefix(file_name) {
        let actual = sha256_hex(data);
        if !actual.starts_with(expected) {
            return Err(Error::Integrity {
                expected: expected.to_string(),
                actual,
            });
        }
    }
    Ok(())
}

fn file_name_of(url: &str) -> Result<&str> {
    let path = url.split(['?', '#']).next().unwrap_or(url);
    path.rsplit('/')
        .next()
        .filter(|name| !name.is_empty())
        .ok_or_else(|| Error::Network(format!("cannot derive a file name from {url}")))
}

/// Local path for `source`, downloading remote files into `cache_dir`
///
/// A file already present in the cache is reused. A fresh download whose
/// hash does not match its name is deleted and reported as an integrity
/// error.
pub fn resolve_source(source: &str, cache_dir: &Path) -> Result<PathBuf> {
    if !is_url(source) {
        return Ok(PathBuf::from(source));
    }

    let file_name = file_name_of(source)?;
    let dest = cache_dir.join(file_name);
    if dest.exists() {
        tracing::debug!(path = %dest.display(), "using cached checkpoint");
        return Ok(dest);
    }

    std::fs::create_dir_all(cache_dir)?;
    tracing::info!(url = source, dest = %dest.display(), "downloading checkpoint");

    let client = reqwest::blocking::Client::builder()
        .timeout(Duration::from_secs(600))
        .user_agent(concat!("blockdistill/", env!("CARGO_PKG_VERSION")))
        .build()?;
    download(&client, source, &dest)?;
    Ok(dest)
}

/// Fetch `url` into `dest` through a `.partial` file
///
/// The partial file is renamed into place only after the hash check passes
/// and is removed when it fails.
fn download(client: &reqwest::blocking::Client, url: &str, dest: &Path) -> Result<()> {
    let response = client
        .get(url)
        .send()
        .map_err(|e| Error::Network(format!("failed to fetch {url}: {e}")))?;
    if !response.status().is_success() {
        return Err(Error::Network(format!(
            "HTTP {} when fetching {url}",
            response.status()
        )));
    }
    let bytes = response
        .bytes()
        .map_err(|e| Error::Network(format!("failed to read response body: {e}")))?;

    let file_name = file_name_of(url)?;
    let partial = dest.with_extension("partial");
    std::fs::write(&partial, &bytes)?;
    if let Err(e) = verify_hash(file_name, &bytes) {
        std::fs::remove_file(&partial)?;
        return Err(e);
    }
    std::fs::rename(&partial, dest)?;
    Ok(())
}
