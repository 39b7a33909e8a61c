//! Source fetching with checksum verification.
//!
//! Sources land in a shared download cache. A cached file is reused only when
//! its digest still matches the formula's checksum.

use std::path::{Path, PathBuf};

use sha2::{Digest, Sha256};
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info, warn};

use crate::execute::types::BuildError;
use crate::formula::{Checksum, SourceSpec};
use crate::util::hash::hash_file;

/// Fetch `source` into `downloads_dir` and verify it.
///
/// `http(s)://` URLs are downloaded; `file://` URLs and bare paths are
/// copied. Any other scheme fails with `FetchFailed`. `cache_key` (usually `name-version`) prefixes the cached file
/// name so two formulas never share an entry.
pub async fn fetch_source(source: &SourceSpec, cache_key: &str, downloads_dir: &Path) -> Result<PathBuf, BuildError> {
  let url = source.url.as_str();
  fs::create_dir_all(downloads_dir).await?;

  let dest_path = downloads_dir.join(format!("{cache_key}--{}", url_to_filename(url)));

  if dest_path.exists() {
    debug!(path = ?dest_path, "checking cached file");
    match digest(&dest_path, &source.checksum).await {
      Ok(actual) if source.checksum.matches(&actual) => {
        info!(path = ?dest_path, "using cached file");
        return Ok(dest_path);
      }
      Ok(actual) => debug!(expected = %source.checksum.hex, actual = %actual, "cached file hash mismatch, re-fetching"),
      Err(e) => debug!(error = %e, "cached file unreadable, re-fetching"),
    }
  }

  info!(url = %url, "fetching source");
  let partial = dest_path.with_extension("part");
  let result = match local_path(url) {
    Some(path) => copy_local(&path, &partial).await,
    None => download(url, &partial).await,
  };
  if let Err(e) = result {
    let _ = fs::remove_file(&partial).await;
    return Err(e);
  }

  let actual = digest(&partial, &source.checksum).await?;
  if !source.checksum.matches(&actual) {
    warn!(url = %url, expected = %source.checksum, "checksum mismatch, discarding download");
    let _ = fs::remove_file(&partial).await;
    return Err(BuildError::ChecksumMismatch {
      url: url.to_string(),
      expected: source.checksum.to_string(),
      actual: format!("{}:{actual}", source.checksum.algorithm),
    });
  }

  fs::rename(&partial, &dest_path).await?;
  info!(path = ?dest_path, "fetch complete");
  Ok(dest_path)
}

async fn digest(path: &Path, checksum: &Checksum) -> Result<String, BuildError> {
  let path = path.to_path_buf();
  let algorithm = checksum.algorithm;
  tokio::task::spawn_blocking(move || hash_file(&path, algorithm))
    .await
    .map_err(|e| BuildError::Io { message: e.to_string() })?
    .map_err(BuildError::from)
}

/// Filesystem path for `file://` URLs and bare paths.
fn local_path(url: &str) -> Option<PathBuf> {
  if let Some(rest) = url.strip_prefix("file://") {
    return Some(PathBuf::from(rest));
  }
  if url.contains("://") {
    return None;
  }
  Some(PathBuf::from(url))
}

async fn copy_local(source: &Path, dest: &Path) -> Result<(), BuildError> {
  fs::copy(source, dest).await.map_err(|e| BuildError::FetchFailed {
    url: source.display().to_string(),
    message: e.to_string(),
  })?;
  Ok(())
}

async fn download(url: &str, dest: &Path) -> Result<(), BuildError> {
  let fetch_failed = |message: String| BuildError::FetchFailed {
    url: url.to_string(),
    message,
  };

  if !(url.starts_with("http://") || url.starts_with("https://")) {
    let scheme = url.split_once("://").map_or(url, |(scheme, _)| scheme);
    return Err(fetch_failed(format!("unsupported URL scheme `{scheme}`, mirror the source over http(s)")));
  }

  let response = reqwest::get(url).await.map_err(|e| fetch_failed(e.to_string()))?;
  if !response.status().is_success() {
    return Err(fetch_failed(format!("HTTP {}", response.status())));
  }

  let bytes = response.bytes().await.map_err(|e| fetch_failed(e.to_string()))?;

  let mut file = fs::File::create(dest).await?;
  file.write_all(&bytes).await?;
  file.flush().await?;

  debug!(url = %url, size = bytes.len(), "download complete");
  Ok(())
}

/// Convert a URL to a safe filename.
///
/// Takes the last path component and sanitizes it. Falls back to hash of URL
/// if no suitable filename can be extracted.
fn url_to_filename(url: &str) -> String {
  if let Some(filename) = url.rsplit('/').next() {
    let filename = filename.split('?').next().unwrap_or(filename);

    let sanitized: String = filename
      .chars()
      .map(|c| {
        if c.is_alphanumeric() || c == '-' || c == '_' || c == '.' {
          c
        } else {
          '_'
        }
      })
      .collect();

    if !sanitized.is_empty() && sanitized != "." && sanitized != ".." {
      return sanitized;
    }
  }

  let mut hasher = Sha256::new();
  hasher.update(url.as_bytes());
  format!("download_{}", &hex::encode(hasher.finalize())[..16])
}
