//! Hashing utilities for source verification.
//!
//! This module provides:
//! - `HashAlgorithm`: the digest families a formula checksum may use
//! - `hash_file()`: streaming file hashing
//! - `hash_bytes()`: arbitrary byte hashing

use std::fs;
use std::io::Read;
use std::path::Path;

use md5::Md5;
use serde::{Deserialize, Serialize};
use sha1::Sha1;
use sha2::{Digest, Sha256};

/// Digest algorithm of a source checksum.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HashAlgorithm {
  Sha256,
  /// Legacy formulas still pin sha1 and md5 digests.
  Sha1,
  Md5,
}

impl HashAlgorithm {
  /// Length of the lowercase hex digest.
  pub fn hex_len(self) -> usize {
    match self {
      HashAlgorithm::Sha256 => 64,
      HashAlgorithm::Sha1 => 40,
      HashAlgorithm::Md5 => 32,
    }
  }
}

impl std::fmt::Display for HashAlgorithm {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    match self {
      HashAlgorithm::Sha256 => write!(f, "sha256"),
      HashAlgorithm::Sha1 => write!(f, "sha1"),
      HashAlgorithm::Md5 => write!(f, "md5"),
    }
  }
}

fn digest_reader<D: Digest, R: Read>(mut reader: R) -> std::io::Result<String> {
  let mut hasher = D::new();
  let mut buffer = [0u8; 8192];

  loop {
    let bytes_read = reader.read(&mut buffer)?;
    if bytes_read == 0 {
      break;
    }
    hasher.update(&buffer[..bytes_read]);
  }

  Ok(hex::encode(hasher.finalize()))
}

/// Hash a file's contents, returning the lowercase hex digest.
pub fn hash_file(path: &Path, algorithm: HashAlgorithm) -> std::io::Result<String> {
  let file = fs::File::open(path)?;
  match algorithm {
    HashAlgorithm::Sha256 => digest_reader::<Sha256, _>(file),
    HashAlgorithm::Sha1 => digest_reader::<Sha1, _>(file),
    HashAlgorithm::Md5 => digest_reader::<Md5, _>(file),
  }
}

/// Hash arbitrary bytes, returning the lowercase hex digest.
pub fn hash_bytes(data: &[u8], algorithm: HashAlgorithm) -> String {
  match algorithm {
    HashAlgorithm::Sha256 => hex::encode(Sha256::digest(data)),
    HashAlgorithm::Sha1 => hex::encode(Sha1::digest(data)),
    HashAlgorithm::Md5 => hex::encode(Md5::digest(data)),
  }
}
