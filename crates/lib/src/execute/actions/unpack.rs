//! Source archive extraction.

use std::fs::{self, File};
use std::io::{BufReader, Read};
use std::path::{Path, PathBuf};

use bzip2::read::BzDecoder;
use flate2::read::GzDecoder;
use tar::Archive;
use tracing::debug;

use crate::execute::types::BuildError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ArchiveKind {
  TarGz,
  TarBz2,
  Tar,
  /// Not an archive; copied into the source directory unchanged.
  Plain,
}

/// Detect the archive format from its leading bytes.
///
/// Download URLs such as `.../php-5.3.8.tar.gz/from/this/mirror` say nothing
/// useful about the format, so the name is not consulted.
fn sniff(path: &Path) -> std::io::Result<ArchiveKind> {
  let mut file = File::open(path)?;
  let mut header = [0u8; 512];
  let mut filled = 0;
  while filled < header.len() {
    let n = file.read(&mut header[filled..])?;
    if n == 0 {
      break;
    }
    filled += n;
  }

  if filled >= 2 && header[..2] == [0x1f, 0x8b] {
    return Ok(ArchiveKind::TarGz);
  }
  if filled >= 3 && &header[..3] == b"BZh" {
    return Ok(ArchiveKind::TarBz2);
  }
  if filled >= 262 && &header[257..262] == b"ustar" {
    return Ok(ArchiveKind::Tar);
  }
  Ok(ArchiveKind::Plain)
}

/// Unpack `archive` into `dest` and return the source root.
///
/// When the archive holds a single top-level directory (the usual
/// `name-version/` layout), that directory is the source root.
pub fn unpack(archive: &Path, dest: &Path) -> Result<PathBuf, BuildError> {
  let failed = |message: String| BuildError::UnpackFailed {
    archive: archive.to_path_buf(),
    message,
  };

  fs::create_dir_all(dest)?;
  let kind = sniff(archive).map_err(|e| failed(e.to_string()))?;
  debug!(archive = %archive.display(), ?kind, "unpacking source");

  match kind {
    ArchiveKind::TarGz => {
      let file = File::open(archive).map_err(|e| failed(e.to_string()))?;
      let mut tar = Archive::new(GzDecoder::new(BufReader::new(file)));
      tar.unpack(dest).map_err(|e| failed(e.to_string()))?;
    }
    ArchiveKind::TarBz2 => {
      let file = File::open(archive).map_err(|e| failed(e.to_string()))?;
      let mut tar = Archive::new(BzDecoder::new(BufReader::new(file)));
      tar.unpack(dest).map_err(|e| failed(e.to_string()))?;
    }
    ArchiveKind::Tar => {
      let file = File::open(archive).map_err(|e| failed(e.to_string()))?;
      let mut tar = Archive::new(BufReader::new(file));
      tar.unpack(dest).map_err(|e| failed(e.to_string()))?;
    }
    ArchiveKind::Plain => {
      let name = archive.file_name().ok_or_else(|| failed("source has no file name".to_string()))?;
      fs::copy(archive, dest.join(name))?;
      return Ok(dest.to_path_buf());
    }
  }

  source_root(dest)
}

fn source_root(dest: &Path) -> Result<PathBuf, BuildError> {
  let entries: Vec<PathBuf> = fs::read_dir(dest)?
    .filter_map(Result::ok)
    .map(|e| e.path())
    .collect();

  match entries.as_slice() {
    [only] if only.is_dir() => Ok(only.clone()),
    _ => Ok(dest.to_path_buf()),
  }
}
