//! Utility traits for diff processing.

use std::path::PathBuf;

use anyhow::{Context, Result};

use super::types::PatchLine;

/// Extension trait for PathBuf to load and store raw diff and file content
pub trait FilePath {
  fn is_empty(&self) -> Result<bool> {
    self.read_bytes().map(|bytes| bytes.is_empty())
  }

  fn write_bytes(&self, bytes: &[u8]) -> Result<()>;
  fn read_bytes(&self) -> Result<Vec<u8>>;
}

impl FilePath for PathBuf {
  fn write_bytes(&self, bytes: &[u8]) -> Result<()> {
    std::fs::write(self, bytes).with_context(|| format!("Failed to write {}", self.display()))
  }

  fn read_bytes(&self) -> Result<Vec<u8>> {
    std::fs::read(self).with_context(|| format!("Failed to read {}", self.display()))
  }
}

/// Extension trait for splitting raw content into lines
pub trait ByteLines {
  /// Raw lines, terminators included.
  fn raw_lines(&self) -> Vec<&[u8]>;

  /// Lines split from their terminators.
  fn patch_lines(&self) -> Vec<PatchLine> {
    self
      .raw_lines()
      .into_iter()
      .map(PatchLine::from_raw)
      .collect()
  }
}

impl ByteLines for [u8] {
  fn raw_lines(&self) -> Vec<&[u8]> {
    self.split_inclusive(|byte| *byte == b'\n').collect()
  }
}

/// Extension trait for converting bytes to UTF-8 strings
pub trait Utf8String {
  fn to_utf8(&self) -> String;
}

impl Utf8String for Vec<u8> {
  fn to_utf8(&self) -> String {
    self.as_slice().to_utf8()
  }
}

impl Utf8String for [u8] {
  fn to_utf8(&self) -> String {
    // Fast path for valid UTF-8 (most common case)
    if let Ok(s) = std::str::from_utf8(self) {
      return s.to_string();
    }
    // Fallback for invalid UTF-8
    String::from_utf8_lossy(self).into_owned()
  }
}
