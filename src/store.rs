//! Content-addressable storage for diff bytes.
//!
//! Blobs are keyed by their 128-bit XXH3 hash. Storing the same bytes twice
//! yields the same [`BlobRef`] and keeps a single copy.

use std::collections::HashMap;
use std::fmt::{self, Display};
use std::str::FromStr;
use std::sync::Arc;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use xxhash_rust::xxh3::xxh3_128;

/// Hash of a stored blob, shown as 32 lowercase hex digits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct BlobRef(u128);

#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Invalid blob reference {0:?}: expected 32 hex digits")]
pub struct InvalidBlobRef(String);

impl BlobRef {
  /// Hash of `bytes`.
  pub fn of(bytes: &[u8]) -> Self {
    BlobRef(xxh3_128(bytes))
  }

  pub fn as_u128(&self) -> u128 {
    self.0
  }
}

impl Display for BlobRef {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{:032x}", self.0)
  }
}

impl FromStr for BlobRef {
  type Err = InvalidBlobRef;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    if s.len() != 32 || !s.chars().all(|c| c.is_ascii_hexdigit()) {
      return Err(InvalidBlobRef(s.to_string()));
    }
    u128::from_str_radix(s, 16)
      .map(BlobRef)
      .map_err(|_| InvalidBlobRef(s.to_string()))
  }
}

impl TryFrom<String> for BlobRef {
  type Error = InvalidBlobRef;

  fn try_from(value: String) -> Result<Self, Self::Error> {
    value.parse()
  }
}

impl From<BlobRef> for String {
  fn from(blob: BlobRef) -> Self {
    blob.to_string()
  }
}

/// Stored bytes with their hash.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiffBlob {
  pub hash: BlobRef,
  pub data: Arc<[u8]>
}

/// Hash-addressed blob storage.
///
/// Implementations must make `put` an atomic insert-if-absent.
pub trait BlobStore: Send + Sync {
  fn put(&self, bytes: &[u8]) -> BlobRef;
  fn get(&self, blob: &BlobRef) -> Option<Arc<[u8]>>;
  fn contains(&self, blob: &BlobRef) -> bool;
  fn len(&self) -> usize;

  fn is_empty(&self) -> bool {
    self.len() == 0
  }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct StoreStats {
  pub blobs: usize,
  pub bytes: usize
}

/// In-memory [`BlobStore`].
#[derive(Debug, Default)]
pub struct MemoryBlobStore {
  blobs: RwLock<HashMap<BlobRef, Arc<[u8]>>>
}

impl MemoryBlobStore {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn get_blob(&self, blob: &BlobRef) -> Option<DiffBlob> {
    self.get(blob).map(|data| DiffBlob { hash: *blob, data })
  }

  pub fn stats(&self) -> StoreStats {
    let blobs = self.blobs.read();
    StoreStats {
      blobs: blobs.len(),
      bytes: blobs.values().map(|data| data.len()).sum()
    }
  }
}

impl BlobStore for MemoryBlobStore {
  fn put(&self, bytes: &[u8]) -> BlobRef {
    let hash = BlobRef::of(bytes);

    // Fast path: already stored
    if self.blobs.read().contains_key(&hash) {
      log::debug!("Blob {} already stored", hash);
      return hash;
    }

    self
      .blobs
      .write()
      .entry(hash)
      .or_insert_with(|| {
        log::debug!("Storing blob {} ({} bytes)", hash, bytes.len());
        Arc::from(bytes)
      });
    hash
  }

  fn get(&self, blob: &BlobRef) -> Option<Arc<[u8]>> {
    self.blobs.read().get(blob).cloned()
  }

  fn contains(&self, blob: &BlobRef) -> bool {
    self.blobs.read().contains_key(blob)
  }

  fn len(&self) -> usize {
    self.blobs.read().len()
  }
}
