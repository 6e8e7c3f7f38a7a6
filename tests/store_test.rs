use std::sync::Arc;
use std::thread;

use diffset::store::{BlobRef, BlobStore, MemoryBlobStore};

#[test]
fn test_identical_content_is_stored_once() {
  let store = MemoryBlobStore::new();
  let diff = b"--- a\n+++ a\n@@ -1 +1 @@\n-x\n+y\n";

  let first = store.put(diff);
  let second = store.put(&diff.to_vec());
  assert_eq!(first, second);
  assert_eq!(store.len(), 1);
  assert_eq!(store.get_blob(&first).unwrap().data.as_ref(), diff);
}

#[test]
fn test_distinct_content_gets_distinct_refs() {
  let store = MemoryBlobStore::new();
  let a = store.put(b"a");
  let b = store.put(b"b");
  assert_ne!(a, b);
  assert!(store.contains(&a) && store.contains(&b));
  assert_eq!(store.stats().bytes, 2);
}

#[test]
fn test_concurrent_puts_of_same_bytes() {
  let store = Arc::new(MemoryBlobStore::new());
  let payload: Arc<[u8]> = Arc::from(&b"diff --git a/shared b/shared\n"[..]);

  let handles: Vec<_> = (0..8)
    .map(|_| {
      let store = Arc::clone(&store);
      let payload = Arc::clone(&payload);
      thread::spawn(move || store.put(&payload))
    })
    .collect();

  let refs: Vec<BlobRef> = handles
    .into_iter()
    .map(|handle| handle.join().unwrap())
    .collect();
  assert!(refs.windows(2).all(|pair| pair[0] == pair[1]));
  assert_eq!(store.len(), 1);
}

#[test]
fn test_blob_ref_serializes_as_hex() {
  let blob = BlobRef::of(b"content");
  let json = serde_json::to_string(&blob).unwrap();
  assert_eq!(json, format!("\"{blob}\""));
  assert_eq!(serde_json::from_str::<BlobRef>(&json).unwrap(), blob);
}
