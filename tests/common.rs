#![allow(dead_code)]

use chrono::{TimeZone, Utc};
use diffset::graph::{Commit, FileChange, Signature};
use diffset::ingest::CommitHeader;
use diffset::store::BlobRef;
use diffset::{FileStatus, Revision};

pub fn signature() -> Signature {
  let date = Utc
    .with_ymd_and_hms(2024, 3, 1, 12, 0, 0)
    .single()
    .expect("valid timestamp");
  Signature::new("Jane Doe", "jane@example.com", date)
}

pub fn header(commit_id: &str, parent_id: &str) -> CommitHeader {
  CommitHeader::new(commit_id, parent_id, signature())
}

pub fn commit(commit_id: &str, parent_id: &str, files: Vec<FileChange>) -> Commit {
  Commit::new(commit_id, parent_id, signature()).with_files(files)
}

pub fn change(filename: &str, status: FileStatus) -> FileChange {
  FileChange::new(filename, status, BlobRef::of(filename.as_bytes()))
}

pub fn rename(from: &str, to: &str) -> FileChange {
  change(to, FileStatus::Moved).with_source(from, Revision::Unknown)
}

/// A git diff adding `name` with the given lines.
pub fn git_add(name: &str, blob: &str, lines: &[&str]) -> Vec<u8> {
  let mut diff = format!(
    "diff --git a/{name} b/{name}\nnew file mode 100644\nindex 0000000..{blob}\n--- /dev/null\n+++ b/{name}\n@@ -0,0 +1,{} @@\n",
    lines.len()
  );
  for line in lines {
    diff.push('+');
    diff.push_str(line);
    diff.push('\n');
  }
  diff.into_bytes()
}

/// A git diff replacing the single line of `name`.
pub fn git_edit(name: &str, from_blob: &str, to_blob: &str, old: &str, new: &str) -> Vec<u8> {
  format!(
    "diff --git a/{name} b/{name}\nindex {from_blob}..{to_blob} 100644\n--- a/{name}\n+++ b/{name}\n@@ -1 +1 @@\n-{old}\n+{new}\n"
  )
  .into_bytes()
}
