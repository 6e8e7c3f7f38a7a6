use chrono::{DateTime, Utc};
use once_cell::sync::OnceCell;
use serde::{Deserialize, Serialize};

use crate::diff::{DiffParser, DiffParserError, FileStatus, LineKind, Revision};
use crate::differ::{self, Tag};
use crate::store::{BlobRef, BlobStore};

/// Identity and time of an author or committer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Signature {
  pub name:  String,
  pub email: String,
  pub date:  DateTime<Utc>
}

impl Signature {
  pub fn new(name: impl Into<String>, email: impl Into<String>, date: DateTime<Utc>) -> Self {
    Self { name: name.into(), email: email.into(), date }
  }
}

/// Line statistics for one file's diff.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LineCounts {
  pub raw_insert_count: usize,
  pub raw_delete_count: usize,
  pub insert_count:     usize,
  pub delete_count:     usize,
  pub replace_count:    usize,
  pub equal_count:      usize,
  pub total_line_count: usize
}

#[derive(Debug, thiserror::Error, Clone, PartialEq, Eq)]
pub enum LineCountError {
  #[error("Diff blob {0} is not in the store")]
  MissingBlob(BlobRef),

  #[error(transparent)]
  Parse(#[from] DiffParserError)
}

/// Counts lines of a single-file diff.
///
/// Within each hunk a block of removed lines directly followed by added
/// lines is a change block: the overlapping part counts as replaced lines
/// and the rest as plain inserts or deletes. Context lines count as equal.
pub fn compute_line_counts(diff: &[u8]) -> Result<LineCounts, LineCountError> {
  let files = match DiffParser::default().parse(diff) {
    Ok(files) => files,
    // A file change without hunks (pure rename, mode change) has nothing to count
    Err(DiffParserError::EmptyDiff) => return Ok(LineCounts::default()),
    Err(err) => return Err(err.into())
  };

  let mut counts = LineCounts::default();
  for file in &files {
    counts.raw_insert_count += file.insert_count;
    counts.raw_delete_count += file.delete_count;

    for hunk in &file.hunks {
      let (mut deletes, mut inserts) = (0, 0);
      for line in &hunk.lines {
        match line.kind {
          LineKind::Context => {
            flush(&mut deletes, &mut inserts, &mut counts);
            counts.equal_count += 1;
          }
          LineKind::Delete => deletes += 1,
          LineKind::Insert => inserts += 1
        }
      }
      flush(&mut deletes, &mut inserts, &mut counts);
    }
  }

  counts.total_line_count = counts.equal_count + counts.replace_count + counts.insert_count + counts.delete_count;
  Ok(counts)
}

/// Counts lines from both versions of the file.
///
/// Raw counts still come from the diff's hunks. The equal, replace, insert
/// and delete counts come from opcodes over the whole file, so unchanged
/// lines outside the hunk context are counted as equal too.
pub fn compute_line_counts_with_content(diff: &[u8], old: &str, new: &str) -> Result<LineCounts, LineCountError> {
  let hunks = compute_line_counts(diff)?;
  let old_lines: Vec<&str> = old.split_inclusive('\n').collect();
  let new_lines: Vec<&str> = new.split_inclusive('\n').collect();

  let mut counts = LineCounts {
    raw_insert_count: hunks.raw_insert_count,
    raw_delete_count: hunks.raw_delete_count,
    ..LineCounts::default()
  };
  for op in differ::diff(&old_lines, &new_lines) {
    let (mut deletes, mut inserts) = (op.old_len(), op.new_len());
    match op.tag {
      Tag::Equal => counts.equal_count += deletes,
      Tag::Replace | Tag::Delete | Tag::Insert => flush(&mut deletes, &mut inserts, &mut counts)
    }
  }

  counts.total_line_count = counts.equal_count + counts.replace_count + counts.insert_count + counts.delete_count;
  Ok(counts)
}

fn flush(deletes: &mut usize, inserts: &mut usize, counts: &mut LineCounts) {
  let replaced = (*deletes).min(*inserts);
  counts.replace_count += replaced;
  counts.delete_count += *deletes - replaced;
  counts.insert_count += *inserts - replaced;
  *deletes = 0;
  *inserts = 0;
}

/// One file's change within a commit.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileChange {
  pub filename:        String,
  pub source_filename: String,
  pub source_revision: Revision,
  pub dest_revision:   Revision,
  pub status:          FileStatus,
  pub binary:          bool,
  pub diff:            BlobRef,
  pub parent_diff:     Option<BlobRef>,
  pub commit_id:       Option<String>,
  #[serde(skip)]
  counts:              OnceCell<LineCounts>
}

impl PartialEq for FileChange {
  fn eq(&self, other: &Self) -> bool {
    self.filename == other.filename
      && self.source_filename == other.source_filename
      && self.source_revision == other.source_revision
      && self.dest_revision == other.dest_revision
      && self.status == other.status
      && self.binary == other.binary
      && self.diff == other.diff
      && self.parent_diff == other.parent_diff
      && self.commit_id == other.commit_id
  }
}

impl Eq for FileChange {}

impl FileChange {
  pub fn new(filename: impl Into<String>, status: FileStatus, diff: BlobRef) -> Self {
    let filename = filename.into();
    Self {
      source_filename: filename.clone(),
      filename,
      source_revision: Revision::Unknown,
      dest_revision: Revision::Unknown,
      status,
      binary: false,
      diff,
      parent_diff: None,
      commit_id: None,
      counts: OnceCell::new()
    }
  }

  pub fn with_source(mut self, source_filename: impl Into<String>, source_revision: Revision) -> Self {
    self.source_filename = source_filename.into();
    self.source_revision = source_revision;
    self
  }

  pub fn with_dest_revision(mut self, dest_revision: Revision) -> Self {
    self.dest_revision = dest_revision;
    self
  }

  pub fn with_commit_id(mut self, commit_id: impl Into<String>) -> Self {
    self.commit_id = Some(commit_id.into());
    self
  }

  /// The file was renamed or moved by this change.
  pub fn is_rename(&self) -> bool {
    self.source_filename != self.filename
  }

  /// Line counts of this change's diff, computed once.
  pub fn line_counts(&self, store: &dyn BlobStore) -> Result<LineCounts, LineCountError> {
    self
      .counts
      .get_or_try_init(|| {
        let data = store.get(&self.diff).ok_or(LineCountError::MissingBlob(self.diff))?;
        log::debug!("Computing line counts for {} from blob {}", self.filename, self.diff);
        compute_line_counts(&data)
      })
      .copied()
  }

  /// Like [`line_counts`](Self::line_counts) but diffs the full old and new
  /// contents for the change-block counts. Shares the same cache.
  pub fn line_counts_with_content(
    &self,
    store: &dyn BlobStore,
    old: &str,
    new: &str
  ) -> Result<LineCounts, LineCountError> {
    self
      .counts
      .get_or_try_init(|| {
        let data = store.get(&self.diff).ok_or(LineCountError::MissingBlob(self.diff))?;
        log::debug!("Computing line counts for {} from full contents", self.filename);
        compute_line_counts_with_content(&data, old, new)
      })
      .copied()
  }

  /// Counts computed so far, if any.
  pub fn cached_line_counts(&self) -> Option<LineCounts> {
    self.counts.get().copied()
  }
}

/// One commit of an uploaded series.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Commit {
  pub commit_id: String,
  pub parent_id: String,
  pub author:    Signature,
  pub committer: Option<Signature>,
  pub message:   String,
  pub files:     Vec<FileChange>
}

impl Commit {
  pub fn new(commit_id: impl Into<String>, parent_id: impl Into<String>, author: Signature) -> Self {
    Self {
      commit_id: commit_id.into(),
      parent_id: parent_id.into(),
      author,
      committer: None,
      message: String::new(),
      files: Vec::new()
    }
  }

  pub fn with_files(mut self, files: Vec<FileChange>) -> Self {
    let commit_id = self.commit_id.clone();
    self.files = files
      .into_iter()
      .map(|file| file.with_commit_id(commit_id.clone()))
      .collect();
    self
  }

  pub fn with_message(mut self, message: impl Into<String>) -> Self {
    self.message = message.into();
    self
  }

  /// The file change touching `filename` in this commit.
  pub fn file(&self, filename: &str) -> Option<(usize, &FileChange)> {
    self
      .files
      .iter()
      .enumerate()
      .find(|(_, file)| file.filename == filename)
  }
}
