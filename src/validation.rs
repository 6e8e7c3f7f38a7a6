//! Cross-commit validation of file existence.
//!
//! [`ValidationInfo`] records, for every uploaded commit, which files it
//! added, removed or modified. Later commits are checked against it before
//! the repository is asked.

use std::collections::{BTreeMap, HashSet};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::diff::{FileStatus, Revision};
use crate::graph::FileChange;

#[derive(Error, Debug)]
pub enum ValidationError {
  #[error("Commit {0} has already been recorded")]
  DuplicateCommit(String),

  #[error("Parent {parent_id} of commit {commit_id} has not been recorded")]
  UnknownParent { commit_id: String, parent_id: String },

  #[error("Validation history loops back to commit {0}")]
  Cycle(String),

  #[error("Invalid validation data: {0}")]
  Decode(#[from] serde_json::Error),

  #[error(transparent)]
  Repository(#[from] anyhow::Error)
}

pub type ValidationResult<T> = Result<T, ValidationError>;

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct FileRef {
  pub filename: String,
  pub revision: String
}

impl FileRef {
  fn new(filename: &str, revision: &Revision) -> Self {
    Self { filename: filename.to_string(), revision: revision.as_token().to_string() }
  }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TreeChanges {
  pub added:    Vec<FileRef>,
  pub removed:  Vec<FileRef>,
  pub modified: Vec<FileRef>
}

impl TreeChanges {
  fn present(&self) -> impl Iterator<Item = &FileRef> {
    self.added.iter().chain(&self.modified)
  }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationEntry {
  pub parent_id: String,
  pub tree:      TreeChanges
}

/// How history entries are matched against a file.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum MatchMode {
  /// Path and exact revision.
  #[default]
  Strict,
  /// Path only, for backends without per-file revisions.
  Loose
}

impl MatchMode {
  pub fn from_loose(loose: bool) -> Self {
    if loose {
      MatchMode::Loose
    } else {
      MatchMode::Strict
    }
  }
}

/// Outcome of a history lookup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HistoryLookup {
  /// Recorded by `commit_id` at `revision`.
  Present { commit_id: String, revision: Revision },
  /// Recorded as removed by `commit_id`.
  RecordedAbsent { commit_id: String },
  /// Nothing recorded; ask the repository.
  Unknown
}

/// Commit id to the changes it made, serialized as a JSON object.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ValidationInfo(BTreeMap<String, ValidationEntry>);

impl ValidationInfo {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn len(&self) -> usize {
    self.0.len()
  }

  pub fn is_empty(&self) -> bool {
    self.0.is_empty()
  }

  pub fn get(&self, commit_id: &str) -> Option<&ValidationEntry> {
    self.0.get(commit_id)
  }

  pub fn insert(&mut self, commit_id: impl Into<String>, entry: ValidationEntry) -> Option<ValidationEntry> {
    self.0.insert(commit_id.into(), entry)
  }

  /// Fails unless `commit_id` is new and `parent_id` is known (or the map is
  /// empty).
  pub fn check_can_add(&self, commit_id: &str, parent_id: &str) -> ValidationResult<()> {
    if self.0.contains_key(commit_id) {
      return Err(ValidationError::DuplicateCommit(commit_id.to_string()));
    }
    if !self.0.is_empty() && !self.0.contains_key(parent_id) {
      return Err(ValidationError::UnknownParent {
        commit_id: commit_id.to_string(),
        parent_id: parent_id.to_string()
      });
    }
    Ok(())
  }

  /// Records `changes` as the tree changes of `commit_id`.
  pub fn update(&mut self, commit_id: &str, parent_id: &str, changes: &[FileChange]) -> ValidationResult<()> {
    self.check_can_add(commit_id, parent_id)?;

    let mut tree = TreeChanges::default();
    for change in changes {
      let source = FileRef::new(&change.source_filename, &change.source_revision);
      let dest = FileRef::new(&change.filename, &change.dest_revision);
      match change.status {
        FileStatus::Deleted => tree.removed.push(source),
        FileStatus::Added | FileStatus::Copied => tree.added.push(dest),
        FileStatus::Moved => {
          tree.modified.push(dest);
          tree.removed.push(source);
        }
        FileStatus::Modified | FileStatus::Unchanged => tree.modified.push(dest)
      }
    }

    log::debug!(
      "Recording commit {} (parent {}): {} added, {} removed, {} modified",
      commit_id,
      parent_id,
      tree.added.len(),
      tree.removed.len(),
      tree.modified.len()
    );
    self.0.insert(commit_id.to_string(), ValidationEntry { parent_id: parent_id.to_string(), tree });
    Ok(())
  }

  /// Walks from `start` toward the root looking for `path`.
  pub fn lookup(&self, start: &str, path: &str, revision: &Revision, mode: MatchMode) -> ValidationResult<HistoryLookup> {
    let token = revision.as_token();
    let mut visited = HashSet::new();
    let mut commit_id = start;

    while let Some(entry) = self.0.get(commit_id) {
      if !visited.insert(commit_id) {
        return Err(ValidationError::Cycle(commit_id.to_string()));
      }

      let removed = entry.tree.removed.iter().any(|file| file.filename == path);
      match mode {
        MatchMode::Strict => {
          if revision.is_unknown() && removed {
            return Ok(HistoryLookup::RecordedAbsent { commit_id: commit_id.to_string() });
          }
          if entry
            .tree
            .present()
            .any(|file| file.filename == path && file.revision == token)
          {
            return Ok(HistoryLookup::Present { commit_id: commit_id.to_string(), revision: revision.clone() });
          }
        }
        MatchMode::Loose => {
          if let Some(file) = entry.tree.present().find(|file| file.filename == path) {
            return Ok(HistoryLookup::Present {
              commit_id: commit_id.to_string(),
              revision:  Revision::from_token(&file.revision)
            });
          }
          if removed {
            return Ok(HistoryLookup::RecordedAbsent { commit_id: commit_id.to_string() });
          }
        }
      }

      commit_id = &entry.parent_id;
    }

    Ok(HistoryLookup::Unknown)
  }

  /// Whether `path` at `revision` exists as of `start`, asking `fallback`
  /// only when the history has no record of it.
  pub fn file_exists_in_history<F>(
    &self,
    start: &str,
    path: &str,
    revision: &Revision,
    mode: MatchMode,
    fallback: F
  ) -> ValidationResult<bool>
  where
    F: FnOnce(&str, &Revision) -> anyhow::Result<bool>
  {
    match self.lookup(start, path, revision, mode)? {
      HistoryLookup::Present { .. } => Ok(true),
      HistoryLookup::RecordedAbsent { .. } => Ok(false),
      HistoryLookup::Unknown => {
        log::debug!("No history for {}@{}, asking the repository", path, revision);
        Ok(fallback(path, revision)?)
      }
    }
  }

  pub fn encode(&self) -> ValidationResult<String> {
    Ok(serde_json::to_string(self)?)
  }

  pub fn decode(data: &str) -> ValidationResult<Self> {
    Ok(serde_json::from_str(data)?)
  }
}
