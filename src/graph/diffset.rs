use std::collections::HashSet;

use once_cell::sync::OnceCell;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use super::commit::{Commit, FileChange, LineCountError, LineCounts};
use super::history::{CommitGraph, GraphError, Interval};
use crate::diff::FileStatus;
use crate::profile;
use crate::store::BlobStore;

/// Position of a file change inside a [`DiffSet`].
#[derive(Debug, Clone, Copy)]
pub struct FileChangeRef<'a> {
  pub commit: &'a Commit,
  pub index:  usize
}

impl<'a> FileChangeRef<'a> {
  pub fn file(&self) -> &'a FileChange {
    &self.commit.files[self.index]
  }

  fn key(&self) -> (&'a str, usize) {
    (self.commit.commit_id.as_str(), self.index)
  }
}

impl PartialEq for FileChangeRef<'_> {
  fn eq(&self, other: &Self) -> bool {
    self.key() == other.key()
  }
}

impl Eq for FileChangeRef<'_> {}

/// One uploaded revision of a commit series.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiffSet {
  pub revision:       u32,
  pub base_commit_id: Option<String>,
  pub commits:        Vec<Commit>,
  #[serde(skip)]
  graph:              OnceCell<CommitGraph>
}

impl DiffSet {
  pub fn new(revision: u32, base_commit_id: Option<String>, commits: Vec<Commit>) -> Self {
    Self { revision, base_commit_id, commits, graph: OnceCell::new() }
  }

  /// The ancestry graph, built on first use.
  pub fn graph(&self) -> Result<&CommitGraph, GraphError> {
    self.graph.get_or_try_init(|| {
      profile!("Build commit graph");
      CommitGraph::build(&self.commits)
    })
  }

  pub fn commit(&self, commit_id: &str) -> Option<&Commit> {
    self
      .commits
      .iter()
      .find(|commit| commit.commit_id == commit_id)
  }

  /// Nearest strictly earlier change to the same logical file.
  ///
  /// Renames are followed through `source_filename`. An added file has no
  /// ancestor. `None` means nothing was found inside this series (and
  /// `interval`, when given), not that the file did not exist.
  pub fn find_ancestor<'a>(
    &'a self,
    commit_id: &str,
    file: &FileChange,
    interval: Option<&Interval>
  ) -> Result<Option<FileChangeRef<'a>>, GraphError> {
    if file.status == FileStatus::Added {
      return Ok(None);
    }

    let graph = self.graph()?;
    if !graph.contains(commit_id) {
      return Err(GraphError::UnknownCommit(commit_id.to_string()));
    }

    let filename = file.source_filename.as_str();
    for ancestor_id in graph.ancestors(commit_id) {
      if interval.is_some_and(|interval| !interval.contains(ancestor_id)) {
        log::debug!("Ancestor search for {} left the interval at {}", filename, ancestor_id);
        break;
      }

      let Some(commit) = self.commit(ancestor_id) else {
        continue;
      };
      if let Some((index, _)) = commit.file(filename) {
        return Ok(Some(FileChangeRef { commit, index }));
      }
    }
    Ok(None)
  }

  /// Every earlier change to the same logical file, nearest first.
  pub fn ancestors<'a>(
    &'a self,
    commit_id: &str,
    file: &FileChange,
    interval: Option<&Interval>
  ) -> Result<Vec<FileChangeRef<'a>>, GraphError> {
    let mut chain: Vec<FileChangeRef<'a>> = Vec::new();
    let mut next = self.find_ancestor(commit_id, file, interval)?;
    while let Some(found) = next {
      chain.push(found);
      next = self.find_ancestor(&found.commit.commit_id, found.file(), interval)?;
    }
    Ok(chain)
  }

  /// The oldest change in `file`'s ancestry, or `None` if it has none.
  pub fn base_file_change<'a>(
    &'a self,
    commit_id: &str,
    file: &FileChange,
    interval: Option<&Interval>
  ) -> Result<Option<FileChangeRef<'a>>, GraphError> {
    Ok(self.ancestors(commit_id, file, interval)?.pop())
  }

  /// Drops every change that is an ancestor of another change in `changes`.
  ///
  /// A copy leaves its source in place, so it never supersedes it.
  pub fn exclude_ancestors<'a>(
    &'a self,
    changes: &[FileChangeRef<'a>],
    interval: Option<&Interval>
  ) -> Result<Vec<FileChangeRef<'a>>, GraphError> {
    let mut superseded = HashSet::new();
    for change in changes {
      if change.file().status == FileStatus::Copied {
        continue;
      }
      if let Some(ancestor) = self.find_ancestor(&change.commit.commit_id, change.file(), interval)? {
        superseded.insert(ancestor.key());
      }
    }

    Ok(
      changes
        .iter()
        .filter(|change| !superseded.contains(&change.key()))
        .copied()
        .collect()
    )
  }

  /// Net changes across the series: the latest change of each file.
  pub fn latest_file_changes(&self, interval: Option<&Interval>) -> Result<Vec<FileChangeRef<'_>>, GraphError> {
    let graph = self.graph()?;
    let changes: Vec<FileChangeRef<'_>> = graph
      .order()
      .iter()
      .filter(|commit_id| interval.map_or(true, |interval| interval.contains(commit_id)))
      .filter_map(|commit_id| self.commit(commit_id))
      .flat_map(|commit| (0..commit.files.len()).map(move |index| FileChangeRef { commit, index }))
      .collect();

    self.exclude_ancestors(&changes, interval)
  }

  /// Line counts for every file change, computed in parallel.
  pub fn line_counts(&self, store: &dyn BlobStore) -> Result<Vec<LineCounts>, LineCountError> {
    profile!("Diffset line counts");
    self
      .commits
      .par_iter()
      .flat_map(|commit| commit.files.par_iter())
      .map(|file| file.line_counts(store))
      .collect()
  }
}
