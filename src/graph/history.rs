use std::collections::{BTreeSet, HashMap};

use serde::Serialize;
use thiserror::Error;

use super::commit::Commit;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum GraphError {
  #[error("Commit {0} appears more than once")]
  DuplicateCommit(String),

  #[error("Commit {parent_id} has more than one child ({first} and {second})")]
  NonLinearHistory { parent_id: String, first: String, second: String },

  #[error("The commit series has more than one root ({first} and {second})")]
  MultipleRoots { first: String, second: String },

  #[error("Commit {0} is not connected to the series root")]
  Disconnected(String),

  #[error("Commit {0} is not part of this series")]
  UnknownCommit(String)
}

/// Linear ancestry of one commit series, root first.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommitGraph {
  order:     Vec<String>,
  positions: HashMap<String, usize>,
  parents:   HashMap<String, String>
}

impl CommitGraph {
  /// Builds the graph and checks that the commits form a single chain.
  pub fn build(commits: &[Commit]) -> Result<Self, GraphError> {
    let mut parents = HashMap::with_capacity(commits.len());
    for commit in commits {
      if parents
        .insert(commit.commit_id.clone(), commit.parent_id.clone())
        .is_some()
      {
        return Err(GraphError::DuplicateCommit(commit.commit_id.clone()));
      }
    }

    // A commit whose parent is outside the series is a root
    let mut children: HashMap<&str, &str> = HashMap::with_capacity(commits.len());
    let mut root: Option<&str> = None;
    for commit in commits {
      if parents.contains_key(&commit.parent_id) {
        if let Some(first) = children.insert(commit.parent_id.as_str(), commit.commit_id.as_str()) {
          return Err(GraphError::NonLinearHistory {
            parent_id: commit.parent_id.clone(),
            first:     first.to_string(),
            second:    commit.commit_id.clone()
          });
        }
      } else if let Some(first) = root.replace(commit.commit_id.as_str()) {
        return Err(GraphError::MultipleRoots { first: first.to_string(), second: commit.commit_id.clone() });
      }
    }

    let mut order = Vec::with_capacity(commits.len());
    let mut next = root;
    while let Some(commit_id) = next {
      order.push(commit_id.to_string());
      next = children.get(commit_id).copied();
    }

    // Every commit reachable from the root; anything left over sits on a cycle
    if let Some(stray) = commits.iter().find(|commit| !order.contains(&commit.commit_id)) {
      return Err(GraphError::Disconnected(stray.commit_id.clone()));
    }

    let positions = order
      .iter()
      .enumerate()
      .map(|(index, commit_id)| (commit_id.clone(), index))
      .collect();

    log::debug!("Built commit graph with {} commits", order.len());
    Ok(Self { order, positions, parents })
  }

  pub fn len(&self) -> usize {
    self.order.len()
  }

  pub fn is_empty(&self) -> bool {
    self.order.is_empty()
  }

  pub fn contains(&self, commit_id: &str) -> bool {
    self.positions.contains_key(commit_id)
  }

  /// Commit ids, root first.
  pub fn order(&self) -> &[String] {
    &self.order
  }

  pub fn position(&self, commit_id: &str) -> Option<usize> {
    self.positions.get(commit_id).copied()
  }

  pub fn parent(&self, commit_id: &str) -> Option<&str> {
    self
      .parents
      .get(commit_id)
      .filter(|parent| self.contains(parent))
      .map(String::as_str)
  }

  pub fn root(&self) -> Option<&str> {
    self.order.first().map(String::as_str)
  }

  pub fn tip(&self) -> Option<&str> {
    self.order.last().map(String::as_str)
  }

  /// Walks parent pointers from `commit_id`, nearest first.
  pub fn ancestors<'a>(&'a self, commit_id: &str) -> impl Iterator<Item = &'a str> + 'a {
    let end = self.position(commit_id).unwrap_or(0);
    self.order[..end].iter().rev().map(String::as_str)
  }

  /// The closed set of commits reachable from `tip`.
  pub fn interval(&self, tip: &str) -> Result<Interval, GraphError> {
    let end = self
      .position(tip)
      .ok_or_else(|| GraphError::UnknownCommit(tip.to_string()))?;
    Ok(Interval(self.order[..=end].iter().cloned().collect()))
  }

  /// Commits after `base` up to and including `tip`.
  pub fn interval_between(&self, base: &str, tip: &str) -> Result<Interval, GraphError> {
    let start = self
      .position(base)
      .ok_or_else(|| GraphError::UnknownCommit(base.to_string()))?;
    let end = self
      .position(tip)
      .ok_or_else(|| GraphError::UnknownCommit(tip.to_string()))?;
    if start >= end {
      return Ok(Interval::default());
    }
    Ok(Interval(self.order[start + 1..=end].iter().cloned().collect()))
  }
}

/// A set of commit ids that bounds ancestor searches.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Interval(BTreeSet<String>);

impl Interval {
  pub fn contains(&self, commit_id: &str) -> bool {
    self.0.contains(commit_id)
  }

  pub fn len(&self) -> usize {
    self.0.len()
  }

  pub fn is_empty(&self) -> bool {
    self.0.is_empty()
  }

  pub fn iter(&self) -> impl Iterator<Item = &str> {
    self.0.iter().map(String::as_str)
  }
}

impl FromIterator<String> for Interval {
  fn from_iter<I: IntoIterator<Item = String>>(iter: I) -> Self {
    Interval(iter.into_iter().collect())
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum HistoryEntryKind {
  Unmodified,
  Removed,
  Added
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HistoryEntry<'a> {
  pub kind:   HistoryEntryKind,
  pub commit: &'a Commit
}

/// Compares two commit series that share a common prefix.
///
/// Commits match while their ids agree; after the first difference every
/// remaining old commit is removed and every remaining new commit added.
pub fn diff_history<'a>(old: &'a [Commit], new: &'a [Commit]) -> Vec<HistoryEntry<'a>> {
  let common = old
    .iter()
    .zip(new)
    .take_while(|(a, b)| a.commit_id == b.commit_id)
    .count();

  let unmodified = new[..common]
    .iter()
    .map(|commit| HistoryEntry { kind: HistoryEntryKind::Unmodified, commit });
  let removed = old[common..]
    .iter()
    .map(|commit| HistoryEntry { kind: HistoryEntryKind::Removed, commit });
  let added = new[common..]
    .iter()
    .map(|commit| HistoryEntry { kind: HistoryEntryKind::Added, commit });

  unmodified.chain(removed).chain(added).collect()
}
