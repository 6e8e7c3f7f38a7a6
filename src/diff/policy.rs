//! Repository-specific parsing policies.
//!
//! Revision syntax differs between version control systems, so the parser
//! never interprets revision tokens itself. It is configured with a
//! [`ParserPolicy`] holding a [`RevisionClassifier`] and a
//! [`MetadataExtractor`]. A [`PolicyRegistry`] maps backend names to
//! policies; build one at startup and pass it by reference.

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::Arc;

use once_cell::sync::Lazy;
use regex::Regex;

use super::types::Revision;

/// Classifies the revision token found in a file header.
pub trait RevisionClassifier: fmt::Debug + Send + Sync {
  fn classify(&self, token: &str) -> Revision;
}

/// Per-file metadata gathered from lines the parser does not recognize.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FileMetadata {
  pub orig_revision: Option<String>,
  pub new_revision:  Option<String>,
  pub extra:         BTreeMap<String, String>
}

/// Receives every unrecognized line preceding a file's header.
pub trait MetadataExtractor: fmt::Debug + Send + Sync {
  /// Returns true when the line was understood.
  fn extract(&self, line: &str, meta: &mut FileMetadata) -> bool;
}

fn is_hex(token: &str) -> bool {
  !token.is_empty() && token.chars().all(|c| c.is_ascii_hexdigit())
}

fn is_epoch(token: &str) -> bool {
  token.starts_with("1970-01-01 00:00:00") || token.starts_with("1969-12-31") || token.contains("Jan  1 00:00:00 1970")
}

/// Blob ids from `index` lines; all zeros means the file is new.
#[derive(Debug, Default, Clone, Copy)]
pub struct GitRevisions;

impl RevisionClassifier for GitRevisions {
  fn classify(&self, token: &str) -> Revision {
    let token = token.trim();
    if !is_hex(token) {
      Revision::Unknown
    } else if token.chars().all(|c| c == '0') {
      Revision::PreCreation
    } else {
      Revision::Known(token.to_string())
    }
  }
}

static SVN_REVISION: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\((?:revision|rev) (\d+)\)$").expect("Invalid svn revision pattern"));

/// `(revision N)`, `(working copy)` and `(nonexistent)` header suffixes.
#[derive(Debug, Default, Clone, Copy)]
pub struct SubversionRevisions;

impl RevisionClassifier for SubversionRevisions {
  fn classify(&self, token: &str) -> Revision {
    let token = token.trim();
    if token == "(working copy)" {
      return Revision::Head;
    }
    if token == "(nonexistent)" {
      return Revision::PreCreation;
    }

    match SVN_REVISION.captures(token) {
      Some(caps) if &caps[1] == "0" => Revision::PreCreation,
      Some(caps) => Revision::Known(caps[1].to_string()),
      None if !token.is_empty() && token.chars().all(|c| c.is_ascii_digit()) => Revision::Known(token.to_string()),
      None => Revision::Unknown
    }
  }
}

/// Changeset ids recorded by `diff -r` lines, falling back to timestamps.
#[derive(Debug, Default, Clone, Copy)]
pub struct MercurialRevisions;

impl RevisionClassifier for MercurialRevisions {
  fn classify(&self, token: &str) -> Revision {
    let token = token.trim();
    if is_hex(token) && token.len() >= 12 {
      GitRevisions.classify(token)
    } else {
      GenericRevisions.classify(token)
    }
  }
}

/// Plain `diff -u` output: timestamps carry no revision, except the epoch
/// which `diff -N` uses for absent files.
#[derive(Debug, Default, Clone, Copy)]
pub struct GenericRevisions;

impl RevisionClassifier for GenericRevisions {
  fn classify(&self, token: &str) -> Revision {
    if is_epoch(token.trim()) {
      Revision::PreCreation
    } else {
      Revision::Unknown
    }
  }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct NoMetadata;

impl MetadataExtractor for NoMetadata {
  fn extract(&self, _line: &str, _meta: &mut FileMetadata) -> bool {
    false
  }
}

/// `hg diff`/`hg export` preambles: `diff -r A -r B path`, `# Node ID`, `# Parent`.
#[derive(Debug, Default, Clone, Copy)]
pub struct MercurialMetadata;

impl MetadataExtractor for MercurialMetadata {
  fn extract(&self, line: &str, meta: &mut FileMetadata) -> bool {
    if let Some(rest) = line.strip_prefix("diff -r ") {
      let mut parts = rest.split_whitespace();
      meta.orig_revision = parts.next().map(str::to_string);
      if parts.next() == Some("-r") {
        meta.new_revision = parts.next().map(str::to_string);
      }
      return true;
    }
    if let Some(node) = line.strip_prefix("# Node ID ") {
      meta.extra.insert("node_id".into(), node.trim().to_string());
      return true;
    }
    if let Some(parent) = line.strip_prefix("# Parent ") {
      meta.extra.insert("parent".into(), parent.trim().to_string());
      return true;
    }
    false
  }
}

/// The set of strategies a [`DiffParser`](super::DiffParser) runs with.
#[derive(Debug, Clone)]
pub struct ParserPolicy {
  pub name:               String,
  pub revisions:          Arc<dyn RevisionClassifier>,
  pub metadata:           Arc<dyn MetadataExtractor>,
  /// Strip `a/` and `b/` style prefixes from git file names.
  pub strip_git_prefixes: bool
}

impl ParserPolicy {
  pub fn git() -> Self {
    Self {
      name:               "git".into(),
      revisions:          Arc::new(GitRevisions),
      metadata:           Arc::new(NoMetadata),
      strip_git_prefixes: true
    }
  }

  pub fn subversion() -> Self {
    Self {
      name:               "svn".into(),
      revisions:          Arc::new(SubversionRevisions),
      metadata:           Arc::new(NoMetadata),
      strip_git_prefixes: false
    }
  }

  pub fn mercurial() -> Self {
    Self {
      name:               "hg".into(),
      revisions:          Arc::new(MercurialRevisions),
      metadata:           Arc::new(MercurialMetadata),
      strip_git_prefixes: true
    }
  }

  pub fn generic() -> Self {
    Self {
      name:               "generic".into(),
      revisions:          Arc::new(GenericRevisions),
      metadata:           Arc::new(NoMetadata),
      strip_git_prefixes: true
    }
  }
}

impl Default for ParserPolicy {
  fn default() -> Self {
    Self::generic()
  }
}

/// Backend name to parser policy.
#[derive(Debug, Clone, Default)]
pub struct PolicyRegistry {
  policies: HashMap<String, ParserPolicy>
}

impl PolicyRegistry {
  pub fn new() -> Self {
    Self::default()
  }

  /// Registry with the git, svn, hg and generic policies.
  pub fn with_defaults() -> Self {
    let mut registry = Self::new();
    for policy in [ParserPolicy::git(), ParserPolicy::subversion(), ParserPolicy::mercurial(), ParserPolicy::generic()] {
      registry.register(policy.name.clone(), policy);
    }
    registry
  }

  /// Adds or replaces the policy for `name`.
  pub fn register(&mut self, name: impl Into<String>, policy: ParserPolicy) -> Option<ParserPolicy> {
    self.policies.insert(name.into(), policy)
  }

  pub fn get(&self, name: &str) -> Option<&ParserPolicy> {
    self.policies.get(name)
  }

  pub fn backends(&self) -> Vec<&str> {
    let mut names: Vec<&str> = self.policies.keys().map(String::as_str).collect();
    names.sort_unstable();
    names
  }
}
