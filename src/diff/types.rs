use std::collections::BTreeMap;
use std::fmt::{self, Display};

use serde::{Deserialize, Serialize};

pub const PRE_CREATION: &str = "PRE-CREATION";
pub const UNKNOWN: &str = "UNKNOWN";
pub const HEAD: &str = "HEAD";
pub const DEV_NULL: &str = "/dev/null";

/// A revision token, classified by a [`RevisionClassifier`](super::RevisionClassifier).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum Revision {
  /// The file does not exist before this change.
  PreCreation,
  /// No usable revision was recorded.
  Unknown,
  /// The working copy / tip revision.
  Head,
  Known(String)
}

impl Revision {
  pub fn from_token(token: &str) -> Self {
    match token.trim() {
      "" | UNKNOWN => Revision::Unknown,
      PRE_CREATION => Revision::PreCreation,
      HEAD => Revision::Head,
      other => Revision::Known(other.to_string())
    }
  }

  pub fn as_token(&self) -> &str {
    match self {
      Revision::PreCreation => PRE_CREATION,
      Revision::Unknown => UNKNOWN,
      Revision::Head => HEAD,
      Revision::Known(token) => token
    }
  }

  pub fn is_pre_creation(&self) -> bool {
    matches!(self, Revision::PreCreation)
  }

  pub fn is_unknown(&self) -> bool {
    matches!(self, Revision::Unknown)
  }
}

impl From<String> for Revision {
  fn from(token: String) -> Self {
    Revision::from_token(&token)
  }
}

impl From<Revision> for String {
  fn from(revision: Revision) -> Self {
    revision.as_token().to_string()
  }
}

impl Display for Revision {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.as_token())
  }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum FileStatus {
  Added,
  Deleted,
  Modified,
  Copied,
  Moved,
  Unchanged
}

impl FileStatus {
  pub fn as_str(&self) -> &'static str {
    match self {
      FileStatus::Added => "added",
      FileStatus::Deleted => "deleted",
      FileStatus::Modified => "modified",
      FileStatus::Copied => "copied",
      FileStatus::Moved => "moved",
      FileStatus::Unchanged => "unchanged"
    }
  }
}

impl Display for FileStatus {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.as_str())
  }
}

/// How a line was terminated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Eol {
  Lf,
  CrLf,
  /// Last line of a file without a trailing newline.
  Missing
}

impl Eol {
  pub fn as_bytes(&self) -> &'static [u8] {
    match self {
      Eol::Lf => b"\n",
      Eol::CrLf => b"\r\n",
      Eol::Missing => b""
    }
  }
}

/// One line of content, split from its terminator.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PatchLine {
  pub text: Vec<u8>,
  pub eol:  Eol
}

impl PatchLine {
  /// Splits a raw line (as produced by `split_inclusive(b'\n')`).
  pub fn from_raw(raw: &[u8]) -> Self {
    match raw.strip_suffix(b"\n") {
      Some(body) => match body.strip_suffix(b"\r") {
        Some(text) => Self { text: text.to_vec(), eol: Eol::CrLf },
        None => Self { text: body.to_vec(), eol: Eol::Lf }
      },
      None => Self { text: raw.to_vec(), eol: Eol::Missing }
    }
  }

  pub fn write_to(&self, out: &mut Vec<u8>) {
    out.extend_from_slice(&self.text);
    out.extend_from_slice(self.eol.as_bytes());
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LineKind {
  Context,
  Delete,
  Insert
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HunkLine {
  pub kind: LineKind,
  pub line: PatchLine
}

/// One contiguous block of changes with its context.
///
/// Context-format hunks are merged into the same line sequence as unified
/// hunks, so both apply identically.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Hunk {
  pub old_start: usize,
  pub old_len:   usize,
  pub new_start: usize,
  pub new_len:   usize,
  pub section:   String,
  pub lines:     Vec<HunkLine>
}

impl Hunk {
  pub fn inserts(&self) -> usize {
    self.lines.iter().filter(|l| l.kind == LineKind::Insert).count()
  }

  pub fn deletes(&self) -> usize {
    self.lines.iter().filter(|l| l.kind == LineKind::Delete).count()
  }

  /// Lines the hunk expects in the original.
  pub fn old_lines(&self) -> impl Iterator<Item = &PatchLine> {
    self
      .lines
      .iter()
      .filter(|l| l.kind != LineKind::Insert)
      .map(|l| &l.line)
  }

  /// Lines the hunk produces.
  pub fn new_lines(&self) -> impl Iterator<Item = &PatchLine> {
    self
      .lines
      .iter()
      .filter(|l| l.kind != LineKind::Delete)
      .map(|l| &l.line)
  }
}

/// One file's worth of a parsed diff.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedFileChange {
  pub orig_file:     String,
  pub orig_info:     String,
  pub new_file:      String,
  pub new_info:      String,
  pub orig_revision: Revision,
  pub new_revision:  Revision,
  pub status:        FileStatus,
  /// Raw bytes of this file's section of the diff, headers included.
  pub data:          Vec<u8>,
  pub binary:        bool,
  pub insert_count:  usize,
  pub delete_count:  usize,
  pub hunks:         Vec<Hunk>,
  pub old_mode:      Option<String>,
  pub new_mode:      Option<String>,
  pub similarity:    Option<u8>,
  pub extra:         BTreeMap<String, String>
}

impl ParsedFileChange {
  pub fn is_new(&self) -> bool {
    self.orig_revision.is_pre_creation()
  }

  pub fn is_deleted(&self) -> bool {
    self.status == FileStatus::Deleted
  }

  /// A rename with identical content.
  pub fn is_pure_rename(&self) -> bool {
    self.status == FileStatus::Moved && self.hunks.is_empty() && self.similarity == Some(100)
  }

  /// Recounts inserted and deleted lines from the hunks.
  pub fn count_lines(&self) -> (usize, usize) {
    self
      .hunks
      .iter()
      .fold((0, 0), |(ins, del), hunk| (ins + hunk.inserts(), del + hunk.deletes()))
  }
}
