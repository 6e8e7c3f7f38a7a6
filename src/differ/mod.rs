//! Line-level differencing.
//!
//! [`Differ`] runs a Myers diff over two line sequences and yields
//! [`Opcode`]s that tile both sides. [`analyze`] layers move detection,
//! interline regions and interesting-line extraction on top of the same
//! opcode stream.

pub mod interesting;
pub mod interline;
mod moves;

use std::borrow::Cow;
use std::collections::{BTreeMap, HashMap};
use std::convert::Infallible;
use std::fmt::{self, Display};

use serde::{Deserialize, Serialize};
use similar::algorithms::{myers, DiffHook, Replace};
use similar::DiffOp;

use crate::config::Settings;
use crate::profile;

pub use interesting::InterestingLines;
pub use interline::{changed_regions, Regions};

/// Classification of an opcode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Tag {
  Equal,
  Replace,
  Insert,
  Delete
}

impl Tag {
  pub fn as_str(&self) -> &'static str {
    match self {
      Tag::Equal => "equal",
      Tag::Replace => "replace",
      Tag::Insert => "insert",
      Tag::Delete => "delete"
    }
  }

  fn for_edit(old_len: usize, new_len: usize) -> Self {
    match (old_len, new_len) {
      (0, _) => Tag::Insert,
      (_, 0) => Tag::Delete,
      _ => Tag::Replace
    }
  }
}

impl Display for Tag {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.as_str())
  }
}

/// A range-addressed difference: `a[i1..i2]` relates to `b[j1..j2]` as `tag`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Opcode {
  pub tag: Tag,
  pub i1:  usize,
  pub i2:  usize,
  pub j1:  usize,
  pub j2:  usize
}

impl Opcode {
  pub fn new(tag: Tag, i1: usize, i2: usize, j1: usize, j2: usize) -> Self {
    Self { tag, i1, i2, j1, j2 }
  }

  /// The `(tag, i1, i2, j1, j2)` form consumed by renderers.
  pub fn as_tuple(&self) -> (Tag, usize, usize, usize, usize) {
    (self.tag, self.i1, self.i2, self.j1, self.j2)
  }

  pub fn old_len(&self) -> usize {
    self.i2 - self.i1
  }

  pub fn new_len(&self) -> usize {
    self.j2 - self.j1
  }

  /// The same operation as a `similar` [`DiffOp`].
  pub fn to_diff_op(&self) -> DiffOp {
    let (old_index, old_len, new_index, new_len) = (self.i1, self.old_len(), self.j1, self.new_len());
    match self.tag {
      Tag::Equal => DiffOp::Equal { old_index, new_index, len: old_len },
      Tag::Delete => DiffOp::Delete { old_index, old_len, new_index },
      Tag::Insert => DiffOp::Insert { old_index, new_index, new_len },
      Tag::Replace => DiffOp::Replace { old_index, old_len, new_index, new_len }
    }
  }
}

impl Display for Opcode {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "({}, {}, {}, {}, {})", self.tag, self.i1, self.i2, self.j1, self.j2)
  }
}

/// Collects `similar` edit events into coalesced opcodes.
#[derive(Debug, Default)]
pub(crate) struct OpcodeBuilder {
  ops: Vec<Opcode>
}

impl OpcodeBuilder {
  fn push_equal(&mut self, i1: usize, i2: usize, j1: usize, j2: usize) {
    if let Some(last) = self.ops.last_mut() {
      if last.tag == Tag::Equal && last.i2 == i1 && last.j2 == j1 {
        last.i2 = i2;
        last.j2 = j2;
        return;
      }
    }
    self.ops.push(Opcode::new(Tag::Equal, i1, i2, j1, j2));
  }

  fn push_edit(&mut self, i1: usize, i2: usize, j1: usize, j2: usize) {
    if let Some(last) = self.ops.last_mut() {
      if last.tag != Tag::Equal && last.i2 == i1 && last.j2 == j1 {
        last.i2 = i2;
        last.j2 = j2;
        last.tag = Tag::for_edit(last.old_len(), last.new_len());
        return;
      }
    }
    self.ops.push(Opcode::new(Tag::for_edit(i2 - i1, j2 - j1), i1, i2, j1, j2));
  }

  pub(crate) fn finish(self) -> Vec<Opcode> {
    self.ops
  }
}

impl DiffHook for OpcodeBuilder {
  type Error = Infallible;

  fn equal(&mut self, old: usize, new: usize, len: usize) -> Result<(), Infallible> {
    self.push_equal(old, old + len, new, new + len);
    Ok(())
  }

  fn delete(&mut self, old: usize, len: usize, new: usize) -> Result<(), Infallible> {
    self.push_edit(old, old + len, new, new);
    Ok(())
  }

  fn insert(&mut self, old: usize, new: usize, len: usize) -> Result<(), Infallible> {
    self.push_edit(old, old, new, new + len);
    Ok(())
  }

  fn replace(&mut self, old: usize, old_len: usize, new: usize, new_len: usize) -> Result<(), Infallible> {
    self.push_edit(old, old + old_len, new, new + new_len);
    Ok(())
  }
}

/// Diffs arbitrary comparable sequences into coalesced opcodes.
pub(crate) fn sequence_opcodes<T: PartialEq>(a: &[T], b: &[T]) -> Vec<Opcode> {
  let mut hook = Replace::new(OpcodeBuilder::default());
  match myers::diff(&mut hook, a, 0..a.len(), b, 0..b.len()) {
    Ok(()) => hook.into_inner().finish(),
    Err(never) => match never {}
  }
}

/// Line differ over two sequences of lines.
#[derive(Debug, Clone)]
pub struct Differ<'a, S> {
  a:            &'a [S],
  b:            &'a [S],
  ignore_space: bool
}

impl<'a, S: AsRef<str>> Differ<'a, S> {
  pub fn new(a: &'a [S], b: &'a [S]) -> Self {
    Self { a, b, ignore_space: false }
  }

  /// Compare lines with all whitespace removed.
  pub fn ignore_space(mut self, ignore: bool) -> Self {
    self.ignore_space = ignore;
    self
  }

  /// Computes the opcodes from scratch on every call.
  pub fn opcodes(&self) -> std::vec::IntoIter<Opcode> {
    profile!("Myers line diff");
    let (a, b) = self.intern();
    let ops = sequence_opcodes(&a, &b);
    log::debug!("Diffed {} against {} lines into {} opcodes", self.a.len(), self.b.len(), ops.len());
    ops.into_iter()
  }

  /// Maps every distinct line to a small integer so the search compares ids.
  fn intern(&self) -> (Vec<u32>, Vec<u32>) {
    let mut ids: HashMap<Cow<'a, str>, u32> = HashMap::with_capacity(self.a.len() + self.b.len());
    let ignore_space = self.ignore_space;

    let mut code = |line: &'a S| -> u32 {
      let key = if ignore_space {
        Cow::Owned(line.as_ref().split_whitespace().collect::<String>())
      } else {
        Cow::Borrowed(line.as_ref())
      };
      let next = ids.len() as u32;
      *ids.entry(key).or_insert(next)
    };

    let a = self.a.iter().map(&mut code).collect();
    let b = self.b.iter().map(&mut code).collect();
    (a, b)
  }
}

/// Diffs two line sequences.
pub fn diff<S: AsRef<str>>(a: &[S], b: &[S]) -> impl Iterator<Item = Opcode> {
  Differ::new(a, b).opcodes()
}

/// Per-opcode annotations.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct OpcodeMeta {
  /// 1-based old line to the 1-based new line it moved to.
  pub moved_to:   BTreeMap<usize, usize>,
  /// 1-based new line to the 1-based old line it moved from.
  pub moved_from: BTreeMap<usize, usize>,
  /// Changed byte ranges for a single-line replace.
  pub interline:  Option<(Regions, Regions)>
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AnnotatedOpcode {
  pub opcode: Opcode,
  pub meta:   OpcodeMeta
}

/// Result of a full analysis of one file pair.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DiffAnalysis {
  pub opcodes:     Vec<AnnotatedOpcode>,
  pub interesting: InterestingLines
}

impl DiffAnalysis {
  pub fn plain_opcodes(&self) -> impl Iterator<Item = Opcode> + '_ {
    self.opcodes.iter().map(|op| op.opcode)
  }
}

/// Diffs `a` against `b` and annotates the result with moves, interline
/// regions and interesting lines for `filename`.
pub fn analyze<S: AsRef<str>>(a: &[S], b: &[S], filename: &str, settings: &Settings) -> DiffAnalysis {
  profile!("Analyze diff");

  let mut opcodes: Vec<AnnotatedOpcode> = Differ::new(a, b)
    .ignore_space(settings.ignore_space)
    .opcodes()
    .map(|opcode| AnnotatedOpcode { opcode, meta: OpcodeMeta::default() })
    .collect();

  let mut scanner = interesting::Scanner::for_filename(filename);

  for op in opcodes.iter_mut() {
    let Opcode { tag, i1, i2, j1, j2 } = op.opcode;

    for i in i1..i2 {
      scanner.scan_orig(i, a[i].as_ref());
    }
    for j in j1..j2 {
      scanner.scan_new(j, b[j].as_ref());
    }

    if tag == Tag::Replace && op.opcode.old_len() == 1 && op.opcode.new_len() == 1 {
      op.meta.interline = changed_regions(
        a[i1].as_ref(),
        b[j1].as_ref(),
        settings.interline_min_ratio,
        settings.interline_max_line_len
      );
    }
  }

  moves::detect(a, b, &mut opcodes, settings.move_min_lines, settings.move_min_chars);

  DiffAnalysis { opcodes, interesting: scanner.finish() }
}
