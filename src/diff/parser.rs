//! Diff text parsing.
//!
//! Understands unified and context diffs, git extended headers, `Index:`
//! preambles and binary markers. Revision tokens are classified through the
//! parser's [`ParserPolicy`].

use std::mem;

use once_cell::sync::Lazy;
use regex::Regex;
use thiserror::Error;

use super::policy::{FileMetadata, ParserPolicy, PolicyRegistry};
use super::traits::{ByteLines, Utf8String};
use super::types::*;
use crate::profile;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DiffParserError {
  #[error("The diff contains no file changes")]
  EmptyDiff,

  #[error("Invalid hunk header at line {line}: {header}")]
  InvalidHunkHeader { line: usize, header: String },

  #[error("Hunk starting at line {line} is truncated")]
  TruncatedHunk { line: usize },

  #[error("Hunk starting at line {line} is malformed: {reason}")]
  MalformedHunk { line: usize, reason: String },

  #[error("Unexpected hunk at line {line} before any file header")]
  UnexpectedLine { line: usize },

  #[error("No diff parser policy registered for backend {0:?}")]
  UnknownBackend(String)
}

type ParseResult<T> = Result<T, DiffParserError>;

static UNIFIED_HUNK: Lazy<Regex> =
  Lazy::new(|| Regex::new(r"^@@ -(\d+)(?:,(\d+))? \+(\d+)(?:,(\d+))? @@ ?(.*)$").expect("Invalid hunk pattern"));
static CONTEXT_OLD_RANGE: Lazy<Regex> =
  Lazy::new(|| Regex::new(r"^\*\*\* (\d+)(?:,(\d+))? \*\*\*\*").expect("Invalid context pattern"));
static CONTEXT_NEW_RANGE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^--- (\d+)(?:,(\d+))? ----").expect("Invalid context pattern"));

const CONTEXT_SEPARATOR: &str = "***************";

/// Prefixes git puts in front of paths (a/, b/, and the c/i/w/o variants
/// produced by `diff.mnemonicPrefix`).
const GIT_PREFIXES: [&str; 6] = ["a/", "b/", "c/", "i/", "w/", "o/"];

fn line_text(raw: &[u8]) -> String {
  let raw = raw.strip_suffix(b"\n").unwrap_or(raw);
  let raw = raw.strip_suffix(b"\r").unwrap_or(raw);
  raw.to_utf8()
}

fn strip_git_prefix(path: &str) -> String {
  if path == DEV_NULL {
    return path.to_string();
  }
  GIT_PREFIXES
    .iter()
    .find_map(|prefix| path.strip_prefix(prefix))
    .unwrap_or(path)
    .to_string()
}

fn unquote(name: &str) -> &str {
  name
    .strip_prefix('"')
    .and_then(|n| n.strip_suffix('"'))
    .unwrap_or(name)
}

/// Splits a `---`/`+++`/`***` header value into file name and info.
fn split_header_name(value: &str) -> (String, String) {
  let (name, info) = match value.split_once('\t') {
    Some((name, info)) => (name, info.trim()),
    None => match value.split_once("  ") {
      Some((name, info)) => (name, info.trim()),
      None => (value.trim_end(), "")
    }
  };
  (unquote(name).to_string(), info.to_string())
}

/// Extracts both paths from the remainder of a `diff --git` line.
fn split_git_names(rest: &str) -> Option<(String, String)> {
  let rest = rest.trim();
  if let Some((orig, new)) = rest.split_once("\" \"") {
    return Some((unquote(&format!("{orig}\"")).to_string(), unquote(&format!("\"{new}")).to_string()));
  }

  // Prefer the split where the second path carries a prefix
  for prefix in GIT_PREFIXES {
    let needle = format!(" {prefix}");
    if let Some(index) = rest.find(&needle) {
      let (orig, new) = (&rest[..index], &rest[index + 1..]);
      if GIT_PREFIXES.iter().any(|p| orig.starts_with(p)) {
        return Some((orig.to_string(), new.to_string()));
      }
    }
  }

  // --no-prefix with identical names
  let bytes = rest.as_bytes();
  if bytes.len() % 2 == 1 {
    let half = bytes.len() / 2;
    if bytes[half] == b' ' && rest[..half] == rest[half + 1..] {
      return Some((rest[..half].to_string(), rest[half + 1..].to_string()));
    }
  }

  let mut parts = rest.split_whitespace();
  Some((parts.next()?.to_string(), parts.next()?.to_string()))
}

fn is_binary_marker(text: &str) -> bool {
  (text.starts_with("Binary files ") && text.ends_with(" differ"))
    || text.starts_with("GIT binary patch")
    || text.starts_with("Cannot display: file marked as a binary type.")
}

fn parse_number(text: &str, line: usize, header: &str) -> ParseResult<usize> {
  text
    .parse()
    .map_err(|_| DiffParserError::InvalidHunkHeader { line, header: header.to_string() })
}

/// File state accumulated while scanning.
#[derive(Debug, Default)]
struct FileBuilder {
  git:           bool,
  data:          Vec<u8>,
  orig_file:     Option<String>,
  orig_info:     String,
  new_file:      Option<String>,
  new_info:      String,
  header_seen:   bool,
  context:       bool,
  hunks:         Vec<Hunk>,
  binary:        bool,
  new_file_mode: bool,
  deleted_mode:  bool,
  old_mode:      Option<String>,
  new_mode:      Option<String>,
  similarity:    Option<u8>,
  rename_from:   Option<String>,
  rename_to:     Option<String>,
  copy_from:     Option<String>,
  copy_to:       Option<String>,
  index:         Option<(String, String)>,
  meta:          FileMetadata
}

impl FileBuilder {
  fn push_lines(&mut self, lines: &[&[u8]]) {
    for raw in lines {
      self.data.extend_from_slice(raw);
    }
  }

  fn accepts_header(&self) -> bool {
    !self.header_seen && self.hunks.is_empty() && !self.binary
  }

  /// Handles one git extended header line.
  fn git_extended_header(&mut self, text: &str) -> bool {
    if let Some(mode) = text.strip_prefix("new file mode ") {
      self.new_file_mode = true;
      self.new_mode = Some(mode.trim().to_string());
    } else if let Some(mode) = text.strip_prefix("deleted file mode ") {
      self.deleted_mode = true;
      self.old_mode = Some(mode.trim().to_string());
    } else if let Some(mode) = text.strip_prefix("old mode ") {
      self.old_mode = Some(mode.trim().to_string());
    } else if let Some(mode) = text.strip_prefix("new mode ") {
      self.new_mode = Some(mode.trim().to_string());
    } else if let Some(value) = text.strip_prefix("similarity index ") {
      self.similarity = value.trim().trim_end_matches('%').parse().ok();
    } else if text.starts_with("dissimilarity index ") {
      // informational only
    } else if let Some(path) = text.strip_prefix("rename from ").or_else(|| text.strip_prefix("rename old ")) {
      self.rename_from = Some(unquote(path).to_string());
    } else if let Some(path) = text.strip_prefix("rename to ").or_else(|| text.strip_prefix("rename new ")) {
      self.rename_to = Some(unquote(path).to_string());
    } else if let Some(path) = text.strip_prefix("copy from ") {
      self.copy_from = Some(unquote(path).to_string());
    } else if let Some(path) = text.strip_prefix("copy to ") {
      self.copy_to = Some(unquote(path).to_string());
    } else if let Some(value) = text.strip_prefix("index ") {
      let range = value.split_whitespace().next().unwrap_or_default();
      if let Some((orig, new)) = range.split_once("..") {
        self.index = Some((orig.to_string(), new.to_string()));
      }
      if let Some(mode) = value.split_whitespace().nth(1) {
        self.old_mode.get_or_insert_with(|| mode.to_string());
        self.new_mode.get_or_insert_with(|| mode.to_string());
      }
    } else {
      return false;
    }
    true
  }
}

/// Parses raw diff bytes into per-file change records.
#[derive(Debug, Clone, Default)]
pub struct DiffParser {
  policy:   ParserPolicy,
  base_dir: Option<String>
}

impl DiffParser {
  pub fn new(policy: ParserPolicy) -> Self {
    Self { policy, base_dir: None }
  }

  /// Parser configured with the policy registered for `backend`.
  pub fn for_backend(registry: &PolicyRegistry, backend: &str) -> ParseResult<Self> {
    registry
      .get(backend)
      .cloned()
      .map(Self::new)
      .ok_or_else(|| DiffParserError::UnknownBackend(backend.to_string()))
  }

  /// Prefix applied to relative file names.
  pub fn with_base_dir(mut self, base_dir: impl Into<String>) -> Self {
    let base_dir = base_dir.into();
    self.base_dir = (!base_dir.trim_matches('/').is_empty()).then_some(base_dir);
    self
  }

  pub fn policy(&self) -> &ParserPolicy {
    &self.policy
  }

  /// Parses `data` into one record per file.
  ///
  /// Fails with [`DiffParserError::EmptyDiff`] when no file was found.
  pub fn parse(&self, data: &[u8]) -> ParseResult<Vec<ParsedFileChange>> {
    profile!("Parse diff");
    log::debug!("Parsing diff of {} bytes with the {} policy", data.len(), self.policy.name);

    let lines = data.raw_lines();
    let mut files = Vec::new();
    let mut current: Option<FileBuilder> = None;
    // Lines seen before the next file's header
    let mut pending = FileBuilder::default();
    let mut i = 0;

    while i < lines.len() {
      let raw = lines[i];
      let text = line_text(raw);
      let next = lines.get(i + 1).map(|raw| line_text(raw)).unwrap_or_default();

      if let Some(rest) = text.strip_prefix("diff --git ") {
        self.finish(current.take(), &mut files);
        let mut file = mem::take(&mut pending);
        file.git = true;
        if let Some((orig, new)) = split_git_names(rest) {
          file.orig_file = Some(self.git_name(&orig));
          file.new_file = Some(self.git_name(&new));
        }
        file.push_lines(&lines[i..=i]);
        current = Some(file);
        i += 1;
        continue;
      }

      if let Some(name) = text.strip_prefix("Index: ") {
        if next.starts_with("====") {
          self.finish(current.take(), &mut files);
          let mut file = mem::take(&mut pending);
          file.orig_file = Some(name.trim().to_string());
          file.new_file = Some(name.trim().to_string());
          file.push_lines(&lines[i..i + 2]);
          current = Some(file);
          i += 2;
          continue;
        }
      }

      let unified_header = text.starts_with("--- ") && next.starts_with("+++ ");
      let context_header = text.starts_with("*** ") && !text.starts_with(CONTEXT_SEPARATOR) && next.starts_with("--- ");
      if unified_header || context_header {
        let mut file = match current.take() {
          Some(file) if file.accepts_header() => file,
          other => {
            self.finish(other, &mut files);
            mem::take(&mut pending)
          }
        };

        let (orig, orig_info) = split_header_name(&text[4..]);
        let (new, new_info) = split_header_name(&next[4..]);
        let (orig, new) = self.header_names(file.git, orig, new);
        file.orig_file = Some(orig);
        file.new_file = Some(new);
        file.orig_info = orig_info;
        file.new_info = new_info;
        file.header_seen = true;
        file.context = context_header;
        file.push_lines(&lines[i..i + 2]);
        current = Some(file);
        i += 2;
        continue;
      }

      match current.as_mut() {
        Some(file) if file.header_seen && text.starts_with("@@") => {
          let (hunk, end) = parse_unified_hunk(&lines, i)?;
          file.push_lines(&lines[i..end]);
          file.hunks.push(hunk);
          i = end;
          continue;
        }
        Some(file) if file.header_seen && file.context && text.starts_with(CONTEXT_SEPARATOR) => {
          let (hunk, end) = parse_context_hunk(&lines, i)?;
          file.push_lines(&lines[i..end]);
          file.hunks.push(hunk);
          i = end;
          continue;
        }
        None if text.starts_with("@@ ") => {
          return Err(DiffParserError::UnexpectedLine { line: i + 1 });
        }
        _ => {}
      }

      if is_binary_marker(&text) {
        let mut file = match current.take() {
          Some(file) if file.hunks.is_empty() => file,
          other => {
            self.finish(other, &mut files);
            mem::take(&mut pending)
          }
        };
        file.binary = true;
        if let Some((orig, new)) = text
          .strip_prefix("Binary files ")
          .and_then(|rest| rest.strip_suffix(" differ"))
          .and_then(|names| names.split_once(" and "))
        {
          file.orig_file.get_or_insert_with(|| self.git_name(orig));
          file.new_file.get_or_insert_with(|| self.git_name(new));
        }

        // A git binary patch runs until the next file.
        let mut end = i + 1;
        if text.starts_with("GIT binary patch") {
          while end < lines.len() && !line_text(lines[end]).starts_with("diff --git ") {
            end += 1;
          }
        }
        file.push_lines(&lines[i..end]);
        current = Some(file);
        i = end;
        continue;
      }

      if let Some(file) = current.as_mut().filter(|file| file.git && file.accepts_header()) {
        if file.git_extended_header(&text) {
          file.push_lines(&lines[i..=i]);
          i += 1;
          continue;
        }
      }

      match current.as_mut() {
        Some(file) if !file.header_seen && !file.binary => {
          self.policy.metadata.extract(&text, &mut file.meta);
          file.push_lines(&lines[i..=i]);
        }
        _ => {
          // Anything after a complete file belongs to the next one.
          self.finish(current.take(), &mut files);
          self.policy.metadata.extract(&text, &mut pending.meta);
          pending.push_lines(&lines[i..=i]);
        }
      }
      i += 1;
    }

    self.finish(current.take(), &mut files);

    if files.is_empty() {
      log::debug!("No file changes found in diff");
      return Err(DiffParserError::EmptyDiff);
    }

    log::debug!("Parsed {} files from diff", files.len());
    Ok(files)
  }

  fn git_name(&self, name: &str) -> String {
    let name = unquote(name);
    if self.policy.strip_git_prefixes {
      strip_git_prefix(name)
    } else {
      name.to_string()
    }
  }

  /// Names from `---`/`+++` lines. Outside of git headers, prefixes are only
  /// stripped when both sides look like `a/`, `b/` style paths.
  fn header_names(&self, git: bool, orig: String, new: String) -> (String, String) {
    let prefixed = |name: &str, prefix: &str| name == DEV_NULL || name.starts_with(prefix);
    let both_prefixed = prefixed(&orig, "a/") && prefixed(&new, "b/") && !(orig == DEV_NULL && new == DEV_NULL);

    if git || (self.policy.strip_git_prefixes && both_prefixed) {
      (self.git_name(&orig), self.git_name(&new))
    } else {
      (orig, new)
    }
  }

  fn with_base_dir_prefix(&self, name: String) -> String {
    match &self.base_dir {
      Some(base) if name != DEV_NULL && !name.starts_with('/') => {
        format!("{}/{}", base.trim_end_matches('/'), name)
      }
      _ => name
    }
  }

  fn finish(&self, builder: Option<FileBuilder>, files: &mut Vec<ParsedFileChange>) {
    let Some(b) = builder else {
      return;
    };

    if !(b.header_seen || b.git || b.binary) {
      log::debug!("Skipping preamble without a file header");
      return;
    }

    let mut orig = b.rename_from.clone().or(b.copy_from.clone()).or(b.orig_file).unwrap_or_default();
    let mut new = b.rename_to.clone().or(b.copy_to.clone()).or(b.new_file).unwrap_or_default();

    let classify = |token: &str| self.policy.revisions.classify(token);
    let orig_revision = if orig == DEV_NULL || b.new_file_mode {
      Revision::PreCreation
    } else if let Some((index, _)) = &b.index {
      classify(index)
    } else if let Some(revision) = &b.meta.orig_revision {
      classify(revision)
    } else {
      classify(&b.orig_info)
    };

    let deleted = new == DEV_NULL || b.deleted_mode;
    let new_revision = if deleted {
      Revision::Unknown
    } else if let Some((_, index)) = &b.index {
      classify(index)
    } else if let Some(revision) = &b.meta.new_revision {
      classify(revision)
    } else {
      classify(&b.new_info)
    };

    let status = if b.copy_from.is_some() {
      FileStatus::Copied
    } else if orig_revision.is_pre_creation() {
      FileStatus::Added
    } else if deleted {
      FileStatus::Deleted
    } else if b.rename_from.is_some() || b.rename_to.is_some() {
      FileStatus::Moved
    } else if b.hunks.is_empty() && !b.binary && orig == new {
      FileStatus::Unchanged
    } else {
      FileStatus::Modified
    };

    // Both sides name the real file; /dev/null is carried by the status
    if orig == DEV_NULL {
      orig = new.clone();
    }
    if new == DEV_NULL {
      new = orig.clone();
    }

    let (insert_count, delete_count) = b
      .hunks
      .iter()
      .fold((0, 0), |(ins, del), hunk| (ins + hunk.inserts(), del + hunk.deletes()));

    let mut extra = b.meta.extra;
    if b.git {
      extra.insert("git".into(), "true".into());
    }

    log::debug!("Adding file to results: {} -> {} ({}, +{} -{})", orig, new, status, insert_count, delete_count);

    files.push(ParsedFileChange {
      orig_file: self.with_base_dir_prefix(orig),
      orig_info: b.orig_info,
      new_file: self.with_base_dir_prefix(new),
      new_info: b.new_info,
      orig_revision,
      new_revision,
      status,
      data: b.data,
      binary: b.binary,
      insert_count,
      delete_count,
      hunks: b.hunks,
      old_mode: b.old_mode,
      new_mode: b.new_mode,
      similarity: b.similarity,
      extra
    });
  }
}

/// Marks a line as lacking a trailing newline.
///
/// Writers only append `\n` before the marker, so a `\r` split off as part
/// of a CRLF terminator belongs to the content.
fn mark_missing_eol(line: &mut PatchLine) {
  if line.eol == Eol::CrLf {
    line.text.push(b'\r');
  }
  line.eol = Eol::Missing;
}

/// Parses one `@@` hunk starting at `start`; returns it with the index of
/// the first line after it.
fn parse_unified_hunk(lines: &[&[u8]], start: usize) -> ParseResult<(Hunk, usize)> {
  let header = line_text(lines[start]);
  let line = start + 1;
  let caps = UNIFIED_HUNK
    .captures(&header)
    .ok_or_else(|| DiffParserError::InvalidHunkHeader { line, header: header.clone() })?;

  let number = |index: usize, default: usize| -> ParseResult<usize> {
    caps
      .get(index)
      .map_or(Ok(default), |m| parse_number(m.as_str(), line, &header))
  };
  let old_start = number(1, 0)?;
  let old_len = number(2, 1)?;
  let new_start = number(3, 0)?;
  let new_len = number(4, 1)?;
  let section = caps.get(5).map_or("", |m| m.as_str()).trim().to_string();

  let malformed = |reason: &str| DiffParserError::MalformedHunk { line, reason: reason.to_string() };

  let (mut old_remaining, mut new_remaining) = (old_len, new_len);
  // Header lengths are untrusted; never reserve past the input
  let mut hunk_lines: Vec<HunkLine> = Vec::with_capacity(old_len.max(new_len).min(lines.len() - start));
  let mut i = start + 1;

  while old_remaining > 0 || new_remaining > 0 {
    let raw = lines.get(i).ok_or(DiffParserError::TruncatedHunk { line })?;
    let (kind, body) = match raw.first() {
      Some(b' ') => (LineKind::Context, &raw[1..]),
      Some(b'-') => (LineKind::Delete, &raw[1..]),
      Some(b'+') => (LineKind::Insert, &raw[1..]),
      Some(b'\\') => {
        if let Some(last) = hunk_lines.last_mut() {
          mark_missing_eol(&mut last.line);
        }
        i += 1;
        continue;
      }
      // Some tools strip the leading space of empty context lines
      Some(b'\n') | Some(b'\r') => (LineKind::Context, &raw[..]),
      _ => return Err(DiffParserError::TruncatedHunk { line })
    };

    match kind {
      LineKind::Context if old_remaining == 0 || new_remaining == 0 => {
        return Err(malformed("more context lines than the header declares"))
      }
      LineKind::Context => {
        old_remaining -= 1;
        new_remaining -= 1;
      }
      LineKind::Delete if old_remaining == 0 => return Err(malformed("more removed lines than the header declares")),
      LineKind::Delete => old_remaining -= 1,
      LineKind::Insert if new_remaining == 0 => return Err(malformed("more added lines than the header declares")),
      LineKind::Insert => new_remaining -= 1
    }

    hunk_lines.push(HunkLine { kind, line: PatchLine::from_raw(body) });
    i += 1;
  }

  if lines.get(i).is_some_and(|raw| raw.first() == Some(&b'\\')) {
    if let Some(last) = hunk_lines.last_mut() {
      mark_missing_eol(&mut last.line);
    }
    i += 1;
  }

  Ok((Hunk { old_start, old_len, new_start, new_len, section, lines: hunk_lines }, i))
}

/// Start and length of a context-format `a,b` range.
fn context_range(caps: &regex::Captures<'_>, line: usize, header: &str) -> ParseResult<(usize, usize)> {
  let start = parse_number(&caps[1], line, header)?;
  let len = match caps.get(2) {
    Some(end) => parse_number(end.as_str(), line, header)?.saturating_add(1).saturating_sub(start),
    None if start == 0 => 0,
    None => 1
  };
  Ok((start, len))
}

type SectionLine = (u8, PatchLine);

/// Reads up to `count` section lines carrying one of `markers`.
fn read_context_section(lines: &[&[u8]], mut i: usize, count: usize, markers: &[u8], line: usize) -> ParseResult<(Vec<SectionLine>, usize)> {
  let mut section: Vec<SectionLine> = Vec::with_capacity(count.min(lines.len().saturating_sub(i)));
  let present = lines
    .get(i)
    .is_some_and(|raw| raw.len() >= 2 && markers.contains(&raw[0]) && raw[1] == b' ');
  if !present {
    return Ok((section, i));
  }

  while section.len() < count {
    let raw = lines.get(i).ok_or(DiffParserError::TruncatedHunk { line })?;
    match raw.first() {
      Some(b'\\') => {
        if let Some((_, last)) = section.last_mut() {
          mark_missing_eol(last);
        }
      }
      Some(marker) if markers.contains(marker) && raw.get(1) == Some(&b' ') => {
        section.push((*marker, PatchLine::from_raw(&raw[2..])));
      }
      _ => return Err(DiffParserError::TruncatedHunk { line })
    }
    i += 1;
  }

  if lines.get(i).is_some_and(|raw| raw.first() == Some(&b'\\')) {
    if let Some((_, last)) = section.last_mut() {
      mark_missing_eol(last);
    }
    i += 1;
  }
  Ok((section, i))
}

/// Parses one context-format hunk starting at its `***************` line.
fn parse_context_hunk(lines: &[&[u8]], start: usize) -> ParseResult<(Hunk, usize)> {
  let line = start + 1;
  let section_name = line_text(lines[start])[CONTEXT_SEPARATOR.len()..].trim().to_string();

  let old_header = lines.get(start + 1).map(|raw| line_text(raw)).ok_or(DiffParserError::TruncatedHunk { line })?;
  let caps = CONTEXT_OLD_RANGE
    .captures(&old_header)
    .ok_or_else(|| DiffParserError::InvalidHunkHeader { line: line + 1, header: old_header.clone() })?;
  let (old_start, old_len) = context_range(&caps, line + 1, &old_header)?;

  let (old_section, i) = read_context_section(lines, start + 2, old_len, b" -!", line)?;

  let new_header = lines.get(i).map(|raw| line_text(raw)).ok_or(DiffParserError::TruncatedHunk { line })?;
  let caps = CONTEXT_NEW_RANGE
    .captures(&new_header)
    .ok_or_else(|| DiffParserError::InvalidHunkHeader { line: i + 1, header: new_header.clone() })?;
  let (new_start, new_len) = context_range(&caps, i + 1, &new_header)?;

  let (new_section, end) = read_context_section(lines, i + 1, new_len, b" +!", line)?;

  // An omitted section is the other side's context
  let context_of = |section: &[SectionLine]| -> Vec<SectionLine> {
    section
      .iter()
      .filter(|(marker, _)| *marker == b' ')
      .cloned()
      .collect()
  };
  let old_section = if old_section.is_empty() && old_len > 0 { context_of(&new_section) } else { old_section };
  let new_section = if new_section.is_empty() && new_len > 0 { context_of(&old_section) } else { new_section };

  let mut hunk_lines = Vec::with_capacity(old_section.len().max(new_section.len()));
  let (mut a, mut b) = (0, 0);
  while a < old_section.len() || b < new_section.len() {
    let progress = (a, b);
    let old_context = old_section.get(a).is_some_and(|(marker, _)| *marker == b' ');
    let new_context = new_section.get(b).is_some_and(|(marker, _)| *marker == b' ');

    if old_context && new_context {
      hunk_lines.push(HunkLine { kind: LineKind::Context, line: new_section[b].1.clone() });
      a += 1;
      b += 1;
      continue;
    }

    while let Some((_, old)) = old_section.get(a).filter(|(marker, _)| *marker != b' ') {
      hunk_lines.push(HunkLine { kind: LineKind::Delete, line: old.clone() });
      a += 1;
    }
    while let Some((_, new)) = new_section.get(b).filter(|(marker, _)| *marker != b' ') {
      hunk_lines.push(HunkLine { kind: LineKind::Insert, line: new.clone() });
      b += 1;
    }

    if (a, b) == progress {
      return Err(DiffParserError::MalformedHunk { line, reason: "context lines of both sections do not align".into() });
    }
  }

  Ok((
    Hunk { old_start, old_len, new_start, new_len, section: section_name, lines: hunk_lines },
    end
  ))
}

#[cfg(test)]
mod tests {
  use super::*;

  fn git() -> DiffParser {
    DiffParser::new(ParserPolicy::git())
  }

  #[test]
  fn test_parse_diff() {
    let diff = r#"diff --git a/src/main.rs b/src/main.rs
index 1234567..abcdef0 100644
--- a/src/main.rs
+++ b/src/main.rs
@@ -1,3 +1,4 @@
 fn main() {
-    println!("Hello");
+    println!("Hello, world!");
+    println!("New line");
 }
diff --git a/Cargo.toml b/Cargo.toml
new file mode 100644
index 0000000..1111111
--- /dev/null
+++ b/Cargo.toml
@@ -0,0 +1,3 @@
+[package]
+name = "test"
+version = "0.1.0"
"#;

    let files = git().parse(diff.as_bytes()).unwrap();
    assert_eq!(files.len(), 2);
    assert_eq!(files[0].new_file, "src/main.rs");
    assert_eq!(files[0].status, FileStatus::Modified);
    assert_eq!(files[0].orig_revision, Revision::Known("1234567".into()));
    assert_eq!(files[0].new_revision, Revision::Known("abcdef0".into()));
    assert_eq!((files[0].insert_count, files[0].delete_count), (2, 1));
    assert_eq!(files[0].old_mode.as_deref(), Some("100644"));

    assert_eq!(files[1].orig_file, "Cargo.toml");
    assert_eq!(files[1].new_file, "Cargo.toml");
    assert_eq!(files[1].status, FileStatus::Added);
    assert!(files[1].is_new());
    assert_eq!(files[1].insert_count, 3);

    // Each file keeps its own section of the raw diff
    let first = String::from_utf8(files[0].data.clone()).unwrap();
    assert!(first.starts_with("diff --git a/src/main.rs"));
    assert!(!first.contains("Cargo.toml"));
  }

  #[test]
  fn test_parse_diff_with_commit_hash() {
    let diff = r#"0472ffa1665c4c5573fb8f7698c9965122eda675 Update files

diff --git a/test.js b/test.js
new file mode 100644
index 0000000..a730e61
--- /dev/null
+++ b/test.js
@@ -0,0 +1 @@
+console.log('Hello');
"#;

    let files = git().parse(diff.as_bytes()).unwrap();
    assert_eq!(files.len(), 1);
    assert_eq!(files[0].new_file, "test.js");
    assert_eq!(files[0].status, FileStatus::Added);
    // The preamble travels with the first file
    assert!(files[0].data.starts_with(b"0472ffa"));
  }

  #[test]
  fn test_parse_diff_with_c_i_prefixes() {
    let diff = r#"diff --git c/test.md i/test.md
new file mode 100644
index 0000000..6c61a60
--- /dev/null
+++ i/test.md
@@ -0,0 +1 @@
+# Test File
"#;

    let files = git().parse(diff.as_bytes()).unwrap();
    assert_eq!(files[0].new_file, "test.md", "Should extract clean path without i/ prefix");
    assert_eq!(files[0].status, FileStatus::Added);
  }

  #[test]
  fn test_parse_diff_with_deleted_file() {
    let diff = r#"diff --git a/test.txt b/test.txt
deleted file mode 100644
index 9daeafb..0000000
--- a/test.txt
+++ /dev/null
@@ -1 +0,0 @@
-test
"#;

    let files = git().parse(diff.as_bytes()).unwrap();
    assert_eq!(files.len(), 1);
    assert_eq!(files[0].new_file, "test.txt");
    assert_eq!(files[0].status, FileStatus::Deleted);
    assert!(files[0].is_deleted());
    assert_eq!(files[0].delete_count, 1);
  }

  #[test]
  fn test_pure_rename() {
    let diff = "diff --git a/old.txt b/new.txt\nsimilarity index 100%\nrename from old.txt\nrename to new.txt\n";
    let files = git().parse(diff.as_bytes()).unwrap();
    assert_eq!(files[0].orig_file, "old.txt");
    assert_eq!(files[0].new_file, "new.txt");
    assert_eq!(files[0].status, FileStatus::Moved);
    assert!(files[0].is_pure_rename());
  }

  #[test]
  fn test_copy_and_mode_change() {
    let diff = "diff --git a/a.sh b/b.sh\nsimilarity index 90%\ncopy from a.sh\ncopy to b.sh\n\
                diff --git a/run.sh b/run.sh\nold mode 100644\nnew mode 100755\n";
    let files = git().parse(diff.as_bytes()).unwrap();
    assert_eq!(files.len(), 2);
    assert_eq!(files[0].status, FileStatus::Copied);
    assert_eq!(files[0].orig_file, "a.sh");
    assert_eq!(files[1].status, FileStatus::Unchanged);
    assert_eq!(files[1].new_mode.as_deref(), Some("100755"));
  }

  #[test]
  fn test_binary_files() {
    let diff = "diff --git a/logo.png b/logo.png\nindex 1111111..2222222 100644\nBinary files a/logo.png and b/logo.png differ\n";
    let files = git().parse(diff.as_bytes()).unwrap();
    assert!(files[0].binary);
    assert_eq!(files[0].status, FileStatus::Modified);
    assert_eq!(files[0].new_file, "logo.png");

    let plain = "Binary files old/image.gif and new/image.gif differ\n";
    let files = DiffParser::default().parse(plain.as_bytes()).unwrap();
    assert!(files[0].binary);
    assert_eq!(files[0].orig_file, "old/image.gif");
  }

  #[test]
  fn test_git_binary_patch_is_consumed() {
    let diff = "diff --git a/bin.dat b/bin.dat\nnew file mode 100644\nindex 0000000..e69de29\nGIT binary patch\nliteral 5\nMcmZ?wbaG<>0RSfe0RR91\n\nliteral 0\nHcmV?d00001\n\ndiff --git a/x b/x\nindex 1111111..2222222 100644\n--- a/x\n+++ b/x\n@@ -1 +1 @@\n-a\n+b\n";
    let files = git().parse(diff.as_bytes()).unwrap();
    assert_eq!(files.len(), 2);
    assert!(files[0].binary);
    assert_eq!(files[0].status, FileStatus::Added);
    assert_eq!(files[1].new_file, "x");
    assert_eq!(files[1].insert_count, 1);
  }

  #[test]
  fn test_subversion_diff() {
    let diff = "Index: trunk/foo.c\n===================================================================\n\
                --- trunk/foo.c\t(revision 12)\n+++ trunk/foo.c\t(working copy)\n@@ -1,2 +1,2 @@\n a\n-b\n+c\n\
                Index: trunk/new.c\n===================================================================\n\
                --- trunk/new.c\t(revision 0)\n+++ trunk/new.c\t(working copy)\n@@ -0,0 +1 @@\n+x\n";
    let registry = PolicyRegistry::with_defaults();
    let parser = DiffParser::for_backend(&registry, "svn").unwrap();
    let files = parser.parse(diff.as_bytes()).unwrap();

    assert_eq!(files.len(), 2);
    assert_eq!(files[0].orig_info, "(revision 12)");
    assert_eq!(files[0].orig_revision, Revision::Known("12".into()));
    assert_eq!(files[0].new_revision, Revision::Head);
    assert_eq!(files[1].status, FileStatus::Added);
  }

  #[test]
  fn test_mercurial_revisions_from_metadata() {
    let diff = "diff -r 9a2e9a58ed3e -r 5a1fdf0da0f2 foo.c\n--- a/foo.c\tThu Jan 01 00:00:00 2009 +0000\n+++ b/foo.c\tThu Jan 01 00:00:00 2009 +0000\n@@ -1 +1 @@\n-a\n+b\n";
    let registry = PolicyRegistry::with_defaults();
    let files = DiffParser::for_backend(&registry, "hg").unwrap().parse(diff.as_bytes()).unwrap();
    assert_eq!(files[0].orig_file, "foo.c");
    assert_eq!(files[0].orig_revision, Revision::Known("9a2e9a58ed3e".into()));
    assert_eq!(files[0].new_revision, Revision::Known("5a1fdf0da0f2".into()));
  }

  #[test]
  fn test_unknown_backend() {
    let registry = PolicyRegistry::with_defaults();
    assert_eq!(
      DiffParser::for_backend(&registry, "cvs").unwrap_err(),
      DiffParserError::UnknownBackend("cvs".into())
    );
  }

  #[test]
  fn test_plain_unified_diff_with_timestamps() {
    let diff = "--- foo.txt\t2024-01-01 10:00:00.000000000 +0100\n+++ foo.txt\t2024-01-02 10:00:00.000000000 +0100\n@@ -1,3 +1,3 @@\n one\n-two\n+TWO\n three\n";
    let files = DiffParser::default().parse(diff.as_bytes()).unwrap();
    assert_eq!(files[0].orig_info, "2024-01-01 10:00:00.000000000 +0100");
    assert_eq!(files[0].orig_revision, Revision::Unknown);
    assert_eq!(files[0].status, FileStatus::Modified);
    assert_eq!(files[0].hunks[0].lines.len(), 4);
  }

  #[test]
  fn test_new_file_against_epoch() {
    let diff = "--- a.txt\t1970-01-01 00:00:00.000000000 +0000\n+++ a.txt\t2024-01-02 10:00:00.000000000 +0100\n@@ -0,0 +1 @@\n+hi\n";
    let files = DiffParser::default().parse(diff.as_bytes()).unwrap();
    assert_eq!(files[0].status, FileStatus::Added);
  }

  #[test]
  fn test_context_diff() {
    let diff = "*** foo.c\t2024-01-01\n--- foo.c\t2024-01-02\n***************\n*** 1,4 ****\n  one\n! two\n  three\n- four\n--- 1,4 ----\n  one\n! TWO\n+ 2.5\n  three\n";
    let files = DiffParser::default().parse(diff.as_bytes()).unwrap();
    let hunk = &files[0].hunks[0];

    assert_eq!((hunk.old_start, hunk.old_len, hunk.new_start, hunk.new_len), (1, 4, 1, 4));
    let kinds: Vec<_> = hunk.lines.iter().map(|l| l.kind).collect();
    assert_eq!(kinds, vec![
      LineKind::Context,
      LineKind::Delete,
      LineKind::Insert,
      LineKind::Insert,
      LineKind::Context,
      LineKind::Delete
    ]);
    assert_eq!((files[0].insert_count, files[0].delete_count), (2, 2));
  }

  #[test]
  fn test_context_diff_with_omitted_section() {
    let diff = "*** a.txt\n--- a.txt\n***************\n*** 1,2 ****\n--- 1,3 ----\n  one\n+ new\n  two\n";
    let files = DiffParser::default().parse(diff.as_bytes()).unwrap();
    let hunk = &files[0].hunks[0];
    assert_eq!(hunk.old_lines().count(), 2);
    assert_eq!(hunk.new_lines().count(), 3);
    assert_eq!(files[0].insert_count, 1);
  }

  #[test]
  fn test_no_newline_marker() {
    let diff = "--- a\n+++ b\n@@ -1 +1 @@\n-old\n\\ No newline at end of file\n+new\n\\ No newline at end of file\n";
    let files = DiffParser::default().parse(diff.as_bytes()).unwrap();
    let lines = &files[0].hunks[0].lines;
    assert_eq!(lines[0].line.eol, Eol::Missing);
    assert_eq!(lines[1].line.eol, Eol::Missing);
    assert_eq!(lines[1].line.text, b"new");
  }

  #[test]
  fn test_carriage_return_before_no_newline_marker() {
    let diff = "--- a\n+++ b\n@@ -1 +1,2 @@\n a\n+b\r\n\\ No newline at end of file\n";
    let files = DiffParser::default().parse(diff.as_bytes()).unwrap();
    let added = &files[0].hunks[0].lines[1].line;
    assert_eq!(added.text, b"b\r");
    assert_eq!(added.eol, Eol::Missing);

    let context = "*** a\n--- a\n***************\n*** 1 ****\n! x\r\n\\ No newline at end of file\n--- 1 ----\n! y\n";
    let files = DiffParser::default().parse(context.as_bytes()).unwrap();
    assert_eq!(files[0].hunks[0].lines[0].line.text, b"x\r");
  }

  #[test]
  fn test_oversized_hunk_lengths_are_errors() {
    let unified = b"--- a\n+++ b\n@@ -1,18446744073709551615 +1 @@\n-a\n";
    assert_eq!(
      DiffParser::default().parse(unified).unwrap_err(),
      DiffParserError::TruncatedHunk { line: 3 }
    );

    let context = b"*** a\n--- a\n***************\n*** 1,18446744073709551615 ****\n- a\n";
    assert_eq!(
      DiffParser::default().parse(context).unwrap_err(),
      DiffParserError::TruncatedHunk { line: 3 }
    );
  }

  #[test]
  fn test_blank_context_line_without_space() {
    let diff = "--- a\n+++ b\n@@ -1,3 +1,3 @@\n a\n\n-b\n+c\n";
    let files = DiffParser::default().parse(diff.as_bytes()).unwrap();
    assert_eq!(files[0].hunks[0].lines[1].kind, LineKind::Context);
    assert!(files[0].hunks[0].lines[1].line.text.is_empty());
  }

  #[test]
  fn test_empty_diff() {
    assert_eq!(DiffParser::default().parse(b"").unwrap_err(), DiffParserError::EmptyDiff);
    assert_eq!(
      DiffParser::default().parse(b"From: someone\nSubject: nothing\n\n").unwrap_err(),
      DiffParserError::EmptyDiff
    );
  }

  #[test]
  fn test_invalid_hunk_header() {
    let diff = "--- a\n+++ b\n@@ -x +1 @@\n";
    assert!(matches!(
      DiffParser::default().parse(diff.as_bytes()),
      Err(DiffParserError::InvalidHunkHeader { line: 3, .. })
    ));
  }

  #[test]
  fn test_truncated_hunk() {
    let diff = "--- a\n+++ b\n@@ -1,3 +1,3 @@\n a\n-b\n";
    assert_eq!(
      DiffParser::default().parse(diff.as_bytes()).unwrap_err(),
      DiffParserError::TruncatedHunk { line: 3 }
    );
  }

  #[test]
  fn test_hunk_without_header() {
    let diff = "@@ -1 +1 @@\n-a\n+b\n";
    assert_eq!(
      DiffParser::default().parse(diff.as_bytes()).unwrap_err(),
      DiffParserError::UnexpectedLine { line: 1 }
    );
  }

  #[test]
  fn test_base_dir_is_prefixed() {
    let diff = "--- foo.c\n+++ foo.c\n@@ -1 +1 @@\n-a\n+b\n";
    let files = DiffParser::default().with_base_dir("/trunk/").parse(diff.as_bytes()).unwrap();
    assert_eq!(files[0].orig_file, "/trunk/foo.c");
    assert_eq!(files[0].new_file, "/trunk/foo.c");

    let files = DiffParser::default().with_base_dir("/").parse(diff.as_bytes()).unwrap();
    assert_eq!(files[0].new_file, "foo.c");
  }

  #[test]
  fn test_dashes_inside_hunk_are_content() {
    let diff = "--- a\n+++ b\n@@ -1,2 +1,2 @@\n--- removed dashes\n+++ added pluses\n-x\n+y\n";
    let files = DiffParser::default().parse(diff.as_bytes()).unwrap();
    assert_eq!(files.len(), 1);
    assert_eq!(files[0].hunks[0].lines[0].line.text, b"-- removed dashes");
    assert_eq!((files[0].insert_count, files[0].delete_count), (2, 2));
  }

  #[test]
  fn test_line_counts_match_hunks() {
    let diff = "--- a\n+++ b\n@@ -1,2 +1,3 @@\n a\n-b\n+c\n+d\n@@ -10,2 +11,1 @@\n-x\n y\n";
    let files = DiffParser::default().parse(diff.as_bytes()).unwrap();
    let file = &files[0];
    assert_eq!((file.insert_count, file.delete_count), file.count_lines());
    assert_eq!(file.count_lines(), file.count_lines());
    assert_eq!(file.insert_count + file.delete_count, 4);
  }
}
