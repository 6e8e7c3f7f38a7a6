//! Applies a parsed diff to original file content.

use thiserror::Error;

use crate::diff::{ByteLines, DiffParser, DiffParserError, Eol, Hunk, LineKind, ParsedFileChange, PatchLine};
use crate::profile;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PatchError {
  #[error(transparent)]
  Parse(#[from] DiffParserError),

  #[error("The diff does not contain changes for {0}")]
  FileNotInDiff(String),

  #[error("Cannot apply a binary diff to {0}")]
  Binary(String),

  #[error("Hunk {hunk} does not apply to {file} at line {line}: {reason}")]
  HunkMismatch {
    file:   String,
    hunk:   usize,
    line:   usize,
    reason: String
  }
}

/// Applies the changes for `filename` in `diff` to `original`.
///
/// A blank diff returns `original` unchanged. A diff with a single file is
/// applied regardless of `filename`.
pub fn patch(diff: &[u8], original: &[u8], filename: &str) -> Result<Vec<u8>, PatchError> {
  profile!("Apply patch");

  if diff.iter().all(u8::is_ascii_whitespace) {
    log::debug!("Empty diff for {}, returning original content", filename);
    return Ok(original.to_vec());
  }

  let files = DiffParser::default().parse(diff)?;
  let file = select_file(&files, filename)?;
  apply_file(file, original)
}

fn select_file<'a>(files: &'a [ParsedFileChange], filename: &str) -> Result<&'a ParsedFileChange, PatchError> {
  if let [file] = files {
    return Ok(file);
  }

  let matches = |name: &str| name == filename || name.ends_with(&format!("/{filename}")) || filename.ends_with(&format!("/{name}"));
  files
    .iter()
    .find(|file| matches(&file.new_file) || matches(&file.orig_file))
    .ok_or_else(|| PatchError::FileNotInDiff(filename.to_string()))
}

/// Applies every hunk of `file` to `original`, or nothing at all.
pub fn apply_file(file: &ParsedFileChange, original: &[u8]) -> Result<Vec<u8>, PatchError> {
  if file.binary {
    return Err(PatchError::Binary(file.new_file.clone()));
  }

  let mut lines = original.patch_lines();
  let file_eol = lines.iter().map(|line| line.eol).find(|eol| *eol != Eol::Missing);
  let mut offset: isize = 0;
  let mut min_position = 0;

  for (index, hunk) in file.hunks.iter().enumerate() {
    let mismatch = |line: usize, reason: String| PatchError::HunkMismatch {
      file: file.new_file.clone(),
      hunk: index + 1,
      line,
      reason
    };

    let declared = if hunk.old_len == 0 { hunk.old_start } else { hunk.old_start.saturating_sub(1) };
    let position = declared as isize + offset;
    if position < min_position as isize {
      return Err(mismatch(hunk.old_start, "hunk overlaps or precedes the previous hunk".into()));
    }
    let position = position as usize;
    if position + hunk.old_len > lines.len() {
      return Err(mismatch(
        hunk.old_start,
        format!("hunk needs {} lines at line {} but the file has {}", hunk.old_len, position + 1, lines.len())
      ));
    }

    let replacement = apply_hunk(hunk, &lines[position..position + hunk.old_len], file_eol)
      .map_err(|(at, reason)| mismatch(position + at + 1, reason))?;

    log::debug!(
      "Applied hunk {} of {} at line {} ({} -> {} lines)",
      index + 1,
      file.new_file,
      position + 1,
      hunk.old_len,
      replacement.len()
    );

    min_position = position + replacement.len();
    lines.splice(position..position + hunk.old_len, replacement);
    offset += hunk.new_len as isize - hunk.old_len as isize;
  }

  let mut out = Vec::with_capacity(original.len());
  for line in &lines {
    line.write_to(&mut out);
  }
  Ok(out)
}

/// Builds the lines replacing `target`, checking the hunk's old side against
/// it. Errors carry the offending offset into `target`.
fn apply_hunk(hunk: &Hunk, target: &[PatchLine], file_eol: Option<Eol>) -> Result<Vec<PatchLine>, (usize, String)> {
  let target_eol = target
    .iter()
    .map(|line| line.eol)
    .find(|eol| *eol != Eol::Missing)
    .or(file_eol);

  let mut out = Vec::with_capacity(hunk.new_len);
  let mut cursor = 0;

  for hunk_line in &hunk.lines {
    match hunk_line.kind {
      LineKind::Context | LineKind::Delete => {
        let existing = target
          .get(cursor)
          .ok_or_else(|| (cursor, "hunk has more old lines than its header declares".to_string()))?;
        if existing.text != hunk_line.line.text {
          return Err((
            cursor,
            format!(
              "expected {:?}, found {:?}",
              String::from_utf8_lossy(&hunk_line.line.text),
              String::from_utf8_lossy(&existing.text)
            )
          ));
        }
        if hunk_line.kind == LineKind::Context {
          let mut kept = existing.clone();
          if hunk_line.line.eol == Eol::Missing {
            kept.eol = Eol::Missing;
          } else if kept.eol == Eol::Missing {
            kept.eol = target_eol.unwrap_or(hunk_line.line.eol);
          }
          out.push(kept);
        }
        cursor += 1;
      }
      LineKind::Insert => {
        let eol = match hunk_line.line.eol {
          Eol::Missing => Eol::Missing,
          own => target_eol.unwrap_or(own)
        };
        out.push(PatchLine { text: hunk_line.line.text.clone(), eol });
      }
    }
  }

  // A line that used to end the file may now be followed by inserted lines
  if let Some(last) = out.iter().rposition(|line| line.eol == Eol::Missing) {
    if last + 1 < out.len() {
      out[last].eol = target_eol.unwrap_or(Eol::Lf);
    }
  }

  Ok(out)
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_blank_diff_returns_original() {
    assert_eq!(patch(b"", b"abc\n", "a").unwrap(), b"abc\n");
    assert_eq!(patch(b" \n\n", b"abc", "a").unwrap(), b"abc");
  }

  #[test]
  fn test_simple_patch() {
    let diff = b"--- a.txt\n+++ a.txt\n@@ -1,3 +1,3 @@\n one\n-two\n+TWO\n three\n";
    assert_eq!(patch(diff, b"one\ntwo\nthree\n", "a.txt").unwrap(), b"one\nTWO\nthree\n");
  }

  #[test]
  fn test_offsets_accumulate() {
    let diff = b"--- a\n+++ a\n@@ -1,2 +1,3 @@\n a\n+a2\n b\n@@ -4,2 +5,2 @@\n d\n-e\n+E\n";
    let result = patch(diff, b"a\nb\nc\nd\ne\n", "a").unwrap();
    assert_eq!(result, b"a\na2\nb\nc\nd\nE\n");
  }

  #[test]
  fn test_crlf_target_keeps_its_convention() {
    let diff = b"--- a\n+++ a\n@@ -1,2 +1,3 @@\n one\n+inserted\n two\n";
    let result = patch(diff, b"one\r\ntwo\r\n", "a").unwrap();
    assert_eq!(result, b"one\r\ninserted\r\ntwo\r\n");
  }

  #[test]
  fn test_no_newline_marker() {
    let diff = b"--- a\n+++ a\n@@ -1 +1 @@\n-x\n+y\n\\ No newline at end of file\n";
    assert_eq!(patch(diff, b"x\n", "a").unwrap(), b"y");

    let diff = b"--- a\n+++ a\n@@ -1 +1,2 @@\n-x\n\\ No newline at end of file\n+x\n+y\n";
    assert_eq!(patch(diff, b"x", "a").unwrap(), b"x\ny\n");
  }

  #[test]
  fn test_context_mismatch() {
    let diff = b"--- a\n+++ a\n@@ -1,2 +1,2 @@\n one\n-two\n+TWO\n";
    let err = patch(diff, b"one\nzwei\n", "a").unwrap_err();
    assert!(matches!(err, PatchError::HunkMismatch { hunk: 1, line: 2, .. }), "{err:?}");
  }

  #[test]
  fn test_out_of_range_hunk() {
    let diff = b"--- a\n+++ a\n@@ -10,1 +10,1 @@\n-x\n+y\n";
    assert!(matches!(patch(diff, b"x\n", "a"), Err(PatchError::HunkMismatch { hunk: 1, .. })));
  }

  #[test]
  fn test_out_of_order_hunks() {
    let diff = b"--- a\n+++ a\n@@ -3 +3 @@\n-c\n+C\n@@ -1 +1 @@\n-a\n+A\n";
    assert!(matches!(patch(diff, b"a\nb\nc\n", "a"), Err(PatchError::HunkMismatch { hunk: 2, .. })));
  }

  #[test]
  fn test_selects_file_by_name() {
    let diff = b"--- x\n+++ x\n@@ -1 +1 @@\n-1\n+one\n--- y\n+++ y\n@@ -1 +1 @@\n-2\n+two\n";
    assert_eq!(patch(diff, b"2\n", "y").unwrap(), b"two\n");
    assert_eq!(patch(diff, b"2\n", "z").unwrap_err(), PatchError::FileNotInDiff("z".into()));
  }

  #[test]
  fn test_binary_is_rejected() {
    let diff = b"Binary files a/img.png and b/img.png differ\n";
    assert!(matches!(patch(diff, b"\x89PNG", "img.png"), Err(PatchError::Binary(_))));
  }

  #[test]
  fn test_new_file_from_empty() {
    let diff = b"--- /dev/null\n+++ b/new.txt\n@@ -0,0 +1,2 @@\n+hello\n+world\n";
    assert_eq!(patch(diff, b"", "new.txt").unwrap(), b"hello\nworld\n");
  }
}
