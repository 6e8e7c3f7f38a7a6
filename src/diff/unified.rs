//! Unified diff output.

use std::fmt::Write;

use similar::udiff::UnifiedHunkHeader;
use similar::{group_diff_ops, DiffOp, DiffTag};

use crate::differ::Differ;

const NO_NEWLINE: &str = "\\ No newline at end of file";

/// Splits text into lines, keeping each line's terminator.
fn split_lines(text: &str) -> Vec<&str> {
  text.split_inclusive('\n').collect()
}

fn push_line(out: &mut String, prefix: char, line: &str) {
  out.push(prefix);
  out.push_str(line);
  if !line.ends_with('\n') {
    out.push('\n');
    out.push_str(NO_NEWLINE);
    out.push('\n');
  }
}

/// Renders a unified diff of `old` against `new`.
///
/// Identical inputs render to an empty string.
pub fn render(orig_name: &str, new_name: &str, old: &str, new: &str, context: usize) -> String {
  let a = split_lines(old);
  let b = split_lines(new);
  let ops: Vec<DiffOp> = Differ::new(&a, &b).opcodes().map(|op| op.to_diff_op()).collect();
  let groups = group_diff_ops(ops, context);

  let mut out = String::new();
  if groups.is_empty() {
    return out;
  }

  let _ = writeln!(out, "--- {orig_name}");
  let _ = writeln!(out, "+++ {new_name}");

  for group in groups {
    let _ = writeln!(out, "{}", UnifiedHunkHeader::new(&group));

    for op in &group {
      let (tag, old_range, new_range) = op.as_tag_tuple();
      match tag {
        DiffTag::Equal => a[old_range].iter().for_each(|line| push_line(&mut out, ' ', line)),
        _ => {
          a[old_range].iter().for_each(|line| push_line(&mut out, '-', line));
          b[new_range].iter().for_each(|line| push_line(&mut out, '+', line));
        }
      }
    }
  }

  log::debug!("Rendered unified diff of {} bytes for {}", out.len(), new_name);
  out
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_identical_inputs_render_nothing() {
    assert_eq!(render("a", "b", "x\ny\n", "x\ny\n", 3), "");
    assert_eq!(render("a", "b", "", "", 3), "");
  }

  #[test]
  fn test_render_single_change() {
    let out = render("a.txt", "b.txt", "one\ntwo\nthree\n", "one\nTWO\nthree\n", 3);
    assert_eq!(out, "--- a.txt\n+++ b.txt\n@@ -1,3 +1,3 @@\n one\n-two\n+TWO\n three\n");
  }

  #[test]
  fn test_render_new_file() {
    let out = render("a", "b", "", "x\n", 3);
    assert_eq!(out, "--- a\n+++ b\n@@ -0,0 +1 @@\n+x\n");
  }

  #[test]
  fn test_render_missing_newline() {
    let out = render("a", "b", "x\n", "x", 3);
    assert_eq!(out, "--- a\n+++ b\n@@ -1 +1 @@\n-x\n+x\n\\ No newline at end of file\n");
  }

  #[test]
  fn test_distant_changes_split_into_hunks() {
    let old: String = (1..=20).map(|i| format!("{i}\n")).collect();
    let new: String = (1..=20)
      .map(|i| match i {
        2 => "two\n".to_string(),
        19 => "nineteen\n".to_string(),
        _ => format!("{i}\n")
      })
      .collect();
    let out = render("a", "b", &old, &new, 2);
    assert_eq!(out.matches("@@ ").count(), 2);
    assert!(out.contains("@@ -1,4 +1,4 @@"));
    assert!(out.contains("@@ -17,4 +17,4 @@"));
  }
}
