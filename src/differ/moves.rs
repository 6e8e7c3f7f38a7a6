//! Detection of blocks of lines that were moved rather than rewritten.

use std::collections::{HashMap, HashSet};

use super::{AnnotatedOpcode, Tag};

/// Characters that on their own make a line boilerplate.
const INSIGNIFICANT_CHARS: &str = "{}()[];,#/*-=<>'\"\\|";

#[derive(Debug, Clone)]
struct Run {
  old_start: usize,
  new_start: usize,
  len:       usize
}

fn normalize(line: &str) -> String {
  line.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Number of characters in a line that carry meaning.
fn significance(line: &str) -> usize {
  let trimmed = line.trim();
  if trimmed.chars().all(|c| c.is_whitespace() || INSIGNIFICANT_CHARS.contains(c)) {
    0
  } else {
    trimmed.chars().filter(|c| !c.is_whitespace()).count()
  }
}

fn side_lines(opcodes: &[AnnotatedOpcode], old_side: bool) -> Vec<usize> {
  opcodes
    .iter()
    .map(|op| op.opcode)
    .filter(|op| match op.tag {
      Tag::Replace => true,
      Tag::Delete => old_side,
      Tag::Insert => !old_side,
      Tag::Equal => false
    })
    .flat_map(|op| if old_side { op.i1..op.i2 } else { op.j1..op.j2 })
    .collect()
}

/// Annotates delete/insert/replace opcodes with moved line mappings.
///
/// A run of consecutive removed lines matching a run of consecutive inserted
/// lines is a move only when it spans `min_lines` lines and its significant
/// content adds up to `min_chars` characters.
pub(crate) fn detect<S: AsRef<str>>(a: &[S], b: &[S], opcodes: &mut [AnnotatedOpcode], min_lines: usize, min_chars: usize) {
  let removed = side_lines(opcodes, true);
  let inserted = side_lines(opcodes, false);
  if removed.is_empty() || inserted.is_empty() {
    return;
  }

  let removed_set: HashSet<usize> = removed.iter().copied().collect();
  let mut by_content: HashMap<String, Vec<usize>> = HashMap::new();
  for &i in &removed {
    by_content.entry(normalize(a[i].as_ref())).or_default().push(i);
  }

  let mut runs: Vec<Run> = Vec::new();
  // old index expected next -> run id, for runs whose last new line is j - 1
  let mut open: HashMap<usize, usize> = HashMap::new();
  let mut last_j: Option<usize> = None;

  for &j in &inserted {
    if last_j.map_or(true, |prev| prev + 1 != j) {
      open.clear();
    }
    last_j = Some(j);

    let line = b[j].as_ref();
    let candidates = match by_content.get(&normalize(line)) {
      Some(candidates) => candidates,
      None => {
        open.clear();
        continue;
      }
    };

    let starts_run = significance(line) > 0;
    let mut next_open = HashMap::new();
    for &i in candidates {
      if let Some(run_id) = open.get(&i) {
        runs[*run_id].len += 1;
        next_open.insert(i + 1, *run_id);
      } else if starts_run {
        runs.push(Run { old_start: i, new_start: j, len: 1 });
        next_open.insert(i + 1, runs.len() - 1);
      }
    }
    // a run only continues onto removed lines
    next_open.retain(|i, _| removed_set.contains(i));
    open = next_open;
  }

  let mut accepted: Vec<Run> = runs
    .into_iter()
    .filter(|run| {
      let chars: usize = (run.new_start..run.new_start + run.len)
        .map(|j| significance(b[j].as_ref()))
        .sum();
      run.len >= min_lines && chars >= min_chars
    })
    .collect();
  accepted.sort_by(|x, y| y.len.cmp(&x.len).then(x.new_start.cmp(&y.new_start)));

  let mut used_old = HashSet::new();
  let mut used_new = HashSet::new();
  for run in accepted {
    let olds = run.old_start..run.old_start + run.len;
    let news = run.new_start..run.new_start + run.len;
    if olds.clone().any(|i| used_old.contains(&i)) || news.clone().any(|j| used_new.contains(&j)) {
      continue;
    }

    log::debug!("Detected move of {} lines from {} to {}", run.len, run.old_start + 1, run.new_start + 1);

    for (i, j) in olds.zip(news) {
      used_old.insert(i);
      used_new.insert(j);

      let old_op = opcodes.partition_point(|op| op.opcode.i2 <= i);
      opcodes[old_op].meta.moved_to.insert(i + 1, j + 1);

      let new_op = opcodes.partition_point(|op| op.opcode.j2 <= j);
      opcodes[new_op].meta.moved_from.insert(j + 1, i + 1);
    }
  }
}

#[cfg(test)]
mod tests {
  use crate::config::Settings;
  use crate::differ::{analyze, Tag};

  fn settings() -> Settings {
    Settings { move_min_lines: 2, move_min_chars: 10, ..Settings::default() }
  }

  #[test]
  fn test_detects_moved_block() {
    let a = ["fn helper() {", "  compute_everything();", "}", "", "fn main() {", "  run();", "}"];
    let b = ["fn main() {", "  run();", "}", "", "fn helper() {", "  compute_everything();", "}"];
    let analysis = analyze(&a, &b, "main.rs", &settings());

    let moved_to: Vec<_> = analysis
      .opcodes
      .iter()
      .flat_map(|op| op.meta.moved_to.iter().map(|(o, n)| (*o, *n)))
      .collect();
    let moved_from: Vec<_> = analysis
      .opcodes
      .iter()
      .flat_map(|op| op.meta.moved_from.iter().map(|(n, o)| (*n, *o)))
      .collect();

    assert!(!moved_to.is_empty());
    assert_eq!(moved_to.len(), moved_from.len());
    for (old, new) in &moved_to {
      assert_eq!(a[old - 1], b[new - 1]);
      assert!(moved_from.contains(&(*new, *old)));
    }
  }

  #[test]
  fn test_single_line_is_not_a_move() {
    let a = ["alpha_beta_gamma();", "one", "two", "three"];
    let b = ["one", "two", "three", "alpha_beta_gamma();"];
    let analysis = analyze(&a, &b, "x.c", &settings());
    assert!(analysis.opcodes.iter().all(|op| op.meta.moved_to.is_empty()));
  }

  #[test]
  fn test_boilerplate_blocks_are_not_moves() {
    let a = ["/*", " *", " */", "keep"];
    let b = ["keep", "/*", " *", " */"];
    let analysis = analyze(&a, &b, "x.c", &settings());
    assert!(analysis
      .opcodes
      .iter()
      .all(|op| op.meta.moved_to.is_empty() && op.meta.moved_from.is_empty()));
  }

  #[test]
  fn test_moves_are_attached_to_edit_opcodes() {
    let a = ["let first = load_configuration();", "let second = first.validate();", "x", "y", "z"];
    let b = ["x", "y", "z", "let first = load_configuration();", "let second = first.validate();"];
    let analysis = analyze(&a, &b, "lib.rs", &settings());

    for op in &analysis.opcodes {
      if !op.meta.moved_to.is_empty() {
        assert!(matches!(op.opcode.tag, Tag::Delete | Tag::Replace));
      }
      if !op.meta.moved_from.is_empty() {
        assert!(matches!(op.opcode.tag, Tag::Insert | Tag::Replace));
      }
    }
    let total: usize = analysis.opcodes.iter().map(|op| op.meta.moved_to.len()).sum();
    assert_eq!(total, 2);
  }
}
