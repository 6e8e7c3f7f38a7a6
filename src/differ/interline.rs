//! Character-level diff restricted to one replaced line pair.

use super::{sequence_opcodes, Tag};

/// Half-open byte ranges into a line.
pub type Regions = Vec<(usize, usize)>;

/// Returns the changed byte ranges of `old` and `new`, or `None` when the
/// lines are too dissimilar (or too long) for highlighting to be useful.
///
/// Similarity is `2 * matched / (len(old) + len(new))` over characters.
pub fn changed_regions(old: &str, new: &str, min_ratio: f64, max_len: usize) -> Option<(Regions, Regions)> {
  if old.len() > max_len || new.len() > max_len {
    return None;
  }

  let old_chars: Vec<(usize, char)> = old.char_indices().collect();
  let new_chars: Vec<(usize, char)> = new.char_indices().collect();
  let total = old_chars.len() + new_chars.len();
  if total == 0 {
    return Some((Vec::new(), Vec::new()));
  }

  let a: Vec<char> = old_chars.iter().map(|(_, c)| *c).collect();
  let b: Vec<char> = new_chars.iter().map(|(_, c)| *c).collect();
  let opcodes = sequence_opcodes(&a, &b);

  let matched: usize = opcodes
    .iter()
    .filter(|op| op.tag == Tag::Equal)
    .map(|op| op.old_len())
    .sum();
  let ratio = (2 * matched) as f64 / total as f64;
  if ratio < min_ratio {
    return None;
  }

  let byte_offset = |chars: &[(usize, char)], text: &str, index: usize| chars.get(index).map_or(text.len(), |(offset, _)| *offset);

  let mut old_regions = Regions::new();
  let mut new_regions = Regions::new();
  for op in opcodes.iter().filter(|op| op.tag != Tag::Equal) {
    if op.old_len() > 0 {
      old_regions.push((byte_offset(&old_chars, old, op.i1), byte_offset(&old_chars, old, op.i2)));
    }
    if op.new_len() > 0 {
      new_regions.push((byte_offset(&new_chars, new, op.j1), byte_offset(&new_chars, new, op.j2)));
    }
  }

  Some((old_regions, new_regions))
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_single_character_change() {
    let (old, new) = changed_regions("foo(bar)", "foo(baz)", 0.6, 1000).unwrap();
    assert_eq!(old, vec![(6, 7)]);
    assert_eq!(new, vec![(6, 7)]);
  }

  #[test]
  fn test_insertion_only_marks_new_side() {
    let (old, new) = changed_regions("value", "value + 1", 0.6, 1000).unwrap();
    assert!(old.is_empty());
    assert_eq!(new, vec![(5, 9)]);
  }

  #[test]
  fn test_dissimilar_lines_are_rejected() {
    assert_eq!(changed_regions("completely", "different!", 0.6, 1000), None);
  }

  #[test]
  fn test_long_lines_are_skipped() {
    let old = "a".repeat(50);
    let new = format!("{}b", "a".repeat(49));
    assert_eq!(changed_regions(&old, &new, 0.6, 40), None);
    assert!(changed_regions(&old, &new, 0.6, 100).is_some());
  }

  #[test]
  fn test_regions_use_byte_offsets() {
    let (old, new) = changed_regions("naïve café", "naïve cafe", 0.6, 1000).unwrap();
    // 'é' occupies two bytes at offset 10 on the old side.
    assert_eq!(old, vec![(10, 12)]);
    assert_eq!(new, vec![(10, 11)]);
  }
}
