//! Per-language detection of "interesting" lines (function and class
//! declarations) used to label collapsed regions of a diff.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;

struct Language {
  extensions: &'static [&'static str],
  patterns:   Vec<Regex>
}

impl Language {
  fn new(extensions: &'static [&'static str], patterns: &[&str]) -> Self {
    let patterns = patterns
      .iter()
      .map(|pattern| Regex::new(pattern).expect("Invalid interesting-line pattern"))
      .collect();
    Self { extensions, patterns }
  }
}

const CLASS_OR_METHOD_JAVA: &str =
  r"^\s*((public|private|protected|static)\s+)+([a-zA-Z_][a-zA-Z0-9_\.\[\]]*\s+)+?[a-zA-Z_][a-zA-Z0-9_]*\s*\(";
const OBJC_DECLARATION: &str = r"^@(interface|implementation|class|protocol)";

static LANGUAGES: Lazy<Vec<Language>> = Lazy::new(|| {
  vec![
    Language::new(&["c", "h", "cc", "cpp", "cxx", "hh", "hpp", "hxx"], &[OBJC_DECLARATION, r"^[A-Za-z0-9$_]"]),
    Language::new(&["cs"], &[
      CLASS_OR_METHOD_JAVA,
      r"^\s*((public|static|private|protected|internal|abstract|partial)\s+)*(class|struct)\s+([A-Za-z0-9_])+"
    ]),
    Language::new(&["java"], &[
      CLASS_OR_METHOD_JAVA,
      r"^\s*((public|static|private|protected)\s+)*(class|struct)\s+([A-Za-z0-9_])+"
    ]),
    Language::new(&["js", "mjs", "ts"], &[
      r"^\s*function [A-Za-z0-9_]+\s*\(",
      r"^\s*(var\s+|let\s+|const\s+)?[A-Za-z0-9_]+\s*[=:]\s*function\s*\(",
      r"^\s*(export\s+)?class\s+[A-Za-z0-9_]+"
    ]),
    Language::new(&["m", "mm"], &[OBJC_DECLARATION, r"^[-+]\s+\([^\)]+\)\s+[A-Za-z0-9_]+[^;]*$"]),
    Language::new(&["php"], &[
      r"^\s*(public |private |protected )?(static )?(abstract )?(final )?(class|function) [A-Za-z0-9_]+"
    ]),
    Language::new(&["pl", "pm"], &[r"^\s*sub [A-Za-z0-9_]+"]),
    Language::new(&["py"], &[r"^\s*(async\s+)?(def|class) [A-Za-z0-9_]+\s*\(?"]),
    Language::new(&["rb"], &[r"^\s*(def|class|module) [A-Za-z0-9_:]+"]),
    Language::new(&["rs"], &[
      r"^\s*(pub(\([^)]*\))?\s+)?((async|const|unsafe|extern)\s+)*fn\s+[A-Za-z0-9_]+",
      r"^\s*(pub(\([^)]*\))?\s+)?(struct|enum|trait|union|mod)\s+[A-Za-z0-9_]+",
      r"^\s*impl\b"
    ]),
  ]
});

fn patterns_for(filename: &str) -> Option<&'static [Regex]> {
  let extension = filename.rsplit_once('.')?.1.to_ascii_lowercase();
  LANGUAGES
    .iter()
    .find(|language| language.extensions.contains(&extension.as_str()))
    .map(|language| language.patterns.as_slice())
}

/// Interesting lines of both sides, as 1-based line numbers and text.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct InterestingLines {
  pub orig: Vec<(usize, String)>,
  pub new:  Vec<(usize, String)>
}

impl InterestingLines {
  /// Nearest interesting original line at or before `line`.
  pub fn header_for_orig(&self, line: usize) -> Option<&(usize, String)> {
    nearest(&self.orig, line)
  }

  /// Nearest interesting new line at or before `line`.
  pub fn header_for_new(&self, line: usize) -> Option<&(usize, String)> {
    nearest(&self.new, line)
  }
}

fn nearest(lines: &[(usize, String)], line: usize) -> Option<&(usize, String)> {
  let end = lines.partition_point(|(number, _)| *number <= line);
  end.checked_sub(1).map(|index| &lines[index])
}

/// Accumulates interesting lines while the opcode stream is walked.
pub(crate) struct Scanner {
  patterns: Option<&'static [Regex]>,
  lines:    InterestingLines
}

impl Scanner {
  pub(crate) fn for_filename(filename: &str) -> Self {
    Self { patterns: patterns_for(filename), lines: InterestingLines::default() }
  }

  pub(crate) fn scan_orig(&mut self, index: usize, line: &str) {
    if let Some(text) = self.matches(line) {
      self.lines.orig.push((index + 1, text));
    }
  }

  pub(crate) fn scan_new(&mut self, index: usize, line: &str) {
    if let Some(text) = self.matches(line) {
      self.lines.new.push((index + 1, text));
    }
  }

  fn matches(&self, line: &str) -> Option<String> {
    let line = line.trim_end_matches(['\r', '\n']);
    self
      .patterns?
      .iter()
      .any(|pattern| pattern.is_match(line))
      .then(|| line.to_string())
  }

  pub(crate) fn finish(self) -> InterestingLines {
    self.lines
  }
}
