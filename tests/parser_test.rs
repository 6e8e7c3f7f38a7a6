use diffset::diff::{DiffParser, DiffParserError, FileStatus, LineKind, ParserPolicy, PolicyRegistry, Revision};
use proptest::prelude::*;

const GIT_SERIES: &str = r#"From 5f3c1d2 Mon Sep 17 00:00:00 2001
From: Jane Doe <jane@example.com>
Subject: [PATCH] Rework greeting

---
diff --git a/src/greet.rs b/src/greet.rs
index 83db48f..bf269f4 100644
--- a/src/greet.rs
+++ b/src/greet.rs
@@ -1,5 +1,6 @@ mod greet
 pub fn greet(name: &str) -> String {
-  format!("Hello {}", name)
+  let name = name.trim();
+  format!("Hello, {}!", name)
 }

 pub fn bye() {}
diff --git a/docs/old.md b/docs/new.md
similarity index 92%
rename from docs/old.md
rename to docs/new.md
index 1111111..2222222
--- a/docs/old.md
+++ b/docs/new.md
@@ -1,2 +1,2 @@
 # Title
-old text
+new text
diff --git a/assets/logo.png b/assets/logo.png
deleted file mode 100644
index 3333333..0000000
Binary files a/assets/logo.png and /dev/null differ
"#;

#[test]
fn test_git_series() {
  let files = DiffParser::new(ParserPolicy::git()).parse(GIT_SERIES.as_bytes()).unwrap();
  assert_eq!(files.len(), 3);

  let greet = &files[0];
  assert_eq!(greet.new_file, "src/greet.rs");
  assert_eq!(greet.status, FileStatus::Modified);
  assert_eq!(greet.hunks[0].section, "mod greet");
  assert_eq!((greet.insert_count, greet.delete_count), (2, 1));
  assert!(greet.data.starts_with(b"From 5f3c1d2"));

  let moved = &files[1];
  assert_eq!((moved.orig_file.as_str(), moved.new_file.as_str()), ("docs/old.md", "docs/new.md"));
  assert_eq!(moved.status, FileStatus::Moved);
  assert_eq!(moved.similarity, Some(92));
  assert!(!moved.is_pure_rename());

  let logo = &files[2];
  assert!(logo.binary);
  assert_eq!(logo.status, FileStatus::Deleted);
  assert_eq!(logo.new_file, "assets/logo.png");
  assert_eq!(logo.orig_revision, Revision::Known("3333333".into()));
  assert_eq!(logo.new_revision, Revision::Unknown);
}

#[test]
fn test_per_file_data_reassembles_diff() {
  let files = DiffParser::new(ParserPolicy::git()).parse(GIT_SERIES.as_bytes()).unwrap();
  let joined: Vec<u8> = files.iter().flat_map(|file| file.data.clone()).collect();
  assert_eq!(joined, GIT_SERIES.as_bytes());
}

#[test]
fn test_subversion_with_base_dir() {
  let diff = "Index: lib/util.c\n===================================================================\n\
              --- lib/util.c\t(revision 41)\n+++ lib/util.c\t(revision 42)\n@@ -3,3 +3,3 @@\n a\n-b\n+c\n d\n";
  let registry = PolicyRegistry::with_defaults();
  let files = DiffParser::for_backend(&registry, "svn")
    .unwrap()
    .with_base_dir("/trunk")
    .parse(diff.as_bytes())
    .unwrap();

  assert_eq!(files[0].orig_file, "/trunk/lib/util.c");
  assert_eq!(files[0].orig_revision, Revision::Known("41".into()));
  assert_eq!(files[0].new_revision, Revision::Known("42".into()));
}

#[test]
fn test_context_format_with_no_newline() {
  let diff = "*** a.txt\t2024-01-01 00:00:00\n--- a.txt\t2024-01-02 00:00:00\n***************\n*** 1,2 ****\n  keep\n! old\n\\ No newline at end of file\n--- 1,2 ----\n  keep\n! new\n";
  let files = DiffParser::default().parse(diff.as_bytes()).unwrap();
  let lines = &files[0].hunks[0].lines;
  assert_eq!(lines.iter().map(|l| l.kind).collect::<Vec<_>>(), vec![
    LineKind::Context,
    LineKind::Delete,
    LineKind::Insert
  ]);
  assert_eq!(lines[1].line.text, b"old");
  assert_eq!(lines[1].line.eol, diffset::diff::Eol::Missing);
}

#[test]
fn test_errors_are_distinct() {
  let parser = DiffParser::default();
  assert_eq!(parser.parse(b"just some text\n").unwrap_err(), DiffParserError::EmptyDiff);
  assert!(matches!(
    parser.parse(b"--- a\n+++ b\n@@ -1,2 +1,2 @@\n a\n"),
    Err(DiffParserError::TruncatedHunk { line: 3 })
  ));
  assert!(matches!(
    parser.parse(b"--- a\n+++ b\n@@ -1,1 +1,1 @@\n a\n b\n c\n"),
    Ok(_)
  ));
  assert!(matches!(
    parser.parse(b"--- a\n+++ b\n@@ -1,1 +1,2 @@\n-a\n-b\n"),
    Err(DiffParserError::MalformedHunk { line: 3, .. })
  ));
}

fn hunk_body() -> impl Strategy<Value = Vec<(char, String)>> {
  prop::collection::vec((prop::sample::select(vec![' ', '-', '+']), "[a-z]{0,5}"), 1..20)
}

proptest! {
  #[test]
  fn test_counts_match_hunk_lines(body in hunk_body()) {
    let old_len = body.iter().filter(|(kind, _)| *kind != '+').count();
    let new_len = body.iter().filter(|(kind, _)| *kind != '-').count();
    let mut diff = format!("--- a\n+++ b\n@@ -1,{old_len} +1,{new_len} @@\n");
    for (kind, text) in &body {
      diff.push(*kind);
      diff.push_str(text);
      diff.push('\n');
    }

    let files = DiffParser::default().parse(diff.as_bytes()).unwrap();
    let inserts = body.iter().filter(|(kind, _)| *kind == '+').count();
    let deletes = body.iter().filter(|(kind, _)| *kind == '-').count();
    prop_assert_eq!((files[0].insert_count, files[0].delete_count), (inserts, deletes));
    prop_assert_eq!(files[0].count_lines(), files[0].count_lines());
    prop_assert_eq!(files[0].count_lines(), (inserts, deletes));
  }
}
