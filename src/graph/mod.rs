//! Commits, file changes and their ancestry.
//!
//! A commit series is linear: [`CommitGraph::build`] rejects duplicate ids,
//! branches, extra roots and cycles up front so ancestor queries can simply
//! walk the chain.

mod commit;
mod diffset;
mod history;

pub use commit::{compute_line_counts, compute_line_counts_with_content, Commit, FileChange, LineCountError, LineCounts, Signature};
pub use diffset::{DiffSet, FileChangeRef};
pub use history::{diff_history, CommitGraph, GraphError, HistoryEntry, HistoryEntryKind, Interval};
