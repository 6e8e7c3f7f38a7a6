#[macro_export]
macro_rules! profile {
  ($name:expr) => {
    let _profile_span = tracing::span!(tracing::Level::DEBUG, $name);
    let _profile_enter = _profile_span.enter();
  };
}

pub mod config;
pub mod diff;
pub mod differ;
pub mod error;
pub mod graph;
pub mod ingest;
pub mod patch;
pub mod profiling;
pub mod store;
pub mod validation;

// Re-exports
pub use config::Settings;
pub use diff::{DiffParser, FileStatus, ParsedFileChange, Revision};
pub use differ::{analyze, diff, Differ, Opcode, Tag};
pub use error::Error;
pub use graph::{Commit, CommitGraph, DiffSet, FileChange};
pub use ingest::{CommitHeader, Ingestor};
pub use patch::patch;
pub use profiling::Profile;
pub use store::{BlobRef, BlobStore, MemoryBlobStore};
pub use validation::{HistoryLookup, MatchMode, ValidationInfo};
