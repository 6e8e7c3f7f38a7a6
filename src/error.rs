//! Crate-level error type and helpers for errors crossing the CLI edge.

use thiserror::Error;

use crate::diff::DiffParserError;
use crate::graph::{GraphError, LineCountError};
use crate::ingest::IngestError;
use crate::patch::PatchError;
use crate::validation::ValidationError;

/// Any error produced by the diff engine.
#[derive(Error, Debug)]
pub enum Error {
  #[error(transparent)]
  Parse(#[from] DiffParserError),

  #[error(transparent)]
  Patch(#[from] PatchError),

  #[error(transparent)]
  Graph(#[from] GraphError),

  #[error(transparent)]
  LineCount(#[from] LineCountError),

  #[error(transparent)]
  Validation(#[from] ValidationError),

  #[error(transparent)]
  Ingest(#[from] IngestError)
}

/// Checks whether an error chain was caused by a diff without any changes.
///
/// An empty diff is usually a user mistake (uploading before staging, or an
/// empty file), so callers report it differently from malformed input.
///
/// # Examples
///
/// ```
/// use diffset::diff::DiffParser;
/// use diffset::error::is_empty_diff;
///
/// let error = anyhow::Error::from(DiffParser::default().parse(b"").unwrap_err());
/// assert!(is_empty_diff(&error));
/// ```
pub fn is_empty_diff(error: &anyhow::Error) -> bool {
  error.chain().any(|cause| {
    matches!(cause.downcast_ref::<DiffParserError>(), Some(DiffParserError::EmptyDiff))
      || matches!(cause.downcast_ref::<PatchError>(), Some(PatchError::Parse(DiffParserError::EmptyDiff)))
      || matches!(cause.downcast_ref::<IngestError>(), Some(IngestError::Parse(DiffParserError::EmptyDiff)))
      || matches!(cause.downcast_ref::<Error>(), Some(Error::Parse(DiffParserError::EmptyDiff)))
  })
}
