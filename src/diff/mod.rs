//! Diff text handling.
//!
//! This module parses unified and context diffs into structured
//! [`ParsedFileChange`] records and renders unified diffs from text.

pub mod parser;
pub mod policy;
pub mod traits;
pub mod types;
pub mod unified;

pub use parser::{DiffParser, DiffParserError};
pub use policy::{FileMetadata, MetadataExtractor, ParserPolicy, PolicyRegistry, RevisionClassifier};
pub use traits::{ByteLines, FilePath, Utf8String};
pub use types::*;
