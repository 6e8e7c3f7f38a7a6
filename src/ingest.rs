//! Turns one commit's raw diff into stored, validated file changes.

use thiserror::Error;

use crate::config::Settings;
use crate::diff::{DiffParser, DiffParserError, ParsedFileChange, PolicyRegistry, Revision};
use crate::graph::{Commit, FileChange, Signature};
use crate::profile;
use crate::store::BlobStore;
use crate::validation::{HistoryLookup, MatchMode, ValidationError, ValidationInfo};

#[derive(Error, Debug)]
pub enum IngestError {
  #[error(transparent)]
  Parse(#[from] DiffParserError),

  #[error(transparent)]
  Validation(#[from] ValidationError),

  #[error("{path} at revision {revision} does not exist")]
  FileNotFound { path: String, revision: Revision }
}

/// Commit metadata supplied alongside the diff.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommitHeader {
  pub commit_id: String,
  pub parent_id: String,
  pub author:    Signature,
  pub committer: Option<Signature>,
  pub message:   String
}

impl CommitHeader {
  pub fn new(commit_id: impl Into<String>, parent_id: impl Into<String>, author: Signature) -> Self {
    Self {
      commit_id: commit_id.into(),
      parent_id: parent_id.into(),
      author,
      committer: None,
      message: String::new()
    }
  }
}

/// Parses, validates and stores commits of one series.
pub struct Ingestor<'a> {
  parser: DiffParser,
  store:  &'a dyn BlobStore,
  mode:   MatchMode
}

impl<'a> Ingestor<'a> {
  pub fn new(parser: DiffParser, store: &'a dyn BlobStore) -> Self {
    Self { parser, store, mode: MatchMode::Strict }
  }

  /// Ingestor using the backend and matching mode from `settings`.
  pub fn from_settings(registry: &PolicyRegistry, store: &'a dyn BlobStore, settings: &Settings) -> Result<Self, IngestError> {
    let parser = DiffParser::for_backend(registry, &settings.backend)?;
    Ok(Self::new(parser, store).with_mode(MatchMode::from_loose(settings.loose_validation)))
  }

  pub fn with_mode(mut self, mode: MatchMode) -> Self {
    self.mode = mode;
    self
  }

  /// Ingests one commit on top of `info`.
  ///
  /// Every file whose source existed before the commit is checked first
  /// against the parent diff, then the recorded history from the commit's
  /// parent, and finally `exists`. Returns the commit and the updated
  /// validation info; `info` itself is left untouched.
  pub fn ingest_commit<F>(
    &self,
    info: &ValidationInfo,
    header: CommitHeader,
    diff: &[u8],
    parent_diff: Option<&[u8]>,
    mut exists: F
  ) -> Result<(Commit, ValidationInfo), IngestError>
  where
    F: FnMut(&str, &Revision) -> anyhow::Result<bool>
  {
    profile!("Ingest commit");
    info.check_can_add(&header.commit_id, &header.parent_id)?;

    let files = self.parser.parse(diff)?;
    let parent_files = match parent_diff {
      Some(data) if !data.iter().all(u8::is_ascii_whitespace) => self.parser.parse(data)?,
      _ => Vec::new()
    };
    log::debug!(
      "Ingesting commit {} with {} files ({} in parent diff)",
      header.commit_id,
      files.len(),
      parent_files.len()
    );

    // Resolve every source before anything reaches the store
    let mut resolved = Vec::with_capacity(files.len());
    for file in &files {
      let parent = parent_files
        .iter()
        .find(|parent| parent.new_file == file.orig_file);
      let source_revision = self.resolve_source(info, &header.parent_id, file, parent, &mut exists)?;
      resolved.push((file, parent, source_revision));
    }

    let changes: Vec<FileChange> = resolved
      .into_iter()
      .map(|(file, parent, source_revision)| {
        let mut change = FileChange::new(file.new_file.clone(), file.status, self.store.put(&file.data))
          .with_source(file.orig_file.clone(), source_revision)
          .with_dest_revision(file.new_revision.clone());
        change.binary = file.binary;
        change.parent_diff = parent.map(|parent| self.store.put(&parent.data));
        change
      })
      .collect();

    let mut updated = info.clone();
    updated.update(&header.commit_id, &header.parent_id, &changes)?;

    let mut commit = Commit::new(header.commit_id, header.parent_id, header.author)
      .with_message(header.message)
      .with_files(changes);
    commit.committer = header.committer;

    Ok((commit, updated))
  }

  /// Checks that `file`'s source exists and returns its revision.
  fn resolve_source<F>(
    &self,
    info: &ValidationInfo,
    parent_id: &str,
    file: &ParsedFileChange,
    parent: Option<&ParsedFileChange>,
    exists: &mut F
  ) -> Result<Revision, IngestError>
  where
    F: FnMut(&str, &Revision) -> anyhow::Result<bool>
  {
    let path = file.orig_file.as_str();
    let revision = &file.orig_revision;
    let not_found = || IngestError::FileNotFound { path: path.to_string(), revision: revision.clone() };

    if revision.is_pre_creation() {
      return Ok(revision.clone());
    }

    if let Some(parent) = parent {
      if parent.is_deleted() {
        return Err(not_found());
      }
      log::debug!("{} is provided by the parent diff", path);
      return Ok(revision.clone());
    }

    match info.lookup(parent_id, path, revision, self.mode)? {
      HistoryLookup::Present { commit_id, revision: recorded } => {
        log::debug!("{} found in history at commit {}", path, commit_id);
        match self.mode {
          MatchMode::Loose => Ok(recorded),
          MatchMode::Strict => Ok(revision.clone())
        }
      }
      HistoryLookup::RecordedAbsent { commit_id } => {
        log::debug!("{} was removed by commit {}", path, commit_id);
        Err(not_found())
      }
      HistoryLookup::Unknown => {
        if exists(path, revision).map_err(ValidationError::from)? {
          Ok(revision.clone())
        } else {
          Err(not_found())
        }
      }
    }
  }
}
