use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use config::{Config, FileFormat};
use anyhow::{Context, Result};

// Constants
const DEFAULT_CONTEXT_LINES: i64 = 3;
const DEFAULT_INTERLINE_MIN_RATIO: f64 = 0.6;
const DEFAULT_INTERLINE_MAX_LINE_LEN: i64 = 10_000;
const DEFAULT_MOVE_MIN_LINES: i64 = 2;
const DEFAULT_MOVE_MIN_CHARS: i64 = 16;
const DEFAULT_BACKEND: &str = "git";
const ENV_PREFIX: &str = "DIFFSET";

/// Tunables for the diff engine.
///
/// Loaded from built-in defaults, then an optional INI file, then
/// `DIFFSET_*` environment variables.
#[derive(Debug, Clone, Deserialize, PartialEq, Serialize)]
pub struct Settings {
  pub context_lines:          usize,
  pub ignore_space:           bool,
  pub interline_min_ratio:    f64,
  pub interline_max_line_len: usize,
  pub move_min_lines:         usize,
  pub move_min_chars:         usize,
  pub loose_validation:       bool,
  pub backend:                String
}

impl Default for Settings {
  fn default() -> Self {
    Self {
      context_lines:          DEFAULT_CONTEXT_LINES as usize,
      ignore_space:           false,
      interline_min_ratio:    DEFAULT_INTERLINE_MIN_RATIO,
      interline_max_line_len: DEFAULT_INTERLINE_MAX_LINE_LEN as usize,
      move_min_lines:         DEFAULT_MOVE_MIN_LINES as usize,
      move_min_chars:         DEFAULT_MOVE_MIN_CHARS as usize,
      loose_validation:       false,
      backend:                DEFAULT_BACKEND.to_string()
    }
  }
}

/// Location of the user-level config file.
pub fn default_config_path() -> Result<PathBuf> {
  home::home_dir()
    .map(|dir| dir.join(".config/git-diffset/config.ini"))
    .context("Failed to determine home directory")
}

impl Settings {
  /// Loads settings using the user-level config file, if it exists.
  pub fn load() -> Result<Self> {
    let path = default_config_path()?;
    Self::load_from(Some(&path))
  }

  /// Loads settings from `file` (missing files are skipped) and the environment.
  pub fn load_from(file: Option<&Path>) -> Result<Self> {
    let mut builder = Config::builder()
      .set_default("context_lines", DEFAULT_CONTEXT_LINES)?
      .set_default("ignore_space", false)?
      .set_default("interline_min_ratio", DEFAULT_INTERLINE_MIN_RATIO)?
      .set_default("interline_max_line_len", DEFAULT_INTERLINE_MAX_LINE_LEN)?
      .set_default("move_min_lines", DEFAULT_MOVE_MIN_LINES)?
      .set_default("move_min_chars", DEFAULT_MOVE_MIN_CHARS)?
      .set_default("loose_validation", false)?
      .set_default("backend", DEFAULT_BACKEND)?;

    if let Some(file) = file {
      log::debug!("Reading settings from {}", file.display());
      builder = builder.add_source(config::File::new(file.to_string_lossy().as_ref(), FileFormat::Ini).required(false));
    }

    builder
      .add_source(config::Environment::with_prefix(ENV_PREFIX).try_parsing(true))
      .build()?
      .try_deserialize()
      .context("Failed to deserialize diffset settings")
  }
}
