//! Error types for the monitor.

use std::{fmt, path::PathBuf};

use augur_core::ingest::Fingerprint;
use serde::{Deserialize, Serialize};
use thiserror::Error;

type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Pipeline stage a file failed in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
  Read,
  Decode,
  Parse,
  Extract,
  Identity,
  Store,
  State,
}

impl Stage {
  pub fn as_str(&self) -> &'static str {
    match self {
      Self::Read => "read",
      Self::Decode => "decode",
      Self::Parse => "parse",
      Self::Extract => "extract",
      Self::Identity => "identity",
      Self::Store => "store",
      Self::State => "state",
    }
  }

  /// Failures that are the file's fault. The file is marked seen and never
  /// retried; any other stage leaves it eligible for a later run.
  pub fn is_file_scoped(&self) -> bool {
    matches!(self, Self::Decode | Self::Parse | Self::Extract | Self::Identity)
  }
}

impl fmt::Display for Stage {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str(self.as_str()) }
}

impl From<&augur_pdx::Error> for Stage {
  fn from(e: &augur_pdx::Error) -> Self {
    match e {
      augur_pdx::Error::Parse(_) => Self::Parse,
      augur_pdx::Error::Extract { .. } => Self::Extract,
      augur_pdx::Error::DecoderUnavailable { .. }
      | augur_pdx::Error::DecodeFailed { .. } => Self::Decode,
    }
  }
}

/// A single file's failure, with enough identity to find it again.
#[derive(Debug, Error)]
#[error("{stage} failed for {}: {source}", path.display())]
pub struct IngestError {
  pub stage:       Stage,
  pub path:        PathBuf,
  pub fingerprint: Option<Fingerprint>,
  #[source]
  pub source:      BoxError,
}

impl IngestError {
  pub fn new(
    stage: Stage,
    path: impl Into<PathBuf>,
    fingerprint: Option<Fingerprint>,
    source: impl Into<BoxError>,
  ) -> Self {
    Self {
      stage,
      path: path.into(),
      fingerprint,
      source: source.into(),
    }
  }
}

#[derive(Debug, Error)]
pub enum Error {
  #[error("save directory {} is unavailable: {reason}", path.display())]
  DirectoryUnavailable { path: PathBuf, reason: String },
  #[error("monitor is already running")]
  AlreadyRunning,
  #[error("monitor is not running")]
  NotRunning,
  #[error("watcher error: {0}")]
  Watch(#[from] notify::Error),
  #[error("store error: {0}")]
  Store(#[source] BoxError),
  #[error("pipeline task failed: {0}")]
  Task(#[from] tokio::task::JoinError),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
