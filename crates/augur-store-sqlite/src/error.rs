//! Error type for `augur-store-sqlite`.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
  #[error("core error: {0}")]
  Core(#[from] augur_core::Error),

  #[error("database error: {0}")]
  Database(#[from] tokio_rusqlite::Error),

  #[error("json error: {0}")]
  Json(#[from] serde_json::Error),

  #[error("i/o error: {0}")]
  Io(#[from] std::io::Error),

  #[error("date/time parse error: {0}")]
  DateParse(String),

  /// Ids become file names, so they are restricted to `[A-Za-z0-9_-]`.
  #[error("invalid playthrough id: {0:?}")]
  InvalidPlaythroughId(String),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
