//! Error types for `augur-core`.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
  #[error("invalid game date: {0:?}")]
  InvalidDate(String),

  #[error("record for playthrough {found:?} offered to history of {expected:?}")]
  PlaythroughMismatch { expected: String, found: String },

  #[error(
    "playthrough {playthrough_id:?} is bound to campaign {bound:?}, but the \
     save belongs to campaign {found:?}"
  )]
  IdentityCollision {
    playthrough_id: String,
    bound:          String,
    found:          String,
  },

  /// Histories are stored as JSON, which has no encoding for NaN or infinity.
  #[error("record field {field} is not a finite number")]
  NonFinite { field: String },
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
