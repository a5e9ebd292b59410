//! Error types for the augur-pdx codec.

use thiserror::Error;

use crate::parse::ParseError;

#[derive(Debug, Error)]
pub enum Error {
  #[error("parse error at {0}")]
  Parse(#[from] ParseError),

  #[error("cannot extract {field}: {reason}")]
  Extract { field: String, reason: String },

  #[error("binary snapshot decoder unavailable: {reason}")]
  DecoderUnavailable { reason: String },

  #[error("binary snapshot could not be decoded: {reason}")]
  DecodeFailed { reason: String },
}

impl Error {
  /// Pipeline stage the error belongs to.
  pub fn stage(&self) -> &'static str {
    match self {
      Self::Parse(_) => "parse",
      Self::Extract { .. } => "extract",
      Self::DecoderUnavailable { .. } | Self::DecodeFailed { .. } => "decode",
    }
  }

  pub fn is_decoder_failure(&self) -> bool { self.stage() == "decode" }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
