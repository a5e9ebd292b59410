//! Conversions between domain types and the plain-text column values stored
//! in SQLite.
//!
//! Timestamps are RFC 3339 strings; paths are stored lossily as UTF-8.

use std::path::{Path, PathBuf};

use augur_core::ingest::{
  Fingerprint, PlaythroughBinding, SeenFile, SeenOutcome,
};
use chrono::{DateTime, Utc};

use crate::{Error, Result};

// ─── DateTime<Utc> ───────────────────────────────────────────────────────────

pub fn encode_dt(dt: DateTime<Utc>) -> String { dt.to_rfc3339() }

pub fn decode_dt(s: &str) -> Result<DateTime<Utc>> {
  DateTime::parse_from_rfc3339(s)
    .map(|dt| dt.with_timezone(&Utc))
    .map_err(|e| Error::DateParse(e.to_string()))
}

// ─── Paths ───────────────────────────────────────────────────────────────────

pub fn encode_path(path: &Path) -> String { path.to_string_lossy().into_owned() }

// ─── Raw rows ────────────────────────────────────────────────────────────────

/// A `seen_files` row before decoding.
pub struct RawSeenFile {
  pub fingerprint:    String,
  pub path:           String,
  pub seen_at:        String,
  pub outcome:        String,
  pub playthrough_id: Option<String>,
}

impl RawSeenFile {
  pub fn into_seen_file(self) -> Result<SeenFile> {
    Ok(SeenFile {
      fingerprint:    Fingerprint::from_hex(self.fingerprint),
      path:           PathBuf::from(self.path),
      seen_at:        decode_dt(&self.seen_at)?,
      outcome:        SeenOutcome::parse(&self.outcome),
      playthrough_id: self.playthrough_id,
    })
  }
}

/// A `playthrough_index` row; no decoding needed.
pub struct RawBinding {
  pub playthrough_id: String,
  pub hint:           String,
  pub campaign_id:    Option<String>,
}

impl From<RawBinding> for PlaythroughBinding {
  fn from(raw: RawBinding) -> Self {
    Self {
      playthrough_id: raw.playthrough_id,
      hint:           raw.hint,
      campaign_id:    raw.campaign_id,
    }
  }
}
