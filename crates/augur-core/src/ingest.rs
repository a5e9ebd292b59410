//! Ingestion bookkeeping for one watched directory.
//!
//! [`IngestionState`] is owned by exactly one sequencer task. It is loaded
//! when monitoring starts and flushed to the state store after every
//! completed ingestion, never before.

use std::{
  collections::{BTreeMap, HashMap},
  fmt,
  path::{Path, PathBuf},
};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{Error, Result};

// ─── Fingerprint ─────────────────────────────────────────────────────────────

/// Content-derived identity of a snapshot file (lowercase hex SHA-256).
#[derive(
  Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct Fingerprint(String);

impl Fingerprint {
  pub fn from_hex(hex: impl Into<String>) -> Self { Self(hex.into()) }

  pub fn as_str(&self) -> &str { &self.0 }

  /// First 12 hex digits, for log lines.
  pub fn short(&self) -> &str { &self.0[..self.0.len().min(12)] }
}

impl fmt::Display for Fingerprint {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(&self.0)
  }
}

// ─── Seen files ──────────────────────────────────────────────────────────────

/// How a fingerprinted file left the pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SeenOutcome {
  Ingested,
  Superseded,
  /// Parse, extract, decode or identity failure; never retried.
  Failed,
}

impl SeenOutcome {
  pub fn as_str(&self) -> &'static str {
    match self {
      Self::Ingested => "ingested",
      Self::Superseded => "superseded",
      Self::Failed => "failed",
    }
  }

  /// Unknown values map to `Failed` so a newer state file never reopens a
  /// file for reprocessing.
  pub fn parse(s: &str) -> Self {
    match s {
      "ingested" => Self::Ingested,
      "superseded" => Self::Superseded,
      _ => Self::Failed,
    }
  }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SeenFile {
  pub fingerprint:    Fingerprint,
  pub path:           PathBuf,
  pub seen_at:        DateTime<Utc>,
  pub outcome:        SeenOutcome,
  #[serde(default)]
  pub playthrough_id: Option<String>,
}

// ─── Playthrough identity ────────────────────────────────────────────────────

/// What the monitor knows about a playthrough id it has written to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlaythroughBinding {
  pub playthrough_id: String,
  /// The filename hint the id was first derived from.
  pub hint:           String,
  /// Campaign identity written inside the saves, once one has been seen.
  pub campaign_id:    Option<String>,
}

/// Reduce a file stem to its playthrough prefix.
///
/// Strips autosave / backup markers, `_YYYY_MM_DD` and `_YYYY` date
/// fragments, and a trailing `_<n>` slot counter. An empty result falls back
/// to `campaign`.
pub fn playthrough_hint(stem: &str) -> String {
  let mut name = stem.to_string();
  for marker in ["autosave", "backup"] {
    while let Some(pos) = name.to_ascii_lowercase().find(marker) {
      name.replace_range(pos..pos + marker.len(), "");
    }
  }

  let parts: Vec<&str> = name.split('_').filter(|p| !p.is_empty()).collect();
  let mut kept: Vec<&str> = Vec::with_capacity(parts.len());
  let mut i = 0;
  while i < parts.len() {
    let part = parts[i];
    let is_year = part.len() == 4 && part.bytes().all(|b| b.is_ascii_digit());
    if is_year {
      let month_day = parts.get(i + 1..i + 3).is_some_and(|rest| {
        rest
          .iter()
          .all(|p| (1..=2).contains(&p.len()) && p.bytes().all(|b| b.is_ascii_digit()))
      });
      i += if month_day { 3 } else { 1 };
      continue;
    }
    kept.push(part);
    i += 1;
  }
  while kept
    .last()
    .is_some_and(|last| last.bytes().all(|b| b.is_ascii_digit()))
  {
    kept.pop();
  }

  let id = sanitize_playthrough_id(&kept.join("_"));
  if id.is_empty() { "campaign".to_string() } else { id }
}

/// Restrict an id to `[A-Za-z0-9_-]` so it is safe as a file name.
pub fn sanitize_playthrough_id(raw: &str) -> String {
  let mut out = String::with_capacity(raw.len());
  for c in raw.trim().chars() {
    if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
      out.push(c);
    } else if !out.ends_with('_') {
      out.push('_');
    }
  }
  out.trim_matches('_').to_string()
}

// ─── IngestionState ──────────────────────────────────────────────────────────

#[derive(Debug, Clone, Default)]
pub struct IngestionState {
  directory:    PathBuf,
  seen:         HashMap<Fingerprint, SeenFile>,
  playthroughs: BTreeMap<String, PlaythroughBinding>,
  /// `true` when the last monitor run drained its backlog before stopping.
  pub last_drained: bool,
}

impl IngestionState {
  pub fn new(directory: impl Into<PathBuf>) -> Self {
    Self {
      directory: directory.into(),
      ..Self::default()
    }
  }

  pub fn directory(&self) -> &Path { &self.directory }

  pub fn is_seen(&self, fingerprint: &Fingerprint) -> bool {
    self.seen.contains_key(fingerprint)
  }

  pub fn seen_file(&self, fingerprint: &Fingerprint) -> Option<&SeenFile> {
    self.seen.get(fingerprint)
  }

  pub fn seen_count(&self) -> usize { self.seen.len() }

  pub fn mark_seen(&mut self, file: SeenFile) {
    self.seen.insert(file.fingerprint.clone(), file);
  }

  pub fn binding(&self, playthrough_id: &str) -> Option<&PlaythroughBinding> {
    self.playthroughs.get(playthrough_id)
  }

  pub fn bindings(&self) -> impl Iterator<Item = &PlaythroughBinding> {
    self.playthroughs.values()
  }

  /// Check that a save claiming `campaign_id` may be written under
  /// `playthrough_id`.
  ///
  /// Two different campaign ids under one playthrough id are an identity
  /// collision: they are two campaigns whose file names share a prefix.
  pub fn check_binding(
    &self,
    playthrough_id: &str,
    campaign_id: Option<&str>,
  ) -> Result<()> {
    let Some(binding) = self.playthroughs.get(playthrough_id) else {
      return Ok(());
    };
    match (binding.campaign_id.as_deref(), campaign_id) {
      (Some(bound), Some(found)) if bound != found => {
        Err(Error::IdentityCollision {
          playthrough_id: playthrough_id.to_string(),
          bound:          bound.to_string(),
          found:          found.to_string(),
        })
      }
      _ => Ok(()),
    }
  }

  /// Record (or refine) the binding for `playthrough_id` and return it.
  ///
  /// Callers run [`IngestionState::check_binding`] first; a campaign id only
  /// ever fills an empty slot here.
  pub fn bind(
    &mut self,
    playthrough_id: &str,
    hint: &str,
    campaign_id: Option<&str>,
  ) -> &PlaythroughBinding {
    let binding = self
      .playthroughs
      .entry(playthrough_id.to_string())
      .or_insert_with(|| PlaythroughBinding {
        playthrough_id: playthrough_id.to_string(),
        hint:           hint.to_string(),
        campaign_id:    None,
      });
    if binding.campaign_id.is_none() {
      binding.campaign_id = campaign_id.map(str::to_string);
    }
    binding
  }

  /// Restore a binding loaded from persistent state.
  pub fn restore_binding(&mut self, binding: PlaythroughBinding) {
    self
      .playthroughs
      .insert(binding.playthrough_id.clone(), binding);
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn seen(fp: &str) -> SeenFile {
    SeenFile {
      fingerprint:    Fingerprint::from_hex(fp),
      path:           PathBuf::from("/saves/a.v3"),
      seen_at:        Utc::now(),
      outcome:        SeenOutcome::Ingested,
      playthrough_id: Some("rome".into()),
    }
  }

  #[test]
  fn hint_strips_autosave_and_dates() {
    assert_eq!(playthrough_hint("autosave"), "campaign");
    assert_eq!(playthrough_hint("autosave_2"), "campaign");
    assert_eq!(playthrough_hint("Prussia_1848_3_12"), "Prussia");
    assert_eq!(playthrough_hint("Prussia_autosave_1850"), "Prussia");
    assert_eq!(playthrough_hint("great britain_backup_3"), "great_britain");
    assert_eq!(playthrough_hint("japan_run_2"), "japan_run");
  }

  #[test]
  fn sanitize_collapses_unsafe_characters() {
    assert_eq!(sanitize_playthrough_id("  Rome / Empire! "), "Rome_Empire");
    assert_eq!(sanitize_playthrough_id("../../etc"), "etc");
  }

  #[test]
  fn mark_seen_is_keyed_by_content_not_path() {
    let mut state = IngestionState::new("/saves");
    state.mark_seen(seen("abc"));
    let mut other_path = seen("abc");
    other_path.path = PathBuf::from("/saves/b.v3");
    state.mark_seen(other_path);
    assert_eq!(state.seen_count(), 1);
    assert!(state.is_seen(&Fingerprint::from_hex("abc")));
  }

  #[test]
  fn differing_campaign_ids_collide() {
    let mut state = IngestionState::new("/saves");
    state.bind("campaign", "campaign", Some("uuid-1"));
    assert!(state.check_binding("campaign", Some("uuid-1")).is_ok());
    assert!(state.check_binding("campaign", None).is_ok());
    assert!(matches!(
      state.check_binding("campaign", Some("uuid-2")),
      Err(Error::IdentityCollision { .. })
    ));
  }

  #[test]
  fn bind_fills_missing_campaign_id_once() {
    let mut state = IngestionState::new("/saves");
    state.bind("rome", "rome", None);
    state.bind("rome", "rome", Some("c-1"));
    state.bind("rome", "rome", Some("c-2"));
    assert_eq!(state.binding("rome").unwrap().campaign_id.as_deref(), Some("c-1"));
  }
}
