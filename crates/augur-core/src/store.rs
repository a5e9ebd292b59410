//! Storage traits for playthrough histories and ingestion state.
//!
//! Implemented by storage backends (e.g. `augur-store-sqlite`). The monitor
//! depends on these abstractions, not on a concrete backend.

use std::{future::Future, path::Path};

use crate::{
  history::{AppendOutcome, PlaythroughSummary},
  ingest::{IngestionState, PlaythroughBinding, SeenFile},
  record::SnapshotRecord,
};

// ─── History ─────────────────────────────────────────────────────────────────

/// Append-only, per-playthrough history of snapshot records.
///
/// Each playthrough is one durable unit. A write either lands completely or
/// not at all; a record for a `game_day` already present replaces the old one
/// atomically.
///
/// All methods return `Send` futures so the trait can be used from tasks on
/// a multi-threaded tokio runtime.
pub trait HistoryStore: Send + Sync {
  type Error: std::error::Error + Send + Sync + 'static;

  /// Persist `record` under `playthrough_id`.
  ///
  /// Appends to a given playthrough are serialized; appends to different
  /// playthroughs may proceed concurrently.
  fn append<'a>(
    &'a self,
    playthrough_id: &'a str,
    record: SnapshotRecord,
  ) -> impl Future<Output = Result<AppendOutcome, Self::Error>> + Send + 'a;

  /// All records of a playthrough, ascending by `game_day`. An unknown
  /// playthrough yields an empty list.
  fn load<'a>(
    &'a self,
    playthrough_id: &'a str,
  ) -> impl Future<Output = Result<Vec<SnapshotRecord>, Self::Error>> + Send + 'a;

  fn list_playthroughs(
    &self,
  ) -> impl Future<Output = Result<Vec<String>, Self::Error>> + Send + '_;

  /// Record count and date range, or `None` for an unknown playthrough.
  fn summary<'a>(
    &'a self,
    playthrough_id: &'a str,
  ) -> impl Future<Output = Result<Option<PlaythroughSummary>, Self::Error>>
  + Send
  + 'a;
}

// ─── Ingestion state ─────────────────────────────────────────────────────────

/// Durable [`IngestionState`] keyed by watched directory.
pub trait StateStore: Send + Sync {
  type Error: std::error::Error + Send + Sync + 'static;

  /// Load the state for `directory`; a directory never seen before yields an
  /// empty state.
  fn load_state<'a>(
    &'a self,
    directory: &'a Path,
  ) -> impl Future<Output = Result<IngestionState, Self::Error>> + Send + 'a;

  /// Durably record one finished file, together with the binding of the
  /// playthrough it was written to, in a single transaction.
  fn record_seen<'a>(
    &'a self,
    directory: &'a Path,
    file: &'a SeenFile,
    binding: Option<&'a PlaythroughBinding>,
  ) -> impl Future<Output = Result<(), Self::Error>> + Send + 'a;

  fn set_last_drained<'a>(
    &'a self,
    directory: &'a Path,
    drained: bool,
  ) -> impl Future<Output = Result<(), Self::Error>> + Send + 'a;

  /// Forget everything recorded for `directory`. Histories are untouched.
  fn reset<'a>(
    &'a self,
    directory: &'a Path,
  ) -> impl Future<Output = Result<(), Self::Error>> + Send + 'a;
}
