//! What the monitor tells its observers.

use std::path::PathBuf;

use augur_core::{history::PlaythroughSummary, ingest::Fingerprint, record::RecordCounts};
use serde::{Deserialize, Serialize};

use crate::error::Stage;

/// Lifecycle phase of a [`crate::Monitor`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
  #[default]
  Idle,
  Running,
  Draining,
}

/// Why a queued file produced no record and no failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
  /// Content already ingested (or already failed) under this fingerprint.
  Duplicate,
  /// Deleted before it could be read.
  Vanished,
  /// Still being written when the settle timeout ran out.
  NotSettled,
  /// Its playthrough is paused after a store failure.
  Deferred,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum MonitorEvent {
  Started {
    directory: PathBuf,
    backlog:   usize,
  },
  FileStarted {
    path:        PathBuf,
    fingerprint: Fingerprint,
  },
  Ingested {
    path:           PathBuf,
    fingerprint:    Fingerprint,
    playthrough_id: String,
    game_day:       i64,
    date:           String,
    superseded:     bool,
    counts:         RecordCounts,
  },
  Skipped {
    path:   PathBuf,
    reason: SkipReason,
  },
  Failed {
    path:        PathBuf,
    fingerprint: Option<Fingerprint>,
    stage:       Stage,
    reason:      String,
  },
  DegradedMode {
    consecutive_decoder_failures: u32,
  },
  DirectoryUnavailable {
    directory: PathBuf,
    reason:    String,
  },
  DrainComplete {
    report: DrainReport,
  },
  /// Always the last event of a run; histories are final for this run.
  VisualizationRequested {
    playthroughs: Vec<String>,
  },
}

/// Counters for one monitor run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunStats {
  /// Files that produced a record.
  pub processed:  u64,
  /// Of `processed`, records that replaced one for the same game day.
  pub superseded: u64,
  pub duplicates: u64,
  pub failed:     u64,
  /// Vanished, unsettled or deferred files.
  pub skipped:    u64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DrainReport {
  pub directory:    PathBuf,
  pub stats:        RunStats,
  /// Playthroughs written to during the run.
  pub playthroughs: Vec<String>,
  /// Playthroughs paused by a store failure; their files stay unseen.
  pub paused:       Vec<String>,
  /// Set when the run ended because the directory went away.
  pub fault:        Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MonitorStatus {
  pub phase:        Phase,
  pub directory:    Option<PathBuf>,
  /// Files queued but not yet picked up by the sequencer.
  pub backlog:      usize,
  pub degraded:     bool,
  pub stats:        RunStats,
  pub playthroughs: Vec<PlaythroughSummary>,
}
