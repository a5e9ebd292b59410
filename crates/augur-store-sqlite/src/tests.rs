//! Integration tests for the SQLite stores.

use std::path::{Path, PathBuf};

use augur_core::{
  history::AppendOutcome,
  ingest::{Fingerprint, PlaythroughBinding, SeenFile, SeenOutcome},
  record::{GoodStats, SnapshotRecord},
  store::{HistoryStore, StateStore},
};
use chrono::Utc;

use crate::{Error, SqliteHistoryStore, SqliteStateStore};

fn record(id: &str, day: i64, grain_price: f64, fingerprint: &str) -> SnapshotRecord {
  let mut r = SnapshotRecord::new(id, day);
  r.fingerprint = Some(fingerprint.to_string());
  r.goods.insert("grain".into(), GoodStats {
    price:      grain_price,
    stockpile:  10.0,
    buy_volume: 1.0,
  });
  r
}

// ─── History ─────────────────────────────────────────────────────────────────

#[tokio::test]
async fn append_and_load_sorted() {
  let s = SqliteHistoryStore::open_in_memory();
  for day in [30, 10, 20] {
    s.append("rome", record("rome", day, 1.0, "f")).await.unwrap();
  }
  let days: Vec<i64> = s.load("rome").await.unwrap().iter().map(|r| r.game_day).collect();
  assert_eq!(days, vec![10, 20, 30]);
}

#[tokio::test]
async fn same_day_supersedes() {
  let s = SqliteHistoryStore::open_in_memory();
  let first = s.append("rome", record("rome", 5, 20.0, "aaa")).await.unwrap();
  assert_eq!(first, AppendOutcome::Inserted);

  let second = s.append("rome", record("rome", 5, 25.0, "bbb")).await.unwrap();
  assert_eq!(second, AppendOutcome::Superseded {
    previous_fingerprint: Some("aaa".into()),
  });

  let records = s.load("rome").await.unwrap();
  assert_eq!(records.len(), 1);
  assert_eq!(records[0].goods["grain"].price, 25.0);
}

#[tokio::test]
async fn unknown_playthrough_is_empty() {
  let s = SqliteHistoryStore::open_in_memory();
  assert!(s.load("nobody").await.unwrap().is_empty());
  assert!(s.summary("nobody").await.unwrap().is_none());
  assert!(s.list_playthroughs().await.unwrap().is_empty());
}

#[tokio::test]
async fn invalid_ids_are_rejected() {
  let s = SqliteHistoryStore::open_in_memory();
  let r = s.append("../etc", record("../etc", 1, 1.0, "f")).await;
  assert!(matches!(r, Err(Error::InvalidPlaythroughId(_))));
}

#[tokio::test]
async fn mismatched_record_is_rejected() {
  let s = SqliteHistoryStore::open_in_memory();
  let r = s.append("rome", record("carthage", 1, 1.0, "f")).await;
  assert!(matches!(
    r,
    Err(Error::Core(augur_core::Error::PlaythroughMismatch { .. }))
  ));
}

#[tokio::test]
async fn histories_are_independent() {
  let s = SqliteHistoryStore::open_in_memory();
  s.append("rome", record("rome", 1, 1.0, "a")).await.unwrap();
  s.append("carthage", record("carthage", 1, 2.0, "b")).await.unwrap();
  s.append("carthage", record("carthage", 2, 2.0, "c")).await.unwrap();

  assert_eq!(s.list_playthroughs().await.unwrap(), vec!["carthage", "rome"]);
  let summary = s.summary("carthage").await.unwrap().unwrap();
  assert_eq!(summary.records, 2);
  assert_eq!(summary.first_day, Some(1));
  assert_eq!(summary.last_day, Some(2));
}

#[tokio::test]
async fn history_survives_reopen() {
  let dir = tempfile::tempdir().unwrap();
  {
    let s = SqliteHistoryStore::open(dir.path()).await.unwrap();
    s.append("rome", record("rome", 2, 1.0, "a")).await.unwrap();
    s.append("rome", record("rome", 1, 1.0, "b")).await.unwrap();
    s.append("rome", record("rome", 2, 3.0, "c")).await.unwrap();
  }
  assert!(dir.path().join("playthroughs/rome.sqlite3").exists());

  let s = SqliteHistoryStore::open(dir.path()).await.unwrap();
  assert_eq!(s.list_playthroughs().await.unwrap(), vec!["rome"]);
  let records = s.load("rome").await.unwrap();
  assert_eq!(records.len(), 2);
  assert_eq!(records[1].fingerprint.as_deref(), Some("c"));
  assert_eq!(records[1].goods["grain"].price, 3.0);
}

#[tokio::test]
async fn non_finite_record_is_refused_and_history_stays_readable() {
  let dir = tempfile::tempdir().unwrap();
  {
    let s = SqliteHistoryStore::open(dir.path()).await.unwrap();
    s.append("rome", record("rome", 1, 1.0, "a")).await.unwrap();

    let mut bad = record("rome", 2, 1.0, "b");
    bad.overproduction_ratio.insert("grain".into(), f64::INFINITY);
    let r = s.append("rome", bad).await;
    assert!(matches!(
      r,
      Err(Error::Core(augur_core::Error::NonFinite { .. }))
    ));
    assert_eq!(s.load("rome").await.unwrap().len(), 1);
  }

  let s = SqliteHistoryStore::open(dir.path()).await.unwrap();
  assert_eq!(s.load("rome").await.unwrap().len(), 1);
  s.append("rome", record("rome", 3, 1.0, "c")).await.unwrap();
  assert_eq!(s.summary("rome").await.unwrap().unwrap().records, 2);
}

#[tokio::test]
async fn reading_does_not_create_files() {
  let dir = tempfile::tempdir().unwrap();
  let s = SqliteHistoryStore::open(dir.path()).await.unwrap();
  assert!(s.load("ghost").await.unwrap().is_empty());
  assert!(!dir.path().join("playthroughs/ghost.sqlite3").exists());
}

// ─── Ingestion state ─────────────────────────────────────────────────────────

fn seen(fp: &str, outcome: SeenOutcome) -> SeenFile {
  SeenFile {
    fingerprint:    Fingerprint::from_hex(fp),
    path:           PathBuf::from(format!("/saves/{fp}.v3")),
    seen_at:        Utc::now(),
    outcome,
    playthrough_id: Some("rome".into()),
  }
}

fn binding(campaign: Option<&str>) -> PlaythroughBinding {
  PlaythroughBinding {
    playthrough_id: "rome".into(),
    hint:           "rome".into(),
    campaign_id:    campaign.map(str::to_string),
  }
}

#[tokio::test]
async fn fresh_directory_has_empty_state() {
  let s = SqliteStateStore::open_in_memory().await.unwrap();
  let state = s.load_state(Path::new("/saves")).await.unwrap();
  assert_eq!(state.seen_count(), 0);
  assert!(!state.last_drained);
}

#[tokio::test]
async fn seen_files_round_trip() {
  let s = SqliteStateStore::open_in_memory().await.unwrap();
  let dir = Path::new("/saves");
  s.record_seen(dir, &seen("aaa", SeenOutcome::Ingested), Some(&binding(None)))
    .await
    .unwrap();
  s.record_seen(dir, &seen("bbb", SeenOutcome::Failed), None)
    .await
    .unwrap();
  s.record_seen(dir, &seen("ccc", SeenOutcome::Ingested), Some(&binding(Some("c-1"))))
    .await
    .unwrap();

  let state = s.load_state(dir).await.unwrap();
  assert_eq!(state.seen_count(), 3);
  let failed = state.seen_file(&Fingerprint::from_hex("bbb")).unwrap();
  assert_eq!(failed.outcome, SeenOutcome::Failed);
  assert_eq!(state.binding("rome").unwrap().campaign_id.as_deref(), Some("c-1"));

  // Other directories are unaffected.
  let other = s.load_state(Path::new("/elsewhere")).await.unwrap();
  assert_eq!(other.seen_count(), 0);
}

#[tokio::test]
async fn last_drained_flag() {
  let s = SqliteStateStore::open_in_memory().await.unwrap();
  let dir = Path::new("/saves");
  s.set_last_drained(dir, true).await.unwrap();
  assert!(s.load_state(dir).await.unwrap().last_drained);
  s.set_last_drained(dir, false).await.unwrap();
  assert!(!s.load_state(dir).await.unwrap().last_drained);
}

#[tokio::test]
async fn reset_forgets_directory() {
  let s = SqliteStateStore::open_in_memory().await.unwrap();
  let dir = Path::new("/saves");
  s.record_seen(dir, &seen("aaa", SeenOutcome::Ingested), Some(&binding(None)))
    .await
    .unwrap();
  s.set_last_drained(dir, true).await.unwrap();
  s.reset(dir).await.unwrap();

  let state = s.load_state(dir).await.unwrap();
  assert_eq!(state.seen_count(), 0);
  assert!(state.binding("rome").is_none());
  assert!(!state.last_drained);
}

#[tokio::test]
async fn state_survives_reopen() {
  let data = tempfile::tempdir().unwrap();
  let dir = Path::new("/saves");
  {
    let s = SqliteStateStore::open(data.path()).await.unwrap();
    s.record_seen(dir, &seen("aaa", SeenOutcome::Superseded), None)
      .await
      .unwrap();
  }
  let s = SqliteStateStore::open(data.path()).await.unwrap();
  let state = s.load_state(dir).await.unwrap();
  assert!(state.is_seen(&Fingerprint::from_hex("aaa")));
}
