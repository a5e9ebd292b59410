//! Per-playthrough history: records ordered by `game_day`.
//!
//! Arrival order does not matter: a record processed late is inserted at its
//! place in the timeline, and a record for a day already present replaces the
//! earlier one.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::{Error, Result, record::SnapshotRecord};

/// Result of adding a record to a history.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum AppendOutcome {
  /// No record existed for this `game_day`.
  Inserted,
  /// A record for this `game_day` was replaced.
  Superseded {
    previous_fingerprint: Option<String>,
  },
}

impl AppendOutcome {
  pub fn is_superseded(&self) -> bool { matches!(self, Self::Superseded { .. }) }
}

/// Aggregate view used by status queries.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlaythroughSummary {
  pub playthrough_id: String,
  pub records:        usize,
  pub first_day:      Option<i64>,
  pub last_day:       Option<i64>,
  pub first_date:     Option<String>,
  pub last_date:      Option<String>,
}

/// The ordered timeline of one playthrough.
#[derive(Debug, Clone, Default)]
pub struct PlaythroughHistory {
  playthrough_id: String,
  records:        BTreeMap<i64, SnapshotRecord>,
}

impl PlaythroughHistory {
  pub fn new(playthrough_id: impl Into<String>) -> Self {
    Self {
      playthrough_id: playthrough_id.into(),
      records:        BTreeMap::new(),
    }
  }

  /// Rebuild a history from persisted records, in any order.
  pub fn from_records(
    playthrough_id: impl Into<String>,
    records: impl IntoIterator<Item = SnapshotRecord>,
  ) -> Result<Self> {
    let mut history = Self::new(playthrough_id);
    for record in records {
      history.upsert(record)?;
    }
    Ok(history)
  }

  pub fn playthrough_id(&self) -> &str { &self.playthrough_id }

  /// Insert `record`, replacing any record with the same `game_day`.
  pub fn upsert(&mut self, record: SnapshotRecord) -> Result<AppendOutcome> {
    if record.playthrough_id != self.playthrough_id {
      return Err(Error::PlaythroughMismatch {
        expected: self.playthrough_id.clone(),
        found:    record.playthrough_id,
      });
    }
    let outcome = match self.records.insert(record.game_day, record) {
      None => AppendOutcome::Inserted,
      Some(previous) => AppendOutcome::Superseded {
        previous_fingerprint: previous.fingerprint,
      },
    };
    Ok(outcome)
  }

  /// Outcome [`PlaythroughHistory::upsert`] would report, without inserting.
  pub fn preview(&self, game_day: i64) -> AppendOutcome {
    match self.records.get(&game_day) {
      None => AppendOutcome::Inserted,
      Some(previous) => AppendOutcome::Superseded {
        previous_fingerprint: previous.fingerprint.clone(),
      },
    }
  }

  pub fn get(&self, game_day: i64) -> Option<&SnapshotRecord> {
    self.records.get(&game_day)
  }

  pub fn len(&self) -> usize { self.records.len() }

  pub fn is_empty(&self) -> bool { self.records.is_empty() }

  /// Records in ascending `game_day` order.
  pub fn iter(&self) -> impl Iterator<Item = &SnapshotRecord> {
    self.records.values()
  }

  pub fn to_vec(&self) -> Vec<SnapshotRecord> {
    self.records.values().cloned().collect()
  }

  pub fn summary(&self) -> PlaythroughSummary {
    let first = self.records.values().next();
    let last = self.records.values().next_back();
    PlaythroughSummary {
      playthrough_id: self.playthrough_id.clone(),
      records:        self.records.len(),
      first_day:      first.map(|r| r.game_day),
      last_day:       last.map(|r| r.game_day),
      first_date:     first.map(SnapshotRecord::display_date),
      last_date:      last.map(SnapshotRecord::display_date),
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::record::GoodStats;

  fn record(day: i64, grain_price: f64) -> SnapshotRecord {
    let mut r = SnapshotRecord::new("rome", day);
    r.goods.insert("grain".to_string(), GoodStats {
      price:      grain_price,
      stockpile:  0.0,
      buy_volume: 0.0,
    });
    r
  }

  #[test]
  fn out_of_order_inserts_read_back_sorted() {
    let mut h = PlaythroughHistory::new("rome");
    h.upsert(record(3, 1.0)).unwrap();
    h.upsert(record(5, 1.0)).unwrap();
    h.upsert(record(4, 1.0)).unwrap();
    let days: Vec<i64> = h.iter().map(|r| r.game_day).collect();
    assert_eq!(days, vec![3, 4, 5]);
  }

  #[test]
  fn same_day_supersedes() {
    let mut h = PlaythroughHistory::new("rome");
    let mut first = record(10, 20.0);
    first.fingerprint = Some("aaa".into());
    assert_eq!(h.upsert(first).unwrap(), AppendOutcome::Inserted);

    let outcome = h.upsert(record(10, 25.0)).unwrap();
    assert_eq!(outcome, AppendOutcome::Superseded {
      previous_fingerprint: Some("aaa".into()),
    });
    assert_eq!(h.len(), 1);
    assert_eq!(h.get(10).unwrap().goods["grain"].price, 25.0);
  }

  #[test]
  fn foreign_record_is_rejected() {
    let mut h = PlaythroughHistory::new("carthage");
    let r = h.upsert(record(1, 1.0));
    assert!(matches!(r, Err(Error::PlaythroughMismatch { .. })));
    assert!(h.is_empty());
  }

  #[test]
  fn summary_reports_range() {
    let h = PlaythroughHistory::from_records("rome", vec![
      record(400, 1.0),
      record(0, 1.0),
    ])
    .unwrap();
    let s = h.summary();
    assert_eq!(s.records, 2);
    assert_eq!(s.first_day, Some(0));
    assert_eq!(s.last_day, Some(400));
    assert_eq!(s.first_date.as_deref(), Some("1836.1.1"));
  }
}
