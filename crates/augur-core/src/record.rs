//! Snapshot records, the unit of history for one playthrough.
//!
//! A record is produced once per ingested save and is never mutated
//! afterwards. A later record for the same `(playthrough_id, game_day)`
//! replaces it wholesale.

use std::{collections::BTreeMap, fmt, str::FromStr};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{Error, Result};

// ─── In-game calendar ────────────────────────────────────────────────────────

/// First year of the simulation; `game_day` counts from `EPOCH_YEAR.1.1`.
pub const EPOCH_YEAR: i64 = 1836;

const DAYS_IN_MONTH: [u8; 12] = [31, 28, 31, 30, 31, 30, 31, 31, 30, 31, 30, 31];
const MONTH_OFFSETS: [i64; 12] =
  [0, 31, 59, 90, 120, 151, 181, 212, 243, 273, 304, 334];

/// A date on the simulation calendar (365-day years, no leap days).
#[derive(
  Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize,
  Deserialize,
)]
pub struct GameDate {
  pub year:  i64,
  pub month: u8,
  pub day:   u8,
}

impl GameDate {
  pub fn new(year: i64, month: u8, day: u8) -> Result<Self> {
    if !(1..=12).contains(&month) {
      return Err(Error::InvalidDate(format!("{year}.{month}.{day}")));
    }
    if day == 0 || day > DAYS_IN_MONTH[usize::from(month - 1)] {
      return Err(Error::InvalidDate(format!("{year}.{month}.{day}")));
    }
    Ok(Self { year, month, day })
  }

  /// Days since `EPOCH_YEAR.1.1`; strictly increasing with the date.
  pub fn game_day(&self) -> i64 {
    (self.year - EPOCH_YEAR) * 365
      + MONTH_OFFSETS[usize::from(self.month - 1)]
      + i64::from(self.day - 1)
  }

  /// Inverse of [`GameDate::game_day`].
  pub fn from_game_day(game_day: i64) -> Self {
    let year = EPOCH_YEAR + game_day.div_euclid(365);
    let day_of_year = game_day.rem_euclid(365);
    let month_idx = MONTH_OFFSETS
      .iter()
      .rposition(|offset| *offset <= day_of_year)
      .unwrap_or(0);
    Self {
      year,
      month: (month_idx + 1) as u8,
      day: (day_of_year - MONTH_OFFSETS[month_idx] + 1) as u8,
    }
  }
}

impl fmt::Display for GameDate {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{}.{}.{}", self.year, self.month, self.day)
  }
}

/// Accepts `Y.M.D` with an optional trailing hour component (`Y.M.D.H`),
/// which the simulation writes for intra-day saves.
impl FromStr for GameDate {
  type Err = Error;

  fn from_str(s: &str) -> Result<Self> {
    let invalid = || Error::InvalidDate(s.to_string());
    let parts: Vec<&str> = s.trim().trim_matches('"').split('.').collect();
    if !(3..=4).contains(&parts.len()) {
      return Err(invalid());
    }
    let year = parts[0].parse::<i64>().map_err(|_| invalid())?;
    let month = parts[1].parse::<u8>().map_err(|_| invalid())?;
    let day = parts[2].parse::<u8>().map_err(|_| invalid())?;
    Self::new(year, month, day)
  }
}

// ─── Record parts ────────────────────────────────────────────────────────────

/// Market figures for one good, aggregated over all markets.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct GoodStats {
  pub price:      f64,
  pub stockpile:  f64,
  pub buy_volume: f64,
}

/// A good whose price fell below the crash threshold.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriceCrash {
  pub good_name: String,
  pub price:     f64,
  /// `crash_threshold - price`; larger is worse.
  pub severity:  f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BuildingTypeStats {
  pub count:              u64,
  pub unprofitable_count: u64,
  pub average_profit:     f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BuildingSummary {
  pub total:              u64,
  pub unprofitable_count: u64,
  /// `unprofitable_count / total`, 0 when there are no buildings.
  #[serde(default)]
  pub unprofitable_ratio: f64,
  #[serde(default)]
  pub by_type:            BTreeMap<String, BuildingTypeStats>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct CountryStats {
  pub gdp:      f64,
  pub treasury: f64,
}

/// Trade routes carrying one good.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TradeRouteStats {
  pub route_count: u64,
  pub total_level: i64,
}

/// Where a record's `game_day` came from.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TimelineSource {
  /// The date written inside the save.
  #[default]
  SaveDate,
  /// A `_YYYY_MM_DD` fragment of the file name.
  FilenameDate,
}

// ─── SnapshotRecord ──────────────────────────────────────────────────────────

/// Economic state of one playthrough at one in-game date.
///
/// Fields added after the first release carry `#[serde(default)]` so that
/// histories written by older builds keep loading.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SnapshotRecord {
  pub playthrough_id:       String,
  pub game_day:             i64,
  pub wall_timestamp:       DateTime<Utc>,
  #[serde(default)]
  pub date:                 Option<String>,
  #[serde(default)]
  pub game_version:         Option<String>,
  /// Campaign identity written inside the save, if any.
  #[serde(default)]
  pub campaign_id:          Option<String>,
  #[serde(default)]
  pub source_file:          Option<String>,
  #[serde(default)]
  pub fingerprint:          Option<String>,
  #[serde(default)]
  pub timeline_source:      TimelineSource,
  #[serde(default)]
  pub market_count:         u64,
  pub goods:                BTreeMap<String, GoodStats>,
  /// Sorted by severity descending, then good name ascending.
  pub price_crashes:        Vec<PriceCrash>,
  pub overproduction_ratio: BTreeMap<String, f64>,
  pub buildings:            BuildingSummary,
  pub countries:            BTreeMap<String, CountryStats>,
  /// Buildings using each production method.
  #[serde(default)]
  pub production_methods:   BTreeMap<String, u64>,
  #[serde(default)]
  pub trade_routes:         BTreeMap<String, TradeRouteStats>,
}

fn finite(field: impl FnOnce() -> String, value: f64) -> Result<()> {
  if value.is_finite() {
    Ok(())
  } else {
    Err(Error::NonFinite { field: field() })
  }
}

/// Counts reported to observers after a record is ingested.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordCounts {
  pub goods:         usize,
  pub price_crashes: usize,
  pub countries:     usize,
  pub buildings:     u64,
}

impl SnapshotRecord {
  /// An empty record for `game_day`; the extractor fills in the ledgers.
  pub fn new(playthrough_id: impl Into<String>, game_day: i64) -> Self {
    Self {
      playthrough_id: playthrough_id.into(),
      game_day,
      wall_timestamp: Utc::now(),
      date: None,
      game_version: None,
      campaign_id: None,
      source_file: None,
      fingerprint: None,
      timeline_source: TimelineSource::default(),
      market_count: 0,
      goods: BTreeMap::new(),
      price_crashes: Vec::new(),
      overproduction_ratio: BTreeMap::new(),
      buildings: BuildingSummary::default(),
      countries: BTreeMap::new(),
      production_methods: BTreeMap::new(),
      trade_routes: BTreeMap::new(),
    }
  }

  pub fn counts(&self) -> RecordCounts {
    RecordCounts {
      goods:         self.goods.len(),
      price_crashes: self.price_crashes.len(),
      countries:     self.countries.len(),
      buildings:     self.buildings.total,
    }
  }

  /// Fails on the first number that is NaN or infinite.
  pub fn check_finite(&self) -> Result<()> {
    for (name, g) in &self.goods {
      finite(|| format!("goods.{name}.price"), g.price)?;
      finite(|| format!("goods.{name}.stockpile"), g.stockpile)?;
      finite(|| format!("goods.{name}.buy_volume"), g.buy_volume)?;
    }
    for c in &self.price_crashes {
      finite(|| format!("price_crashes.{}.price", c.good_name), c.price)?;
      finite(|| format!("price_crashes.{}.severity", c.good_name), c.severity)?;
    }
    for (name, ratio) in &self.overproduction_ratio {
      finite(|| format!("overproduction_ratio.{name}"), *ratio)?;
    }
    finite(|| "buildings.unprofitable_ratio".to_string(), self.buildings.unprofitable_ratio)?;
    for (kind, b) in &self.buildings.by_type {
      finite(|| format!("buildings.by_type.{kind}.average_profit"), b.average_profit)?;
    }
    for (tag, c) in &self.countries {
      finite(|| format!("countries.{tag}.gdp"), c.gdp)?;
      finite(|| format!("countries.{tag}.treasury"), c.treasury)?;
    }
    Ok(())
  }

  /// The in-game date, preferring the text written in the save.
  pub fn display_date(&self) -> String {
    self
      .date
      .clone()
      .unwrap_or_else(|| GameDate::from_game_day(self.game_day).to_string())
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn game_day_starts_at_zero() {
    let d: GameDate = "1836.1.1".parse().unwrap();
    assert_eq!(d.game_day(), 0);
  }

  #[test]
  fn month_boundary_is_strictly_increasing() {
    let jan31: GameDate = "1840.1.31".parse().unwrap();
    let feb1: GameDate = "1840.2.1".parse().unwrap();
    assert_eq!(feb1.game_day(), jan31.game_day() + 1);
  }

  #[test]
  fn from_game_day_inverts() {
    for text in ["1836.1.1", "1836.12.31", "1901.7.15", "1835.3.2"] {
      let d: GameDate = text.parse().unwrap();
      assert_eq!(GameDate::from_game_day(d.game_day()), d, "{text}");
    }
  }

  #[test]
  fn hour_component_is_ignored() {
    let d: GameDate = "1850.6.3.12".parse().unwrap();
    assert_eq!(d.to_string(), "1850.6.3");
  }

  #[test]
  fn rejects_impossible_dates() {
    assert!("1836.2.30".parse::<GameDate>().is_err());
    assert!("1836.13.1".parse::<GameDate>().is_err());
    assert!("1836.1".parse::<GameDate>().is_err());
    assert!("soon".parse::<GameDate>().is_err());
  }

  #[test]
  fn non_finite_numbers_are_named() {
    let mut record = SnapshotRecord::new("rome", 0);
    assert!(record.check_finite().is_ok());

    record.overproduction_ratio.insert("grain".into(), f64::INFINITY);
    match record.check_finite() {
      Err(Error::NonFinite { field }) => assert_eq!(field, "overproduction_ratio.grain"),
      other => panic!("expected NonFinite, got {other:?}"),
    }

    record.overproduction_ratio.clear();
    record.countries.insert("GBR".into(), CountryStats { gdp: f64::NAN, treasury: 0.0 });
    assert!(record.check_finite().is_err());
  }

  #[test]
  fn unknown_fields_are_ignored_on_read() {
    let json = r#"{
      "playthrough_id": "rome",
      "game_day": 12,
      "wall_timestamp": "2024-06-01T00:00:00Z",
      "goods": {},
      "price_crashes": [],
      "overproduction_ratio": {},
      "buildings": { "total": 3, "unprofitable_count": 1 },
      "countries": {},
      "added_in_a_later_release": [1, 2, 3]
    }"#;
    let record: SnapshotRecord = serde_json::from_str(json).unwrap();
    assert_eq!(record.game_day, 12);
    assert_eq!(record.buildings.total, 3);
    assert_eq!(record.timeline_source, TimelineSource::SaveDate);
    assert!(record.date.is_none());
    assert!(record.production_methods.is_empty());
    assert!(record.trade_routes.is_empty());
  }
}
