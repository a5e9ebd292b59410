//! Economic metrics extracted from a parsed snapshot.
//!
//! The extractor knows a handful of top-level ledgers (markets, buildings,
//! countries, trade routes) and walks only those. Anything it does not find
//! degrades to an empty or zero value; only a snapshot with no usable date at
//! all is an error, because without a date the record has no place in the
//! timeline. Every number in the record is finite.

use std::collections::BTreeMap;

use augur_core::record::{
  BuildingSummary, CountryStats, GameDate, GoodStats, PriceCrash,
  SnapshotRecord, TimelineSource, TradeRouteStats,
};
use tracing::trace;

use crate::{
  error::{Error, Result},
  value::{Object, Value},
};

/// Default price below which a good counts as crashed.
pub const DEFAULT_CRASH_THRESHOLD: f64 = 10.0;

/// Goods are sometimes keyed by their index in the game's goods table rather
/// than by name.
const GOODS_BY_INDEX: [&str; 51] = [
  "ammunition", "small_arms", "artillery", "manowars", "ironclads", "grain",
  "fish", "fabric", "wood", "coal", "iron", "tools", "sulfur", "steel",
  "engines", "glass", "lead", "hardwood", "paper", "clothes", "services",
  "electricity", "transportation", "luxury_clothes", "luxury_furniture",
  "furniture", "porcelain", "groceries", "fruit", "liquor", "wine", "meat",
  "sugar", "tea", "coffee", "silk", "dye", "opium", "oil", "rubber", "gold",
  "fine_art", "radios", "automobiles", "aeroplanes", "telephones",
  "fertilizer", "explosives", "steamers", "electric_gear", "tank",
];

fn good_name(key: &str) -> String {
  match key.parse::<usize>() {
    Ok(index) => GOODS_BY_INDEX
      .get(index)
      .map(|name| name.to_string())
      .unwrap_or_else(|| format!("goods_{index}")),
    Err(_) => key.to_string(),
  }
}

// ─── Extractor ───────────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct Extractor {
  pub crash_threshold: f64,
}

impl Default for Extractor {
  fn default() -> Self {
    Self { crash_threshold: DEFAULT_CRASH_THRESHOLD }
  }
}

impl Extractor {
  pub fn new(crash_threshold: f64) -> Self { Self { crash_threshold } }

  /// Extract a record from `root`.
  ///
  /// The record's `playthrough_id` is the name written inside the save, if
  /// any, and empty otherwise; the caller settles the final identity.
  pub fn extract(&self, root: &Value) -> Result<SnapshotRecord> {
    self.extract_with_fallback(root, None)
  }

  /// Like [`Extractor::extract`], but uses `fallback` (typically parsed from
  /// the file name) when the save carries no date.
  pub fn extract_with_fallback(
    &self,
    root: &Value,
    fallback: Option<GameDate>,
  ) -> Result<SnapshotRecord> {
    let (date, source) = match (content_date(root), fallback) {
      (Ok(Some(date)), _) => (date, TimelineSource::SaveDate),
      (Ok(None) | Err(_), Some(date)) => (date, TimelineSource::FilenameDate),
      (Err(e), None) => return Err(e),
      (Ok(None), None) => {
        return Err(Error::Extract {
          field:  "date".to_string(),
          reason: "no date, current_date, game_date or meta_data.game_date"
            .to_string(),
        });
      }
    };

    let id = content_playthrough_name(root).unwrap_or_default();
    let mut record = SnapshotRecord::new(id, date.game_day());
    record.date = Some(date.to_string());
    record.timeline_source = source;
    record.game_version = text_at(root, &[
      &["meta_data", "version"],
      &["version"],
      &["game_version"],
    ]);
    record.campaign_id = campaign_id(root);

    let (goods, market_count) = goods(root);
    record.market_count = market_count;
    record.price_crashes = self.price_crashes(&goods);
    record.overproduction_ratio = goods
      .iter()
      .map(|(name, g)| (name.clone(), overproduction(g)))
      .collect();
    record.goods = goods;
    record.buildings = buildings(root);
    record.production_methods = production_methods(root);
    record.countries = countries(root);
    record.trade_routes = trade_routes(root);
    Ok(record)
  }

  /// Goods with `0 < price < crash_threshold`, worst first.
  fn price_crashes(&self, goods: &BTreeMap<String, GoodStats>) -> Vec<PriceCrash> {
    let mut crashes: Vec<PriceCrash> = goods
      .iter()
      .filter(|(_, g)| g.price > 0.0 && g.price < self.crash_threshold)
      .map(|(name, g)| PriceCrash {
        good_name: name.clone(),
        price:     g.price,
        severity:  finite_or_zero(self.crash_threshold - g.price),
      })
      .collect();
    crashes.sort_by(|a, b| {
      b.severity
        .total_cmp(&a.severity)
        .then_with(|| a.good_name.cmp(&b.good_name))
    });
    crashes
  }
}

// ─── Identity ────────────────────────────────────────────────────────────────

/// Playthrough name written inside the save, if any.
pub fn content_playthrough_name(root: &Value) -> Option<String> {
  text_at(root, &[
    &["meta_data", "name"],
    &["playthrough_name"],
    &["meta_data", "playthrough_name"],
  ])
}

fn campaign_id(root: &Value) -> Option<String> {
  text_at(root, &[&["meta_data", "playthrough_id"], &["playthrough_id"]])
}

/// First non-empty scalar found at any of `paths`.
fn text_at(root: &Value, paths: &[&[&str]]) -> Option<String> {
  paths
    .iter()
    .filter_map(|path| root.path(path))
    .filter_map(Value::as_text)
    .map(|s| s.trim().to_string())
    .find(|s| !s.is_empty())
}

// ─── Dates ───────────────────────────────────────────────────────────────────

fn content_date(root: &Value) -> Result<Option<GameDate>> {
  let paths: [&[&str]; 4] = [
    &["date"],
    &["current_date"],
    &["game_date"],
    &["meta_data", "game_date"],
  ];
  let Some(raw) = text_at(root, &paths) else {
    return Ok(None);
  };
  raw
    .parse::<GameDate>()
    .map(Some)
    .map_err(|e| Error::Extract { field: "date".to_string(), reason: e.to_string() })
}

/// A `YYYY_MM_DD` fragment of a file stem, e.g. `rome_1840_3_15`.
pub fn filename_date(stem: &str) -> Option<GameDate> {
  let parts: Vec<&str> = stem.split('_').collect();
  parts.windows(3).rev().find_map(|w| {
    if w[0].len() != 4 {
      return None;
    }
    let year = w[0].parse::<i64>().ok()?;
    let month = w[1].parse::<u8>().ok()?;
    let day = w[2].parse::<u8>().ok()?;
    GameDate::new(year, month, day).ok()
  })
}

// ─── Ledgers ─────────────────────────────────────────────────────────────────

/// Sums of finite inputs can still overflow.
fn finite_or_zero(n: f64) -> f64 { if n.is_finite() { n } else { 0.0 } }

/// Stockpile relative to price. A price at or below `-0.1` has no
/// meaningful ratio and reports 0.
fn overproduction(g: &GoodStats) -> f64 {
  let denominator = g.price + 0.1;
  if denominator > 0.0 {
    finite_or_zero(g.stockpile / denominator)
  } else {
    0.0
  }
}

fn number(object: &Object, keys: &[&str]) -> Option<f64> {
  keys.iter().find_map(|k| object.get(k).and_then(Value::as_f64))
}

/// Object-valued records of `<manager> = { database = { <id> = { … } } }`.
///
/// Entries such as `17=none` mark deleted records and are skipped.
fn database<'a>(
  root: &'a Value,
  manager: &'a str,
) -> impl Iterator<Item = (&'a str, &'a Object)> {
  root
    .path(&[manager, "database"])
    .and_then(Value::as_object)
    .into_iter()
    .flat_map(|db| db.iter())
    .filter_map(move |(id, v)| match v.as_object() {
      Some(o) => Some((id, o)),
      None => {
        trace!(manager, id, "skipping non-object ledger entry");
        None
      }
    })
}

#[derive(Default)]
struct GoodAccumulator {
  price_sum:     f64,
  price_samples: u32,
  stockpile:     f64,
  buy_volume:    f64,
}

/// Per-good aggregate over all markets, and the number of markets seen.
fn goods(root: &Value) -> (BTreeMap<String, GoodStats>, u64) {
  let mut acc: BTreeMap<String, GoodAccumulator> = BTreeMap::new();
  let mut markets = 0u64;

  for (_, market) in database(root, "market_manager") {
    markets += 1;
    let Some(ledger) = market.get("goods").and_then(Value::as_object) else {
      continue;
    };
    for (key, good) in ledger.iter() {
      let Some(good) = good.as_object() else { continue };
      let entry = acc.entry(good_name(key)).or_default();
      if let Some(price) = number(good, &["price"]) {
        entry.price_sum += price;
        entry.price_samples += 1;
      }
      entry.stockpile += number(good, &["stockpile"]).unwrap_or(0.0);
      entry.buy_volume +=
        number(good, &["buy_volume", "buy", "quantity"]).unwrap_or(0.0);
    }
  }

  let stats = acc
    .into_iter()
    .map(|(name, a)| {
      let price = if a.price_samples == 0 {
        0.0
      } else {
        a.price_sum / f64::from(a.price_samples)
      };
      (name, GoodStats {
        price:      finite_or_zero(price),
        stockpile:  finite_or_zero(a.stockpile),
        buy_volume: finite_or_zero(a.buy_volume),
      })
    })
    .collect();
  (stats, markets)
}

fn buildings(root: &Value) -> BuildingSummary {
  let mut summary = BuildingSummary::default();
  let mut profit_sums: BTreeMap<String, f64> = BTreeMap::new();

  for (_, building) in database(root, "building_manager") {
    let kind = building
      .get_any(&["building", "building_type"])
      .and_then(Value::as_text)
      .unwrap_or_else(|| "unknown".to_string());
    let profit = number(building, &["weekly_profit"]).unwrap_or_else(|| {
      finite_or_zero(
        number(building, &["income"]).unwrap_or(0.0)
          - number(building, &["expenses"]).unwrap_or(0.0),
      )
    });

    summary.total += 1;
    let stats = summary.by_type.entry(kind.clone()).or_default();
    stats.count += 1;
    if profit < 0.0 {
      summary.unprofitable_count += 1;
      stats.unprofitable_count += 1;
    }
    *profit_sums.entry(kind).or_default() += profit;
  }

  for (kind, stats) in summary.by_type.iter_mut() {
    let sum = profit_sums.get(kind).copied().unwrap_or(0.0);
    stats.average_profit = finite_or_zero(sum / stats.count as f64);
  }
  if summary.total > 0 {
    summary.unprofitable_ratio =
      summary.unprofitable_count as f64 / summary.total as f64;
  }
  summary
}

/// Buildings per production method, from each building's
/// `production_methods` list and any `production_method_type` entries.
fn production_methods(root: &Value) -> BTreeMap<String, u64> {
  let mut usage: BTreeMap<String, u64> = BTreeMap::new();
  for (_, building) in database(root, "building_manager") {
    let listed = building
      .get("production_methods")
      .and_then(Value::as_list)
      .unwrap_or_default();
    let typed = building.get_all("production_method_type");
    for pm in listed.iter().chain(typed).filter_map(Value::as_text) {
      *usage.entry(pm).or_default() += 1;
    }
  }
  usage
}

/// Route count and summed level per traded good.
fn trade_routes(root: &Value) -> BTreeMap<String, TradeRouteStats> {
  let mut routes: BTreeMap<String, TradeRouteStats> = BTreeMap::new();
  for (id, route) in database(root, "trade_route_manager") {
    let Some(goods) = route.get("goods").and_then(Value::as_text) else {
      trace!(id, "skipping trade route without goods");
      continue;
    };
    let stats = routes.entry(good_name(&goods)).or_default();
    stats.route_count += 1;
    stats.total_level += number(route, &["level"]).map_or(0, |l| l as i64);
  }
  routes
}

fn countries(root: &Value) -> BTreeMap<String, CountryStats> {
  database(root, "country_manager")
    .map(|(id, country)| {
      let tag = country
        .get_any(&["definition", "tag"])
        .and_then(Value::as_text)
        .unwrap_or_else(|| id.to_string());
      (tag, CountryStats {
        gdp:      number(country, &["gdp"]).unwrap_or(0.0),
        treasury: number(country, &["treasury", "gold_reserves"]).unwrap_or(0.0),
      })
    })
    .collect()
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::parse::parse;

  fn extract(text: &str) -> SnapshotRecord {
    Extractor::default().extract(&parse(text).unwrap()).unwrap()
  }

  const SAMPLE: &str = r#"
    meta_data={ name="Rome" playthrough_id="c0ffee" version="1.7.2" game_date=1840.1.1 }
    date=1841.6.1
    market_manager={ database={
      0={ name="Roma" goods={ fabric={ price=4.2 stockpile=100 buy_volume=5 } steel={ price=32.1 stockpile=10 buy=2 } } }
      1={ name="Napoli" goods={ 7={ price=5.8 stockpile=50 quantity=1 } } }
      2=none
    } }
    building_manager={ database={
      0={ building="building_textile_mills" weekly_profit=-12.5 production_methods={ "pm_handsewn_clothes" "pm_no_luxury_clothes" } }
      1={ building="building_textile_mills" income=30 expenses=10 production_methods={ "pm_handsewn_clothes" } }
      2={ building_type="building_steel_mills" weekly_profit="7" production_method_type="pm_bessemer_process" }
      3=none
    } }
    trade_route_manager={ database={
      0={ goods=grain level=3 }
      1={ goods=grain level=2 }
      2={ goods=7 level=1 }
      3={ level=9 }
    } }
    country_manager={ database={
      0={ definition="ROM" gdp=1200000 treasury=5000 }
      1={ definition="NAP" gdp=300000 gold_reserves=42 }
    } }
  "#;

  #[test]
  fn crash_example() {
    let r = extract("date=1836.1.1 market_manager={ database={ 0={ goods={ fabric={ price=4.2 } steel={ price=32.1 } } } } }");
    assert_eq!(r.price_crashes.len(), 1);
    let crash = &r.price_crashes[0];
    assert_eq!(crash.good_name, "fabric");
    assert_eq!(crash.price, 4.2);
    assert!((crash.severity - 5.8).abs() < 1e-9);
  }

  #[test]
  fn crashes_sort_by_severity_then_name() {
    let r = extract(
      "date=1836.1.1 market_manager={ database={ 0={ goods={ \
       b={ price=5 } a={ price=5 } c={ price=1 } d={ price=0 } } } } }",
    );
    let names: Vec<_> = r.price_crashes.iter().map(|c| c.good_name.as_str()).collect();
    assert_eq!(names, vec!["c", "a", "b"]);
  }

  #[test]
  fn sample_ledgers() {
    let r = extract(SAMPLE);
    assert_eq!(r.playthrough_id, "Rome");
    assert_eq!(r.campaign_id.as_deref(), Some("c0ffee"));
    assert_eq!(r.game_version.as_deref(), Some("1.7.2"));
    assert_eq!(r.date.as_deref(), Some("1841.6.1"));
    assert_eq!(r.game_day, "1841.6.1".parse::<GameDate>().unwrap().game_day());
    assert_eq!(r.market_count, 2);

    // Index 7 is fabric; both markets report it.
    let fabric = r.goods["fabric"];
    assert!((fabric.price - 5.0).abs() < 1e-9);
    assert_eq!(fabric.stockpile, 150.0);
    assert_eq!(fabric.buy_volume, 6.0);
    assert_eq!(r.goods["steel"].buy_volume, 2.0);
    assert!((r.overproduction_ratio["steel"] - 10.0 / 32.2).abs() < 1e-9);

    assert_eq!(r.buildings.total, 3);
    assert_eq!(r.buildings.unprofitable_count, 1);
    assert!((r.buildings.unprofitable_ratio - 1.0 / 3.0).abs() < 1e-9);
    let mills = &r.buildings.by_type["building_textile_mills"];
    assert_eq!(mills.count, 2);
    assert!((mills.average_profit - 3.75).abs() < 1e-9);

    assert_eq!(r.countries["ROM"].treasury, 5000.0);
    assert_eq!(r.countries["NAP"].treasury, 42.0);

    assert_eq!(r.production_methods["pm_handsewn_clothes"], 2);
    assert_eq!(r.production_methods["pm_no_luxury_clothes"], 1);
    assert_eq!(r.production_methods["pm_bessemer_process"], 1);

    assert_eq!(r.trade_routes.len(), 2);
    assert_eq!(r.trade_routes["grain"], TradeRouteStats { route_count: 2, total_level: 5 });
    assert_eq!(r.trade_routes["fabric"], TradeRouteStats { route_count: 1, total_level: 1 });
  }

  #[test]
  fn degenerate_numbers_stay_finite() {
    let huge = "9".repeat(400);
    let text = format!(
      "date=1836.1.1 market_manager={{ database={{ \
       0={{ goods={{ grain={{ price=-0.1 stockpile=5 }} }} }} \
       1={{ goods={{ iron={{ price={huge}.0 stockpile={huge}.5 }} }} }} \
       2={{ goods={{ coal={{ price=-5 stockpile=5 }} }} }} }} }}"
    );
    let r = extract(&text);
    assert_eq!(r.overproduction_ratio["grain"], 0.0);
    assert_eq!(r.overproduction_ratio["coal"], 0.0);
    assert_eq!(r.goods["iron"].price, 0.0);
    assert!(r.check_finite().is_ok());
  }

  #[test]
  fn missing_ledgers_degrade_to_empty() {
    let r = extract("date=1836.1.1");
    assert!(r.goods.is_empty());
    assert!(r.price_crashes.is_empty());
    assert_eq!(r.buildings.total, 0);
    assert_eq!(r.buildings.unprofitable_ratio, 0.0);
    assert!(r.countries.is_empty());
    assert_eq!(r.playthrough_id, "");
  }

  #[test]
  fn unparseable_fields_fall_back_to_zero() {
    let r = extract(
      "date=1836.1.1 country_manager={ database={ 5={ gdp=\"lots\" } } }",
    );
    assert_eq!(r.countries["5"], CountryStats { gdp: 0.0, treasury: 0.0 });
  }

  #[test]
  fn missing_date_is_an_error() {
    let root = parse("market_manager={ }").unwrap();
    let err = Extractor::default().extract(&root).unwrap_err();
    assert!(matches!(err, Error::Extract { ref field, .. } if field == "date"));
  }

  #[test]
  fn filename_date_is_a_fallback() {
    let root = parse("a=1").unwrap();
    let r = Extractor::default()
      .extract_with_fallback(&root, filename_date("rome_1840_3_15"))
      .unwrap();
    assert_eq!(r.date.as_deref(), Some("1840.3.15"));
    assert_eq!(r.timeline_source, TimelineSource::FilenameDate);

    let r = Extractor::default()
      .extract_with_fallback(&parse("date=1850.1.1").unwrap(), filename_date("rome_1840_3_15"))
      .unwrap();
    assert_eq!(r.timeline_source, TimelineSource::SaveDate);
  }

  #[test]
  fn filename_date_parsing() {
    assert_eq!(filename_date("autosave"), None);
    assert_eq!(filename_date("rome_1840_13_1"), None);
    assert_eq!(filename_date("x_1901_12_31_2").unwrap().to_string(), "1901.12.31");
  }

  #[test]
  fn custom_threshold() {
    let root = parse("date=1836.1.1 market_manager={ database={ 0={ goods={ steel={ price=32.1 } } } } }").unwrap();
    let r = Extractor::new(40.0).extract(&root).unwrap();
    assert_eq!(r.price_crashes.len(), 1);
  }

  #[test]
  fn unknown_goods_index() {
    let r = extract("date=1836.1.1 market_manager={ database={ 0={ goods={ 99={ price=1 } } } } }");
    assert!(r.goods.contains_key("goods_99"));
  }
}
