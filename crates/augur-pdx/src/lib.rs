//! Save-file codec for Augur.
//!
//! Turns snapshot bytes into a generic [`Value`] tree and the tree into a
//! [`SnapshotRecord`](augur_core::record::SnapshotRecord). Pure synchronous;
//! no file system or database dependencies.
//!
//! # Quick start
//!
//! ```no_run
//! use augur_pdx::{Extractor, parse};
//!
//! let root = parse("date=1836.1.1 market_manager={ database={ } }").unwrap();
//! let record = Extractor::default().extract(&root).unwrap();
//! println!("day {} with {} goods", record.game_day, record.goods.len());
//! ```

pub mod decode;
pub mod error;
pub mod extract;
pub mod parse;
mod serialize;
pub mod value;

use augur_core::record::{GameDate, SnapshotRecord};
pub use decode::{SnapshotDecoder, UnavailableDecoder, default_decoder, with_meta};
pub use error::{Error, Result};
pub use extract::{Extractor, content_playthrough_name, filename_date};
pub use parse::{ParseError, Position, parse};
pub use serialize::to_text;
pub use value::{Object, Scalar, Value};

/// Decode, parse and extract one snapshot.
///
/// `fallback` is used when the save carries no date of its own.
pub fn read_snapshot(
  bytes: &[u8],
  decoder: &dyn SnapshotDecoder,
  extractor: &Extractor,
  fallback: Option<GameDate>,
) -> Result<SnapshotRecord> {
  let text = decode::snapshot_text(bytes, decoder)?;
  let root = parse(&text)?;
  extractor.extract_with_fallback(&root, fallback)
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn reads_a_plain_snapshot() {
    let bytes = b"\xEF\xBB\xBFdate=1836.1.2\nmarket_manager={ database={ 0={ goods={ grain={ price=3 } } } } }";
    let record =
      read_snapshot(bytes, &UnavailableDecoder, &Extractor::default(), None).unwrap();
    assert_eq!(record.game_day, 1);
    assert_eq!(record.price_crashes[0].good_name, "grain");
  }

  #[test]
  fn stages_are_reported() {
    let extractor = Extractor::default();
    let err = read_snapshot(b"a={", &UnavailableDecoder, &extractor, None).unwrap_err();
    assert_eq!(err.stage(), "parse");
    let err = read_snapshot(b"a=1", &UnavailableDecoder, &extractor, None).unwrap_err();
    assert_eq!(err.stage(), "extract");
    let err = read_snapshot(b"PK\x03\x04", &UnavailableDecoder, &extractor, None).unwrap_err();
    assert_eq!(err.stage(), "decode");
  }
}
