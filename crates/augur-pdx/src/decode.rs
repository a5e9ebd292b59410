//! Boundary between raw snapshot bytes and the text parser.
//!
//! Plain-text snapshots go straight to the parser. Compressed or binary
//! containers are handed to a [`SnapshotDecoder`], whose output is then
//! normalized to text the same way.

use crate::error::{Error, Result};

const ZIP_MAGIC: &[u8] = b"PK\x03\x04";
const UTF8_BOM: &[u8] = b"\xEF\xBB\xBF";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Container {
  Text,
  Binary,
}

/// Inspect the leading bytes of a snapshot.
///
/// A `SAV` header carries a two-digit format code at bytes 5..7; `00` means
/// the body after the header line is plain text.
pub fn classify(bytes: &[u8]) -> Container {
  if bytes.starts_with(ZIP_MAGIC) {
    return Container::Binary;
  }
  if bytes.starts_with(b"SAV") && bytes.get(5..7) != Some(b"00".as_slice()) {
    return Container::Binary;
  }
  Container::Text
}

/// Decode bytes as UTF-8, falling back to Latin-1. A leading BOM is dropped.
pub fn normalize_text(bytes: &[u8]) -> String {
  let bytes = bytes.strip_prefix(UTF8_BOM).unwrap_or(bytes);
  match std::str::from_utf8(bytes) {
    Ok(text) => text.to_owned(),
    Err(_) => bytes.iter().map(|&b| char::from(b)).collect(),
  }
}

fn strip_header(text: String) -> String {
  if !text.starts_with("SAV") {
    return text;
  }
  match text.find('\n') {
    Some(end) => text[end + 1..].to_string(),
    None => String::new(),
  }
}

fn skip_header(bytes: &[u8]) -> &[u8] {
  let bytes = bytes.strip_prefix(UTF8_BOM).unwrap_or(bytes);
  if !bytes.starts_with(b"SAV") {
    return bytes;
  }
  match bytes.iter().position(|&b| b == b'\n') {
    Some(end) => &bytes[end + 1..],
    None => &[],
  }
}

/// Join a separately decoded meta section onto the gamestate as a leading
/// `meta_data` block, which is where the extractor looks for the playthrough
/// name and campaign id. An empty `meta` leaves `gamestate` as it is.
pub fn with_meta(meta: &[u8], gamestate: Vec<u8>) -> Vec<u8> {
  let meta = skip_header(meta);
  if meta.iter().all(u8::is_ascii_whitespace) {
    return gamestate;
  }
  let body = skip_header(&gamestate);
  let mut out = Vec::with_capacity(meta.len() + body.len() + 16);
  out.extend_from_slice(b"meta_data={\n");
  out.extend_from_slice(meta);
  out.extend_from_slice(b"\n}\n");
  out.extend_from_slice(body);
  out
}

/// Text of a snapshot, decoding binary containers through `decoder`.
pub fn snapshot_text(bytes: &[u8], decoder: &dyn SnapshotDecoder) -> Result<String> {
  let text = match classify(bytes) {
    Container::Text => normalize_text(bytes),
    Container::Binary => normalize_text(&decoder.decode(bytes)?),
  };
  Ok(strip_header(text))
}

// ─── Decoders ────────────────────────────────────────────────────────────────

/// Converts a binary snapshot container into plaintext save bytes.
pub trait SnapshotDecoder: Send + Sync {
  fn name(&self) -> &str;

  fn decode(&self, bytes: &[u8]) -> Result<Vec<u8>>;
}

/// Decoder used when no binary support is compiled in.
#[derive(Debug, Clone, Copy, Default)]
pub struct UnavailableDecoder;

impl SnapshotDecoder for UnavailableDecoder {
  fn name(&self) -> &str { "unavailable" }

  fn decode(&self, _bytes: &[u8]) -> Result<Vec<u8>> {
    Err(Error::DecoderUnavailable {
      reason: "built without binary snapshot support (enable the `rakaly` \
               feature)"
        .to_string(),
    })
  }
}

/// The decoder this build was compiled with.
#[cfg(feature = "rakaly")]
pub fn default_decoder() -> Box<dyn SnapshotDecoder> { Box::new(RakalyDecoder) }

/// The decoder this build was compiled with.
#[cfg(not(feature = "rakaly"))]
pub fn default_decoder() -> Box<dyn SnapshotDecoder> { Box::new(UnavailableDecoder) }

#[cfg(feature = "rakaly")]
pub use rakaly::RakalyDecoder;

/// Bindings to the librakaly C ABI. Link with `-L <dir containing librakaly>`.
#[cfg(feature = "rakaly")]
mod rakaly {
  use std::ffi::{c_char, c_int, c_void};

  use super::{SnapshotDecoder, with_meta};
  use crate::error::{Error, Result};

  #[link(name = "rakaly")]
  unsafe extern "C" {
    fn rakaly_vic3_file(data: *const c_char, size: usize) -> *mut c_void;
    fn rakaly_file_error(result: *mut c_void) -> *mut c_void;
    fn rakaly_file_value(result: *mut c_void) -> *mut c_void;
    fn rakaly_free_file(file: *mut c_void);
    fn rakaly_file_meta(file: *mut c_void) -> *mut c_void;
    fn rakaly_file_meta_melt(meta: *mut c_void) -> *mut c_void;
    fn rakaly_file_melt(file: *mut c_void) -> *mut c_void;

    fn rakaly_melt_error(result: *mut c_void) -> *mut c_void;
    fn rakaly_melt_value(result: *mut c_void) -> *mut c_void;
    fn rakaly_melt_is_verbatim(melt: *mut c_void) -> bool;
    fn rakaly_melt_data_length(melt: *mut c_void) -> usize;
    fn rakaly_melt_write_data(melt: *mut c_void, buf: *mut c_char, len: usize) -> usize;
    fn rakaly_free_melt(melt: *mut c_void);

    fn rakaly_error_length(err: *mut c_void) -> c_int;
    fn rakaly_error_write_data(err: *mut c_void, buf: *mut c_char, len: c_int) -> c_int;
    fn rakaly_free_error(err: *mut c_void);
  }

  fn failed(reason: impl Into<String>) -> Error {
    Error::DecodeFailed { reason: reason.into() }
  }

  /// Read and free a librakaly error handle.
  ///
  /// # Safety
  /// `err` must be a non-null error handle not yet freed.
  unsafe fn take_error(err: *mut c_void) -> String {
    unsafe {
      let len = rakaly_error_length(err);
      let message = if len > 0 {
        let mut buf = vec![0u8; len as usize];
        let written = rakaly_error_write_data(err, buf.as_mut_ptr().cast(), len);
        buf.truncate(written.max(0) as usize);
        String::from_utf8_lossy(&buf).into_owned()
      } else {
        "unknown decoder error".to_string()
      };
      rakaly_free_error(err);
      message
    }
  }

  /// # Safety
  /// `result` must be a melt result returned by `rakaly_file_melt`.
  unsafe fn melt(result: *mut c_void, original: &[u8]) -> Result<Vec<u8>> {
    unsafe {
      let err = rakaly_melt_error(result);
      if !err.is_null() {
        return Err(failed(take_error(err)));
      }
      let melt = rakaly_melt_value(result);
      if melt.is_null() {
        return Err(failed("decoder returned no melt output"));
      }

      let out = if rakaly_melt_is_verbatim(melt) {
        Ok(original.to_vec())
      } else {
        let len = rakaly_melt_data_length(melt);
        let mut buf = vec![0u8; len];
        let copied = rakaly_melt_write_data(melt, buf.as_mut_ptr().cast(), len);
        if copied == len {
          Ok(buf)
        } else {
          Err(failed(format!("melt copy returned {copied} of {len} bytes")))
        }
      };
      rakaly_free_melt(melt);
      out
    }
  }

  #[derive(Debug, Clone, Copy, Default)]
  pub struct RakalyDecoder;

  impl SnapshotDecoder for RakalyDecoder {
    fn name(&self) -> &str { "librakaly" }

    fn decode(&self, bytes: &[u8]) -> Result<Vec<u8>> {
      // SAFETY: every handle is checked for null before use and freed once;
      // `bytes` outlives the call that borrows it.
      unsafe {
        let result = rakaly_vic3_file(bytes.as_ptr().cast(), bytes.len());
        if result.is_null() {
          return Err(failed("decoder returned no file handle"));
        }
        let err = rakaly_file_error(result);
        if !err.is_null() {
          return Err(failed(take_error(err)));
        }
        let file = rakaly_file_value(result);
        if file.is_null() {
          return Err(failed("decoder returned a null file"));
        }
        // The meta handle belongs to the file and is freed with it.
        let meta = rakaly_file_meta(file);
        let meta = if meta.is_null() {
          Ok(Vec::new())
        } else {
          melt(rakaly_file_meta_melt(meta), &[])
        };
        let melted = meta.and_then(|meta| {
          melt(rakaly_file_melt(file), bytes).map(|body| with_meta(&meta, body))
        });
        rakaly_free_file(file);
        melted
      }
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  struct Upper;

  impl SnapshotDecoder for Upper {
    fn name(&self) -> &str { "upper" }

    fn decode(&self, _bytes: &[u8]) -> Result<Vec<u8>> { Ok(b"date=1836.1.1".to_vec()) }
  }

  #[test]
  fn classifies_containers() {
    assert_eq!(classify(b"PK\x03\x04rest"), Container::Binary);
    assert_eq!(classify(b"SAV0103abcdef\n"), Container::Binary);
    assert_eq!(classify(b"SAV0100abcdef\nmeta_data={}"), Container::Text);
    assert_eq!(classify(b"date=1836.1.1"), Container::Text);
    assert_eq!(classify(b""), Container::Text);
  }

  #[test]
  fn text_header_is_stripped() {
    let text = snapshot_text(b"SAV0100abcdef\ndate=1836.1.1", &UnavailableDecoder).unwrap();
    assert_eq!(text, "date=1836.1.1");
  }

  #[test]
  fn binary_goes_through_decoder() {
    assert_eq!(snapshot_text(b"PK\x03\x04zzz", &Upper).unwrap(), "date=1836.1.1");
    let err = snapshot_text(b"PK\x03\x04zzz", &UnavailableDecoder).unwrap_err();
    assert!(matches!(err, Error::DecoderUnavailable { .. }));
    assert_eq!(err.stage(), "decode");
  }

  #[test]
  fn meta_section_becomes_meta_data_block() {
    let meta = b"SAV0100aaaa\nname=\"Rome\" playthrough_id=\"c-1\"";
    let joined = with_meta(meta, b"date=1836.1.1".to_vec());
    let text = normalize_text(&joined);
    assert!(text.starts_with("meta_data={"), "{text}");

    let root = crate::parse(&text).unwrap();
    let text_at = |path: &[&str]| root.path(path).and_then(|v| v.as_text());
    assert_eq!(text_at(&["meta_data", "name"]).as_deref(), Some("Rome"));
    assert_eq!(text_at(&["meta_data", "playthrough_id"]).as_deref(), Some("c-1"));
    assert_eq!(text_at(&["date"]).as_deref(), Some("1836.1.1"));

    assert_eq!(with_meta(b"  \n", b"date=1836.1.1".to_vec()), b"date=1836.1.1");
  }

  struct WithMeta;

  impl SnapshotDecoder for WithMeta {
    fn name(&self) -> &str { "with-meta" }

    fn decode(&self, _bytes: &[u8]) -> Result<Vec<u8>> {
      Ok(with_meta(b"name=\"Rome\"", b"SAV0100aaaa\ndate=1836.1.1".to_vec()))
    }
  }

  #[test]
  fn decoded_meta_names_the_playthrough() {
    let extractor = crate::Extractor::default();
    let record = crate::read_snapshot(b"PK\x03\x04zzz", &WithMeta, &extractor, None).unwrap();
    assert_eq!(record.playthrough_id, "Rome");
    assert_eq!(record.date.as_deref(), Some("1836.1.1"));
  }

  #[test]
  fn normalization() {
    assert_eq!(normalize_text(b"\xEF\xBB\xBFa=1"), "a=1");
    assert_eq!(normalize_text("név".as_bytes()), "név");
    assert_eq!(normalize_text(b"caf\xE9"), "café");
  }
}
