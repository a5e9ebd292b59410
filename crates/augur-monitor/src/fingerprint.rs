//! Content fingerprints for snapshot files.
//!
//! A fingerprint is the SHA-256 of the raw file bytes, before any decoding,
//! so a byte-identical rewrite of a save is recognised as already seen.

use augur_core::ingest::Fingerprint;
use sha2::{Digest, Sha256};

pub fn fingerprint(bytes: &[u8]) -> Fingerprint {
  let hash = Sha256::digest(bytes);
  Fingerprint::from_hex(hex::encode(hash))
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn same_bytes_same_fingerprint() {
    assert_eq!(fingerprint(b"date=1836.1.1"), fingerprint(b"date=1836.1.1"));
  }

  #[test]
  fn one_byte_changes_fingerprint() {
    assert_ne!(fingerprint(b"date=1836.1.1"), fingerprint(b"date=1836.1.2"));
  }

  #[test]
  fn is_lowercase_hex_sha256() {
    let fp = fingerprint(b"");
    assert_eq!(
      fp.as_str(),
      "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
    );
  }
}
