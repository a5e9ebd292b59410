//! Which playthrough a snapshot file belongs to.

use std::path::Path;

use augur_core::ingest::{playthrough_hint, sanitize_playthrough_id};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
  pub playthrough_id: String,
  /// Prefix derived from the file name alone.
  pub hint:           String,
}

/// Resolve a file's playthrough.
///
/// A name written inside the save wins over the file name hint, since players
/// rename saves but the game keeps the playthrough name.
pub fn resolve(path: &Path, content_name: Option<&str>) -> Identity {
  let hint = playthrough_hint(&file_stem(path));
  let playthrough_id = content_name
    .map(sanitize_playthrough_id)
    .filter(|id| !id.is_empty())
    .unwrap_or_else(|| hint.clone());
  Identity { playthrough_id, hint }
}

pub fn file_stem(path: &Path) -> String {
  path
    .file_stem()
    .map(|s| s.to_string_lossy().into_owned())
    .unwrap_or_default()
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn hint_from_autosave_name() {
    let id = resolve(Path::new("/saves/autosave_rome_1840_3_15.v3"), None);
    assert_eq!(id.hint, "rome");
    assert_eq!(id.playthrough_id, "rome");
  }

  #[test]
  fn content_name_wins() {
    let id = resolve(Path::new("/saves/autosave.v3"), Some("Great Britain"));
    assert_eq!(id.hint, "campaign");
    assert_eq!(id.playthrough_id, "Great_Britain");
  }

  #[test]
  fn blank_content_name_falls_back() {
    let id = resolve(Path::new("/saves/prussia_2.v3"), Some("  ?? "));
    assert_eq!(id.playthrough_id, "prussia");
  }
}
