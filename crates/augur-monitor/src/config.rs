//! Monitor configuration.
//!
//! Deserialized by the binary from `augur.toml` layered with `AUGUR_*`
//! environment variables; every field has a default so an empty source is a
//! valid configuration.

use std::{fmt, path::PathBuf, str::FromStr, time::Duration};

use augur_pdx::extract::DEFAULT_CRASH_THRESHOLD;
use serde::{Deserialize, Serialize};

/// How the save directory is observed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WatchMode {
  /// Native notifications, falling back to polling if they cannot be set up.
  #[default]
  Auto,
  Native,
  Poll,
}

impl fmt::Display for WatchMode {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(match self {
      Self::Auto => "auto",
      Self::Native => "native",
      Self::Poll => "poll",
    })
  }
}

impl FromStr for WatchMode {
  type Err = String;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    match s.to_ascii_lowercase().as_str() {
      "auto" => Ok(Self::Auto),
      "native" => Ok(Self::Native),
      "poll" => Ok(Self::Poll),
      other => Err(format!("unknown watch mode `{other}` (auto, native, poll)")),
    }
  }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MonitorConfig {
  /// Directory the game writes its saves into. Only the top level is watched.
  pub save_dir:          PathBuf,
  /// Where histories and ingestion state live.
  pub data_dir:          PathBuf,
  /// Snapshot file extension, without the dot. Compared case-insensitively.
  pub extension:         String,
  /// A file must keep the same size and mtime for this long before it is read.
  pub settle_ms:         u64,
  /// Give up on a file that is still changing after this long.
  pub settle_timeout_ms: u64,
  pub watch_mode:        WatchMode,
  pub poll_interval_ms:  u64,
  pub crash_threshold:   f64,
  /// Consecutive decoder failures before the monitor reports degraded mode.
  pub degraded_after:    u32,
  /// Queue files already present in `save_dir` when the monitor starts.
  pub scan_existing:     bool,
}

impl Default for MonitorConfig {
  fn default() -> Self {
    Self {
      save_dir:          PathBuf::from(
        "~/Documents/Paradox Interactive/Victoria 3/save games",
      ),
      data_dir:          PathBuf::from("~/.augur"),
      extension:         "v3".to_string(),
      settle_ms:         1500,
      settle_timeout_ms: 30_000,
      watch_mode:        WatchMode::Auto,
      poll_interval_ms:  2000,
      crash_threshold:   DEFAULT_CRASH_THRESHOLD,
      degraded_after:    3,
      scan_existing:     true,
    }
  }
}

impl MonitorConfig {
  pub fn new(save_dir: impl Into<PathBuf>, data_dir: impl Into<PathBuf>) -> Self {
    Self {
      save_dir: save_dir.into(),
      data_dir: data_dir.into(),
      ..Self::default()
    }
  }

  pub fn settle(&self) -> Duration { Duration::from_millis(self.settle_ms) }

  pub fn settle_timeout(&self) -> Duration {
    Duration::from_millis(self.settle_timeout_ms)
  }

  /// `degraded_after`, treating zero as one.
  pub fn degraded_after(&self) -> u32 { self.degraded_after.max(1) }

  pub fn poll_interval(&self) -> Duration {
    Duration::from_millis(self.poll_interval_ms.max(1))
  }

  /// Whether `path` has the snapshot extension.
  pub fn matches_extension(&self, path: &std::path::Path) -> bool {
    path
      .extension()
      .and_then(|e| e.to_str())
      .is_some_and(|e| e.eq_ignore_ascii_case(&self.extension))
  }
}

#[cfg(test)]
mod tests {
  use std::path::Path;

  use super::*;

  #[test]
  fn empty_source_uses_defaults() {
    let cfg: MonitorConfig = serde_json::from_str("{}").unwrap();
    assert_eq!(cfg.extension, "v3");
    assert_eq!(cfg.settle_ms, 1500);
    assert_eq!(cfg.watch_mode, WatchMode::Auto);
    assert!(cfg.scan_existing);
  }

  #[test]
  fn partial_source_overrides() {
    let cfg: MonitorConfig =
      serde_json::from_str(r#"{ "watch_mode": "poll", "degraded_after": 5 }"#).unwrap();
    assert_eq!(cfg.watch_mode, WatchMode::Poll);
    assert_eq!(cfg.degraded_after, 5);
    assert_eq!(cfg.crash_threshold, DEFAULT_CRASH_THRESHOLD);
  }

  #[test]
  fn zero_degraded_threshold_means_first_failure() {
    let mut cfg = MonitorConfig::default();
    cfg.degraded_after = 0;
    assert_eq!(cfg.degraded_after(), 1);
    cfg.degraded_after = 4;
    assert_eq!(cfg.degraded_after(), 4);
  }

  #[test]
  fn extension_is_case_insensitive() {
    let cfg = MonitorConfig::default();
    assert!(cfg.matches_extension(Path::new("/s/rome.V3")));
    assert!(!cfg.matches_extension(Path::new("/s/rome.v3.tmp")));
    assert!(!cfg.matches_extension(Path::new("/s/rome")));
  }

  #[test]
  fn watch_mode_parses() {
    assert_eq!("POLL".parse::<WatchMode>().unwrap(), WatchMode::Poll);
    assert!("inotify".parse::<WatchMode>().is_err());
  }
}
