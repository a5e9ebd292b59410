//! Save-directory monitor for augur.
//!
//! A [`Monitor`] watches one directory of snapshot files, deduplicates them
//! by content fingerprint, and runs each new one through decode, parse and
//! extract before appending the record to its playthrough's history. Work is
//! strictly sequential per directory; observers follow along through
//! [`MonitorEvent`]s.
//!
//! ```no_run
//! # async fn run() -> anyhow::Result<()> {
//! use std::sync::Arc;
//!
//! use augur_monitor::{Monitor, MonitorConfig};
//! use augur_store_sqlite::{SqliteHistoryStore, SqliteStateStore};
//!
//! let config = MonitorConfig::new("/saves", "/data");
//! let history = Arc::new(SqliteHistoryStore::open(&config.data_dir).await?);
//! let state = Arc::new(SqliteStateStore::open(&config.data_dir).await?);
//!
//! let mut monitor = Monitor::new(config, history, state);
//! monitor.start().await?;
//! // ... later
//! let report = monitor.stop().await?;
//! println!("{} snapshots ingested", report.stats.processed);
//! # Ok(())
//! # }
//! ```

mod backlog;
pub mod config;
pub mod error;
pub mod events;
pub mod fingerprint;
mod monitor;
pub mod playthrough;
mod sequencer;
mod watch;


pub use config::{MonitorConfig, WatchMode};
pub use error::{Error, IngestError, Result, Stage};
pub use events::{DrainReport, MonitorEvent, MonitorStatus, Phase, RunStats, SkipReason};
pub use monitor::Monitor;
