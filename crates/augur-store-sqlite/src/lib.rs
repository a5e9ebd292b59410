//! SQLite backend for Augur histories and ingestion state.
//!
//! Wraps [`tokio_rusqlite`] so all database access runs on a dedicated thread
//! without blocking the async runtime.
//!
//! Layout under a data directory:
//!
//! ```text
//! <data_dir>/state.sqlite3                  ingestion state, all directories
//! <data_dir>/playthroughs/<id>.sqlite3      one history per playthrough
//! ```

mod encode;
mod history;
mod schema;
mod state;

pub mod error;

pub use error::{Error, Result};
pub use history::SqliteHistoryStore;
pub use state::SqliteStateStore;

#[cfg(test)]
mod tests;
