//! [`SqliteStateStore`]: the SQLite implementation of [`StateStore`].

use std::path::Path;

use augur_core::{
  ingest::{IngestionState, PlaythroughBinding, SeenFile},
  store::StateStore,
};
use chrono::Utc;
use rusqlite::OptionalExtension as _;

use crate::{
  Result,
  encode::{RawBinding, RawSeenFile, encode_dt, encode_path},
  schema::STATE_SCHEMA,
};

/// Ingestion state for all watched directories, in a single SQLite file.
///
/// Cloning is cheap; the inner connection is reference-counted.
#[derive(Clone)]
pub struct SqliteStateStore {
  conn: tokio_rusqlite::Connection,
}

impl SqliteStateStore {
  /// Open (or create) `<data_dir>/state.sqlite3`.
  pub async fn open(data_dir: impl AsRef<Path>) -> Result<Self> {
    tokio::fs::create_dir_all(data_dir.as_ref()).await?;
    let conn =
      tokio_rusqlite::Connection::open(data_dir.as_ref().join("state.sqlite3")).await?;
    let store = Self { conn };
    store.init_schema().await?;
    Ok(store)
  }

  /// Open an in-memory store, for tests.
  pub async fn open_in_memory() -> Result<Self> {
    let conn = tokio_rusqlite::Connection::open_in_memory().await?;
    let store = Self { conn };
    store.init_schema().await?;
    Ok(store)
  }

  async fn init_schema(&self) -> Result<()> {
    self
      .conn
      .call(|conn| {
        conn.execute_batch(STATE_SCHEMA)?;
        Ok(())
      })
      .await?;
    Ok(())
  }
}

// ─── StateStore impl ─────────────────────────────────────────────────────────

impl StateStore for SqliteStateStore {
  type Error = crate::Error;

  async fn load_state(&self, directory: &Path) -> Result<IngestionState> {
    let dir = encode_path(directory);

    let (drained, seen, bindings) = self
      .conn
      .call(move |conn| {
        let drained: Option<bool> = conn
          .query_row(
            "SELECT last_drained FROM directories WHERE directory = ?1",
            rusqlite::params![dir],
            |row| row.get(0),
          )
          .optional()?;

        let mut stmt = conn.prepare(
          "SELECT fingerprint, path, seen_at, outcome, playthrough_id
           FROM seen_files WHERE directory = ?1",
        )?;
        let seen = stmt
          .query_map(rusqlite::params![dir], |row| {
            Ok(RawSeenFile {
              fingerprint:    row.get(0)?,
              path:           row.get(1)?,
              seen_at:        row.get(2)?,
              outcome:        row.get(3)?,
              playthrough_id: row.get(4)?,
            })
          })?
          .collect::<rusqlite::Result<Vec<_>>>()?;

        let mut stmt = conn.prepare(
          "SELECT playthrough_id, hint, campaign_id
           FROM playthrough_index WHERE directory = ?1",
        )?;
        let bindings = stmt
          .query_map(rusqlite::params![dir], |row| {
            Ok(RawBinding {
              playthrough_id: row.get(0)?,
              hint:           row.get(1)?,
              campaign_id:    row.get(2)?,
            })
          })?
          .collect::<rusqlite::Result<Vec<_>>>()?;

        Ok((drained.unwrap_or(false), seen, bindings))
      })
      .await?;

    let mut state = IngestionState::new(directory);
    state.last_drained = drained;
    for raw in seen {
      state.mark_seen(raw.into_seen_file()?);
    }
    for raw in bindings {
      state.restore_binding(raw.into());
    }
    Ok(state)
  }

  async fn record_seen(
    &self,
    directory: &Path,
    file: &SeenFile,
    binding: Option<&PlaythroughBinding>,
  ) -> Result<()> {
    let dir = encode_path(directory);
    let now = encode_dt(Utc::now());
    let fingerprint = file.fingerprint.as_str().to_owned();
    let path = encode_path(&file.path);
    let seen_at = encode_dt(file.seen_at);
    let outcome = file.outcome.as_str();
    let playthrough_id = file.playthrough_id.clone();
    let binding = binding.cloned();

    self
      .conn
      .call(move |conn| {
        let tx = conn.transaction()?;
        tx.execute(
          "INSERT INTO directories (directory, last_drained, updated_at)
           VALUES (?1, 0, ?2)
           ON CONFLICT(directory) DO UPDATE SET updated_at = excluded.updated_at",
          rusqlite::params![dir, now],
        )?;
        tx.execute(
          "INSERT OR REPLACE INTO seen_files
             (directory, fingerprint, path, seen_at, outcome, playthrough_id)
           VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
          rusqlite::params![dir, fingerprint, path, seen_at, outcome, playthrough_id],
        )?;
        if let Some(b) = binding {
          tx.execute(
            "INSERT INTO playthrough_index (directory, playthrough_id, hint, campaign_id)
             VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT(directory, playthrough_id) DO UPDATE SET
               campaign_id = COALESCE(playthrough_index.campaign_id, excluded.campaign_id)",
            rusqlite::params![dir, b.playthrough_id, b.hint, b.campaign_id],
          )?;
        }
        tx.commit()?;
        Ok(())
      })
      .await?;
    Ok(())
  }

  async fn set_last_drained(&self, directory: &Path, drained: bool) -> Result<()> {
    let dir = encode_path(directory);
    let now = encode_dt(Utc::now());
    self
      .conn
      .call(move |conn| {
        conn.execute(
          "INSERT INTO directories (directory, last_drained, updated_at)
           VALUES (?1, ?2, ?3)
           ON CONFLICT(directory) DO UPDATE SET
             last_drained = excluded.last_drained,
             updated_at   = excluded.updated_at",
          rusqlite::params![dir, drained, now],
        )?;
        Ok(())
      })
      .await?;
    Ok(())
  }

  async fn reset(&self, directory: &Path) -> Result<()> {
    let dir = encode_path(directory);
    self
      .conn
      .call(move |conn| {
        let tx = conn.transaction()?;
        for table in ["seen_files", "playthrough_index", "directories"] {
          tx.execute(
            &format!("DELETE FROM {table} WHERE directory = ?1"),
            rusqlite::params![dir],
          )?;
        }
        tx.commit()?;
        Ok(())
      })
      .await?;
    Ok(())
  }
}
