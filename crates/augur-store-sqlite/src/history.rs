//! [`SqliteHistoryStore`]: the SQLite implementation of [`HistoryStore`].

use std::{
  collections::{BTreeSet, HashMap},
  path::{Path, PathBuf},
  sync::Arc,
};

use augur_core::{
  history::{AppendOutcome, PlaythroughHistory, PlaythroughSummary},
  ingest::sanitize_playthrough_id,
  record::SnapshotRecord,
  store::HistoryStore,
};
use chrono::Utc;
use tokio::sync::Mutex;
use tracing::debug;

use crate::{Error, Result, encode::encode_dt, schema::HISTORY_SCHEMA};

const EXTENSION: &str = "sqlite3";

// ─── Per-playthrough handle ──────────────────────────────────────────────────

/// One open history file and its in-memory mirror.
///
/// The mirror is only updated after the durable write commits, so it never
/// runs ahead of disk.
struct Playthrough {
  conn:    tokio_rusqlite::Connection,
  history: PlaythroughHistory,
}

impl Playthrough {
  async fn open(conn: tokio_rusqlite::Connection, id: &str) -> Result<Self> {
    let rows: Vec<String> = conn
      .call(|conn| {
        conn.execute_batch(HISTORY_SCHEMA)?;
        let mut stmt =
          conn.prepare("SELECT record_json FROM snapshots ORDER BY game_day")?;
        let rows = stmt
          .query_map([], |row| row.get(0))?
          .collect::<rusqlite::Result<Vec<String>>>()?;
        Ok(rows)
      })
      .await?;

    let records = rows
      .iter()
      .map(|json| serde_json::from_str::<SnapshotRecord>(json))
      .collect::<serde_json::Result<Vec<_>>>()?;
    let history = PlaythroughHistory::from_records(id, records)?;
    debug!(playthrough = id, records = history.len(), "history loaded");
    Ok(Self { conn, history })
  }

  async fn write(&mut self, record: SnapshotRecord) -> Result<AppendOutcome> {
    // A NaN would be written as `null` and make every later open fail.
    record.check_finite()?;
    let day = record.game_day;
    let json = serde_json::to_string(&record)?;
    let fingerprint = record.fingerprint.clone();
    let ingested_at = encode_dt(Utc::now());

    self
      .conn
      .call(move |conn| {
        let tx = conn.transaction()?;
        tx.execute(
          "INSERT INTO snapshots (game_day, record_json, fingerprint, ingested_at)
           VALUES (?1, ?2, ?3, ?4)
           ON CONFLICT(game_day) DO UPDATE SET
             record_json = excluded.record_json,
             fingerprint = excluded.fingerprint,
             ingested_at = excluded.ingested_at",
          rusqlite::params![day, json, fingerprint, ingested_at],
        )?;
        tx.commit()?;
        Ok(())
      })
      .await?;

    Ok(self.history.upsert(record)?)
  }
}

// ─── Store ───────────────────────────────────────────────────────────────────

enum Location {
  Directory(PathBuf),
  Memory,
}

struct Inner {
  location:     Location,
  playthroughs: Mutex<HashMap<String, Arc<Mutex<Playthrough>>>>,
}

/// Playthrough histories, one SQLite file each.
///
/// Cloning is cheap; all clones share the open handles.
#[derive(Clone)]
pub struct SqliteHistoryStore {
  inner: Arc<Inner>,
}

impl SqliteHistoryStore {
  /// Open (or create) the history directory under `data_dir`.
  pub async fn open(data_dir: impl AsRef<Path>) -> Result<Self> {
    let dir = data_dir.as_ref().join("playthroughs");
    tokio::fs::create_dir_all(&dir).await?;
    Ok(Self::with_location(Location::Directory(dir)))
  }

  /// Histories that live only as long as the store, for tests.
  pub fn open_in_memory() -> Self { Self::with_location(Location::Memory) }

  fn with_location(location: Location) -> Self {
    Self {
      inner: Arc::new(Inner {
        location,
        playthroughs: Mutex::new(HashMap::new()),
      }),
    }
  }

  /// Directory holding the history files, if the store is on disk.
  pub fn directory(&self) -> Option<&Path> {
    match &self.inner.location {
      Location::Directory(dir) => Some(dir),
      Location::Memory => None,
    }
  }

  fn file_path(dir: &Path, id: &str) -> PathBuf {
    dir.join(format!("{id}.{EXTENSION}"))
  }

  /// Handle for `id`, opening its file if needed. With `create == false` a
  /// playthrough that has no file yet yields `None`.
  async fn handle(
    &self,
    id: &str,
    create: bool,
  ) -> Result<Option<Arc<Mutex<Playthrough>>>> {
    if id.is_empty() || sanitize_playthrough_id(id) != id {
      return Err(Error::InvalidPlaythroughId(id.to_string()));
    }

    let mut open = self.inner.playthroughs.lock().await;
    if let Some(handle) = open.get(id) {
      return Ok(Some(handle.clone()));
    }

    let conn = match &self.inner.location {
      Location::Directory(dir) => {
        let path = Self::file_path(dir, id);
        if !create && !tokio::fs::try_exists(&path).await? {
          return Ok(None);
        }
        tokio_rusqlite::Connection::open(path).await?
      }
      Location::Memory if create => tokio_rusqlite::Connection::open_in_memory().await?,
      Location::Memory => return Ok(None),
    };

    let handle = Arc::new(Mutex::new(Playthrough::open(conn, id).await?));
    open.insert(id.to_string(), handle.clone());
    Ok(Some(handle))
  }
}

// ─── HistoryStore impl ───────────────────────────────────────────────────────

impl HistoryStore for SqliteHistoryStore {
  type Error = Error;

  async fn append(
    &self,
    playthrough_id: &str,
    mut record: SnapshotRecord,
  ) -> Result<AppendOutcome> {
    if record.playthrough_id.is_empty() {
      record.playthrough_id = playthrough_id.to_string();
    }
    if record.playthrough_id != playthrough_id {
      return Err(Error::Core(augur_core::Error::PlaythroughMismatch {
        expected: playthrough_id.to_string(),
        found:    record.playthrough_id,
      }));
    }

    let Some(handle) = self.handle(playthrough_id, true).await? else {
      return Err(Error::InvalidPlaythroughId(playthrough_id.to_string()));
    };
    let mut playthrough = handle.lock().await;
    playthrough.write(record).await
  }

  async fn load(&self, playthrough_id: &str) -> Result<Vec<SnapshotRecord>> {
    match self.handle(playthrough_id, false).await? {
      Some(handle) => Ok(handle.lock().await.history.to_vec()),
      None => Ok(Vec::new()),
    }
  }

  async fn list_playthroughs(&self) -> Result<Vec<String>> {
    let mut ids: BTreeSet<String> =
      self.inner.playthroughs.lock().await.keys().cloned().collect();

    if let Location::Directory(dir) = &self.inner.location {
      let mut entries = tokio::fs::read_dir(dir).await?;
      while let Some(entry) = entries.next_entry().await? {
        let path = entry.path();
        if path.extension().and_then(|e| e.to_str()) != Some(EXTENSION) {
          continue;
        }
        if let Some(stem) = path.file_stem().and_then(|s| s.to_str())
          && sanitize_playthrough_id(stem) == stem
        {
          ids.insert(stem.to_string());
        }
      }
    }

    Ok(ids.into_iter().collect())
  }

  async fn summary(&self, playthrough_id: &str) -> Result<Option<PlaythroughSummary>> {
    match self.handle(playthrough_id, false).await? {
      Some(handle) => Ok(Some(handle.lock().await.history.summary())),
      None => Ok(None),
    }
  }
}
