//! SQL schemas for the Augur SQLite stores.
//!
//! Executed once per connection. `PRAGMA user_version` records the layout so
//! later migrations can be gated on it. Readers select columns by name, so
//! columns added by newer builds are ignored.

/// One file per playthrough. Rows are replaced, never edited in place.
pub const HISTORY_SCHEMA: &str = "
PRAGMA journal_mode = WAL;
PRAGMA synchronous = FULL;

CREATE TABLE IF NOT EXISTS snapshots (
    game_day     INTEGER PRIMARY KEY,
    record_json  TEXT NOT NULL,     -- serialized SnapshotRecord
    fingerprint  TEXT,              -- sha-256 of the source file, if known
    ingested_at  TEXT NOT NULL      -- RFC 3339 UTC
);

PRAGMA user_version = 1;
";

/// Ingestion state for every watched directory.
pub const STATE_SCHEMA: &str = "
PRAGMA journal_mode = WAL;
PRAGMA synchronous = FULL;

CREATE TABLE IF NOT EXISTS directories (
    directory     TEXT PRIMARY KEY,
    last_drained  INTEGER NOT NULL DEFAULT 0,
    updated_at    TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS seen_files (
    directory       TEXT NOT NULL,
    fingerprint     TEXT NOT NULL,
    path            TEXT NOT NULL,
    seen_at         TEXT NOT NULL,
    outcome         TEXT NOT NULL,   -- 'ingested' | 'superseded' | 'failed'
    playthrough_id  TEXT,
    PRIMARY KEY (directory, fingerprint)
);

CREATE TABLE IF NOT EXISTS playthrough_index (
    directory       TEXT NOT NULL,
    playthrough_id  TEXT NOT NULL,
    hint            TEXT NOT NULL,
    campaign_id     TEXT,
    PRIMARY KEY (directory, playthrough_id)
);

PRAGMA user_version = 1;
";
