//! Observing the save directory.
//!
//! The intake task owns the `notify` watcher and turns its notifications into
//! backlog entries. It never reads file contents; that is the sequencer's job.

use std::{
  io,
  path::{Path, PathBuf},
  sync::Arc,
  time::{Duration, Instant, SystemTime},
};

use notify::{
  Event, EventHandler, EventKind, PollWatcher, RecursiveMode, Watcher,
  event::{ModifyKind, RenameMode},
};
use tokio::sync::{broadcast, mpsc};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::{
  Result,
  backlog::Backlog,
  config::{MonitorConfig, WatchMode},
  events::MonitorEvent,
};

pub(crate) type RawEvents = mpsc::UnboundedReceiver<notify::Result<Event>>;

// ─── Watcher setup ───────────────────────────────────────────────────────────

/// Start watching `dir` according to `config.watch_mode`. Returns the
/// watcher, the mode actually in use, and its notification stream.
pub(crate) fn build_watcher(
  dir: &Path,
  config: &MonitorConfig,
) -> Result<(Box<dyn Watcher + Send>, WatchMode, RawEvents)> {
  let (tx, rx) = mpsc::unbounded_channel::<notify::Result<Event>>();
  let handler = move |result| {
    if tx.send(result).is_err() {
      debug!("watcher notification receiver dropped");
    }
  };

  let (watcher, mode) = match config.watch_mode {
    WatchMode::Native => (native(dir, handler)?, WatchMode::Native),
    WatchMode::Poll => (poll(dir, handler, config.poll_interval())?, WatchMode::Poll),
    WatchMode::Auto => match native(dir, handler.clone()) {
      Ok(watcher) => (watcher, WatchMode::Native),
      Err(e) => {
        warn!(error = %e, "native file notifications unavailable, polling instead");
        (poll(dir, handler, config.poll_interval())?, WatchMode::Poll)
      }
    },
  };
  Ok((watcher, mode, rx))
}

fn native(
  dir: &Path,
  handler: impl EventHandler,
) -> notify::Result<Box<dyn Watcher + Send>> {
  let mut watcher = notify::recommended_watcher(handler)?;
  watcher.watch(dir, RecursiveMode::NonRecursive)?;
  Ok(Box::new(watcher))
}

fn poll(
  dir: &Path,
  handler: impl EventHandler,
  interval: Duration,
) -> notify::Result<Box<dyn Watcher + Send>> {
  let config = notify::Config::default().with_poll_interval(interval);
  let mut watcher = PollWatcher::new(handler, config)?;
  watcher.watch(dir, RecursiveMode::NonRecursive)?;
  Ok(Box::new(watcher))
}

// ─── Classification ──────────────────────────────────────────────────────────

/// Snapshot files named by `event` that may carry new content.
///
/// Creations, writes and renames into the directory count; the source side of
/// a rename does not. Only top-level files with the snapshot extension pass.
pub(crate) fn candidates(
  event: &Event,
  dir: &Path,
  config: &MonitorConfig,
) -> Vec<PathBuf> {
  let paths: &[PathBuf] = match event.kind {
    EventKind::Create(_) => &event.paths,
    EventKind::Modify(ModifyKind::Name(RenameMode::From)) => &[],
    EventKind::Modify(ModifyKind::Name(RenameMode::Both)) => {
      event.paths.last().map(std::slice::from_ref).unwrap_or(&[])
    }
    EventKind::Modify(_) => &event.paths,
    _ => &[],
  };
  paths
    .iter()
    .filter(|p| p.parent() == Some(dir) && config.matches_extension(p))
    .cloned()
    .collect()
}

/// Matching files already in `dir`, oldest modification first.
pub(crate) async fn scan(dir: &Path, config: &MonitorConfig) -> io::Result<Vec<PathBuf>> {
  let mut found: Vec<(SystemTime, PathBuf)> = Vec::new();
  let mut entries = tokio::fs::read_dir(dir).await?;
  while let Some(entry) = entries.next_entry().await? {
    let path = entry.path();
    if !config.matches_extension(&path) {
      continue;
    }
    let meta = entry.metadata().await?;
    if !meta.is_file() {
      continue;
    }
    found.push((meta.modified().unwrap_or(SystemTime::UNIX_EPOCH), path));
  }
  found.sort();
  Ok(found.into_iter().map(|(_, p)| p).collect())
}

// ─── Settle wait ─────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Settled {
  Ready,
  Vanished,
  TimedOut,
}

/// Wait until `path` keeps the same size and mtime for `quiet`, so a save
/// the game is still writing is not read half-way.
pub(crate) async fn settle(
  path: &Path,
  quiet: Duration,
  timeout: Duration,
) -> io::Result<Settled> {
  let started = Instant::now();
  let Some(mut last) = stamp(path).await? else {
    return Ok(Settled::Vanished);
  };
  if quiet.is_zero() {
    return Ok(Settled::Ready);
  }
  loop {
    tokio::time::sleep(quiet).await;
    let Some(now) = stamp(path).await? else {
      return Ok(Settled::Vanished);
    };
    if now == last {
      return Ok(Settled::Ready);
    }
    if started.elapsed() >= timeout {
      return Ok(Settled::TimedOut);
    }
    last = now;
  }
}

async fn stamp(path: &Path) -> io::Result<Option<(u64, Option<SystemTime>)>> {
  match tokio::fs::metadata(path).await {
    Ok(meta) => Ok(Some((meta.len(), meta.modified().ok()))),
    Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
    Err(e) => Err(e),
  }
}

// ─── Intake task ─────────────────────────────────────────────────────────────

pub(crate) struct Intake {
  pub directory: PathBuf,
  pub config:    Arc<MonitorConfig>,
  pub watcher:   Box<dyn Watcher + Send>,
  pub raw:       RawEvents,
  pub backlog:   Backlog,
  pub token:     CancellationToken,
  pub events:    broadcast::Sender<MonitorEvent>,
}

impl Intake {
  /// Forward candidates until cancelled or the directory disappears.
  ///
  /// Returning drops the watcher and this task's backlog sender, which is
  /// what closes the backlog once the monitor has dropped its own.
  pub async fn run(mut self) {
    let mut liveness = tokio::time::interval(self.config.poll_interval());
    loop {
      tokio::select! {
        _ = self.token.cancelled() => break,
        Some(result) = self.raw.recv() => match result {
          Ok(event) => {
            for path in candidates(&event, &self.directory, &self.config) {
              if self.backlog.push(path.clone()) {
                debug!(path = %path.display(), "queued");
              }
            }
          }
          Err(e) => warn!(error = %e, "watcher error"),
        },
        _ = liveness.tick() => {
          if let Err(reason) = check_directory(&self.directory).await {
            error!(directory = %self.directory.display(), %reason, "save directory unavailable");
            self.backlog.shared().set_fault(reason.clone());
            self.events.send(MonitorEvent::DirectoryUnavailable {
              directory: self.directory.clone(),
              reason,
            }).ok();
            self.token.cancel();
            break;
          }
        }
      }
    }
    drop(self.watcher);
    info!(directory = %self.directory.display(), "no longer accepting new files");
  }
}

/// The watcher is only `Send`, so nothing borrowed from [`Intake`] may be
/// held across this await.
async fn check_directory(directory: &Path) -> std::result::Result<(), String> {
  match tokio::fs::metadata(directory).await {
    Ok(meta) if meta.is_dir() => Ok(()),
    Ok(_) => Err("no longer a directory".to_string()),
    Err(e) => Err(e.to_string()),
  }
}
