//! [`Monitor`]: the start / stop / drain lifecycle for one save directory.

use std::{path::PathBuf, sync::Arc};

use augur_core::store::{HistoryStore, StateStore};
use augur_pdx::{SnapshotDecoder, default_decoder};
use tokio::{
  sync::{broadcast, mpsc, watch},
  task::JoinHandle,
};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::{
  Error, Result,
  backlog::{Backlog, Shared},
  config::MonitorConfig,
  events::{DrainReport, MonitorEvent, MonitorStatus, Phase},
  sequencer::Sequencer,
  watch::{self as fs_watch, Intake},
};

const EVENT_CAPACITY: usize = 1024;

struct Run {
  directory: PathBuf,
  token:     CancellationToken,
  backlog:   Backlog,
  intake:    JoinHandle<()>,
  sequencer: JoinHandle<DrainReport>,
}

/// Watches one save directory and feeds its snapshots into the history
/// store.
///
/// `Idle → Running` on [`Monitor::start`]; [`Monitor::stop`] moves through
/// `Draining` back to `Idle` once every queued file has been handled.
pub struct Monitor<H, S> {
  config:      Arc<MonitorConfig>,
  history:     Arc<H>,
  state_store: Arc<S>,
  decoder:     Arc<dyn SnapshotDecoder>,
  events:      broadcast::Sender<MonitorEvent>,
  phase:       watch::Sender<Phase>,
  shared:      Arc<Shared>,
  run:         Option<Run>,
}

impl<H, S> Monitor<H, S>
where
  H: HistoryStore + 'static,
  S: StateStore + 'static,
{
  pub fn new(config: MonitorConfig, history: Arc<H>, state_store: Arc<S>) -> Self {
    let (events, _) = broadcast::channel(EVENT_CAPACITY);
    let (phase, _) = watch::channel(Phase::Idle);
    Self {
      config: Arc::new(config),
      history,
      state_store,
      decoder: Arc::from(default_decoder()),
      events,
      phase,
      shared: Arc::new(Shared::default()),
      run: None,
    }
  }

  /// Replace the decoder used for binary snapshots.
  pub fn with_decoder(mut self, decoder: Arc<dyn SnapshotDecoder>) -> Self {
    self.decoder = decoder;
    self
  }

  pub fn config(&self) -> &MonitorConfig { &self.config }

  pub fn subscribe(&self) -> broadcast::Receiver<MonitorEvent> { self.events.subscribe() }

  pub fn phase(&self) -> watch::Receiver<Phase> { self.phase.subscribe() }

  /// Cancelled when a stop has been requested, including by the monitor
  /// itself after losing its directory.
  pub fn stop_token(&self) -> Option<CancellationToken> {
    self.run.as_ref().map(|run| run.token.clone())
  }

  /// Load the directory's ingestion state, start watching, and queue the
  /// files already present.
  pub async fn start(&mut self) -> Result<()> {
    if self.run.is_some() {
      return Err(Error::AlreadyRunning);
    }

    let save_dir = &self.config.save_dir;
    let directory = match tokio::fs::canonicalize(save_dir).await {
      Ok(dir) if dir.is_dir() => dir,
      Ok(dir) => {
        return Err(Error::DirectoryUnavailable {
          path:   dir,
          reason: "not a directory".to_string(),
        });
      }
      Err(e) => {
        return Err(Error::DirectoryUnavailable {
          path:   save_dir.clone(),
          reason: e.to_string(),
        });
      }
    };

    let state = self
      .state_store
      .load_state(&directory)
      .await
      .map_err(|e| Error::Store(Box::new(e)))?;
    if !state.last_drained && state.seen_count() > 0 {
      warn!(
        directory = %directory.display(),
        "previous run ended without draining, resuming from recorded state"
      );
    }

    let shared = Arc::new(Shared::default());
    self.shared = shared.clone();
    let (tx, rx) = mpsc::unbounded_channel();
    let backlog = Backlog::new(tx, shared.clone());
    let token = CancellationToken::new();

    // Watch before scanning so a save written mid-scan is not missed.
    let (watcher, mode, raw) = fs_watch::build_watcher(&directory, &self.config)?;
    let mut queued = 0;
    if self.config.scan_existing {
      let existing = fs_watch::scan(&directory, &self.config).await.map_err(|e| {
        Error::DirectoryUnavailable {
          path:   directory.clone(),
          reason: e.to_string(),
        }
      })?;
      for path in existing {
        if backlog.push(path) {
          queued += 1;
        }
      }
    }

    info!(
      directory = %directory.display(),
      watch_mode = %mode,
      backlog = queued,
      seen = state.seen_count(),
      "monitor started"
    );
    self.events.send(MonitorEvent::Started {
      directory: directory.clone(),
      backlog:   queued,
    }).ok();

    let sequencer = Sequencer::new(
      state,
      self.config.clone(),
      self.history.clone(),
      self.state_store.clone(),
      self.decoder.clone(),
      self.events.clone(),
      shared,
    );
    let sequencer = tokio::spawn(sequencer.run(rx));

    let intake = Intake {
      directory: directory.clone(),
      config: self.config.clone(),
      watcher,
      raw,
      backlog: backlog.clone(),
      token: token.clone(),
      events: self.events.clone(),
    };
    let intake = tokio::spawn(intake.run());

    self.run = Some(Run { directory, token, backlog, intake, sequencer });
    self.phase.send_replace(Phase::Running);
    Ok(())
  }

  /// Queue a file by hand, as if the watcher had reported it.
  pub fn enqueue(&self, path: impl Into<PathBuf>) -> Result<bool> {
    let run = self.run.as_ref().ok_or(Error::NotRunning)?;
    Ok(run.backlog.push(path.into()))
  }

  /// Stop accepting files, drain everything already queued, and return the
  /// run's report. The drain-complete and visualization events have been
  /// sent by the time this returns.
  pub async fn stop(&mut self) -> Result<DrainReport> {
    let Run { directory, token, backlog, intake, sequencer } =
      self.run.take().ok_or(Error::NotRunning)?;

    self.phase.send_replace(Phase::Draining);
    info!(
      directory = %directory.display(),
      backlog = self.shared.backlog_len(),
      "stopping, draining backlog"
    );
    token.cancel();
    drop(backlog);
    if let Err(e) = intake.await {
      warn!(error = %e, "intake task ended abnormally");
    }
    let report = sequencer.await;
    self.phase.send_replace(Phase::Idle);
    Ok(report?)
  }

  /// Phase, queue depth, run counters and per-playthrough summaries.
  pub async fn status(&self) -> Result<MonitorStatus> {
    let store_err = |e: H::Error| Error::Store(Box::new(e));
    let mut playthroughs = Vec::new();
    for id in self.history.list_playthroughs().await.map_err(store_err)? {
      if let Some(summary) = self.history.summary(&id).await.map_err(store_err)? {
        playthroughs.push(summary);
      }
    }

    Ok(MonitorStatus {
      phase: *self.phase.borrow(),
      directory: self.run.as_ref().map(|run| run.directory.clone()),
      backlog: self.shared.backlog_len(),
      degraded: self.shared.is_degraded(),
      stats: self.shared.stats(),
      playthroughs,
    })
  }
}

impl<H, S> Drop for Monitor<H, S> {
  fn drop(&mut self) {
    // The tasks outlive the handle; make them wind down.
    if let Some(run) = &self.run {
      run.token.cancel();
    }
  }
}
