//! The single consumer of a directory's backlog.
//!
//! One file at a time: settle, read, fingerprint, decode + parse + extract,
//! resolve the playthrough, append, then flush the ingestion state. The
//! sequencer is the only owner of [`IngestionState`].

use std::{
  collections::BTreeSet,
  path::{Path, PathBuf},
  sync::Arc,
};

use augur_core::{
  ingest::{Fingerprint, IngestionState, SeenFile, SeenOutcome},
  store::{HistoryStore, StateStore},
};
use augur_pdx::{Extractor, SnapshotDecoder, filename_date, read_snapshot};
use chrono::Utc;
use tokio::sync::{broadcast, mpsc};
use tracing::{debug, error, info, warn};

use crate::{
  backlog::Shared,
  config::MonitorConfig,
  error::{IngestError, Stage},
  events::{DrainReport, MonitorEvent, SkipReason},
  fingerprint::fingerprint,
  playthrough::{self, file_stem},
  watch::{Settled, settle},
};

pub(crate) struct Sequencer<H, S> {
  directory:        PathBuf,
  config:           Arc<MonitorConfig>,
  history:          Arc<H>,
  state_store:      Arc<S>,
  state:            IngestionState,
  decoder:          Arc<dyn SnapshotDecoder>,
  extractor:        Extractor,
  events:           broadcast::Sender<MonitorEvent>,
  shared:           Arc<Shared>,
  /// Playthroughs whose last append failed; their files wait for a later run.
  paused:           BTreeSet<String>,
  touched:          BTreeSet<String>,
  decoder_failures: u32,
}

impl<H, S> Sequencer<H, S>
where
  H: HistoryStore,
  S: StateStore,
{
  pub fn new(
    state: IngestionState,
    config: Arc<MonitorConfig>,
    history: Arc<H>,
    state_store: Arc<S>,
    decoder: Arc<dyn SnapshotDecoder>,
    events: broadcast::Sender<MonitorEvent>,
    shared: Arc<Shared>,
  ) -> Self {
    Self {
      directory: state.directory().to_path_buf(),
      extractor: Extractor::new(config.crash_threshold),
      config,
      history,
      state_store,
      state,
      decoder,
      events,
      shared,
      paused: BTreeSet::new(),
      touched: BTreeSet::new(),
      decoder_failures: 0,
    }
  }

  /// Process the backlog in arrival order until every sender is gone, then
  /// announce the drain and, after it, the visualization request.
  pub async fn run(mut self, mut backlog: mpsc::UnboundedReceiver<PathBuf>) -> DrainReport {
    if let Err(e) = self.state_store.set_last_drained(&self.directory, false).await {
      error!(directory = %self.directory.display(), error = %e, "could not record run start");
    }

    while let Some(path) = backlog.recv().await {
      self.shared.take(&path);
      self.process(path).await;
    }

    if let Err(e) = self.state_store.set_last_drained(&self.directory, true).await {
      error!(directory = %self.directory.display(), error = %e, "could not record drain");
    }

    let report = DrainReport {
      directory:    self.directory.clone(),
      stats:        self.shared.stats(),
      playthroughs: self.touched.iter().cloned().collect(),
      paused:       self.paused.iter().cloned().collect(),
      fault:        self.shared.fault(),
    };
    info!(
      directory = %self.directory.display(),
      processed = report.stats.processed,
      failed = report.stats.failed,
      "backlog drained"
    );
    self.emit(MonitorEvent::DrainComplete { report: report.clone() });
    self.emit(MonitorEvent::VisualizationRequested {
      playthroughs: report.playthroughs.clone(),
    });
    report
  }

  fn emit(&self, event: MonitorEvent) {
    // No subscribers is not an error.
    self.events.send(event).ok();
  }

  fn skip(&self, path: PathBuf, reason: SkipReason) {
    debug!(path = %path.display(), ?reason, "skipped");
    self.shared.update_stats(|s| match reason {
      SkipReason::Duplicate => s.duplicates += 1,
      _ => s.skipped += 1,
    });
    self.emit(MonitorEvent::Skipped { path, reason });
  }

  async fn process(&mut self, path: PathBuf) {
    match settle(&path, self.config.settle(), self.config.settle_timeout()).await {
      Ok(Settled::Ready) => {}
      Ok(Settled::Vanished) => return self.skip(path, SkipReason::Vanished),
      Ok(Settled::TimedOut) => return self.skip(path, SkipReason::NotSettled),
      Err(e) => return self.fail(IngestError::new(Stage::Read, path, None, e)).await,
    }

    let bytes = match tokio::fs::read(&path).await {
      Ok(bytes) => bytes,
      Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
        return self.skip(path, SkipReason::Vanished);
      }
      Err(e) => return self.fail(IngestError::new(Stage::Read, path, None, e)).await,
    };

    let fp = fingerprint(&bytes);
    if self.state.is_seen(&fp) {
      return self.skip(path, SkipReason::Duplicate);
    }

    debug!(path = %path.display(), fingerprint = fp.short(), "ingesting");
    self.emit(MonitorEvent::FileStarted {
      path:        path.clone(),
      fingerprint: fp.clone(),
    });

    if let Err(e) = self.ingest(&path, &fp, bytes).await {
      self.fail(e).await;
    }
  }

  async fn ingest(
    &mut self,
    path: &Path,
    fp: &Fingerprint,
    bytes: Vec<u8>,
  ) -> Result<(), IngestError> {
    let decoder = self.decoder.clone();
    let extractor = self.extractor.clone();
    let fallback = filename_date(&file_stem(path));
    let read = tokio::task::spawn_blocking(move || {
      read_snapshot(&bytes, decoder.as_ref(), &extractor, fallback)
    })
    .await;

    let mut record = match read {
      Ok(Ok(record)) => {
        self.note_decoder(true);
        record
      }
      Ok(Err(e)) => {
        if e.is_decoder_failure() {
          self.note_decoder(false);
        }
        return Err(IngestError::new(Stage::from(&e), path, Some(fp.clone()), e));
      }
      Err(e) => return Err(IngestError::new(Stage::Parse, path, Some(fp.clone()), e)),
    };

    let content_name = Some(record.playthrough_id.as_str()).filter(|n| !n.is_empty());
    let identity = playthrough::resolve(path, content_name);
    let id = identity.playthrough_id;

    if self.paused.contains(&id) {
      self.skip(path.to_path_buf(), SkipReason::Deferred);
      return Ok(());
    }

    self
      .state
      .check_binding(&id, record.campaign_id.as_deref())
      .map_err(|e| IngestError::new(Stage::Identity, path, Some(fp.clone()), e))?;

    record.playthrough_id = id.clone();
    record.fingerprint = Some(fp.to_string());
    record.source_file = path.file_name().map(|n| n.to_string_lossy().into_owned());
    let game_day = record.game_day;
    let date = record.display_date();
    let counts = record.counts();
    let campaign_id = record.campaign_id.clone();

    let outcome = match self.history.append(&id, record).await {
      Ok(outcome) => outcome,
      Err(e) => {
        self.paused.insert(id.clone());
        return Err(IngestError::new(Stage::Store, path, Some(fp.clone()), e));
      }
    };

    let binding = self.state.bind(&id, &identity.hint, campaign_id.as_deref()).clone();
    let seen = SeenFile {
      fingerprint:    fp.clone(),
      path:           path.to_path_buf(),
      seen_at:        Utc::now(),
      outcome:        if outcome.is_superseded() {
        SeenOutcome::Superseded
      } else {
        SeenOutcome::Ingested
      },
      playthrough_id: Some(id.clone()),
    };
    self.state.mark_seen(seen.clone());
    self.touched.insert(id.clone());

    self
      .state_store
      .record_seen(&self.directory, &seen, Some(&binding))
      .await
      .map_err(|e| IngestError::new(Stage::State, path, Some(fp.clone()), e))?;

    self.shared.update_stats(|s| {
      s.processed += 1;
      if outcome.is_superseded() {
        s.superseded += 1;
      }
    });
    info!(
      path = %path.display(),
      fingerprint = fp.short(),
      playthrough = %id,
      game_day,
      superseded = outcome.is_superseded(),
      "snapshot ingested"
    );
    self.emit(MonitorEvent::Ingested {
      path: path.to_path_buf(),
      fingerprint: fp.clone(),
      playthrough_id: id,
      game_day,
      date,
      superseded: outcome.is_superseded(),
      counts,
    });
    Ok(())
  }

  /// Track consecutive decoder failures; crossing the threshold reports
  /// degraded mode once, a successful read clears it.
  fn note_decoder(&mut self, ok: bool) {
    if ok {
      self.decoder_failures = 0;
      self.shared.set_degraded(false);
      return;
    }
    self.decoder_failures += 1;
    if self.decoder_failures >= self.config.degraded_after() && !self.shared.is_degraded() {
      warn!(
        decoder = self.decoder.name(),
        consecutive = self.decoder_failures,
        "binary snapshots keep failing to decode, running degraded"
      );
      self.shared.set_degraded(true);
      self.emit(MonitorEvent::DegradedMode {
        consecutive_decoder_failures: self.decoder_failures,
      });
    }
  }

  async fn fail(&mut self, err: IngestError) {
    self.shared.update_stats(|s| s.failed += 1);
    let fingerprint = err.fingerprint.as_ref().map(|f| f.short());

    if err.stage.is_file_scoped() {
      warn!(
        path = %err.path.display(),
        fingerprint,
        stage = %err.stage,
        error = %err.source,
        "snapshot rejected"
      );
      if let Some(fp) = &err.fingerprint {
        let seen = SeenFile {
          fingerprint:    fp.clone(),
          path:           err.path.clone(),
          seen_at:        Utc::now(),
          outcome:        SeenOutcome::Failed,
          playthrough_id: None,
        };
        self.state.mark_seen(seen.clone());
        if let Err(e) = self.state_store.record_seen(&self.directory, &seen, None).await {
          error!(path = %err.path.display(), error = %e, "could not record failed file");
        }
      }
    } else {
      error!(
        path = %err.path.display(),
        fingerprint,
        stage = %err.stage,
        error = %err.source,
        "ingestion failed"
      );
    }

    self.emit(MonitorEvent::Failed {
      path:        err.path,
      fingerprint: err.fingerprint,
      stage:       err.stage,
      reason:      err.source.to_string(),
    });
  }
}
