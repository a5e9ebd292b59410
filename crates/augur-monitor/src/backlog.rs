//! The ordered queue between the intake and the sequencer.
//!
//! Paths go in; the sequencer reads content only when it reaches them. A path
//! that is already waiting is not queued twice, since the waiting entry will
//! read the newest bytes anyway.

use std::{
  collections::HashSet,
  path::{Path, PathBuf},
  sync::{
    Arc, Mutex, MutexGuard,
    atomic::{AtomicBool, Ordering},
  },
};

use tokio::sync::mpsc;

use crate::events::RunStats;

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
  m.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Run-wide figures read by `status()` while the pipeline is running.
#[derive(Debug, Default)]
pub(crate) struct Shared {
  pending:  Mutex<HashSet<PathBuf>>,
  stats:    Mutex<RunStats>,
  fault:    Mutex<Option<String>>,
  degraded: AtomicBool,
}

impl Shared {
  /// Called by the sequencer as it picks `path` up.
  pub fn take(&self, path: &Path) { lock(&self.pending).remove(path); }

  pub fn backlog_len(&self) -> usize { lock(&self.pending).len() }

  pub fn stats(&self) -> RunStats { *lock(&self.stats) }

  pub fn update_stats(&self, f: impl FnOnce(&mut RunStats)) { f(&mut lock(&self.stats)); }

  pub fn fault(&self) -> Option<String> { lock(&self.fault).clone() }

  pub fn set_fault(&self, reason: String) { *lock(&self.fault) = Some(reason); }

  pub fn is_degraded(&self) -> bool { self.degraded.load(Ordering::Relaxed) }

  pub fn set_degraded(&self, degraded: bool) {
    self.degraded.store(degraded, Ordering::Relaxed);
  }
}

/// Sending half of the backlog. Every clone keeps the channel open; the
/// sequencer sees the end of the backlog once all of them are dropped.
#[derive(Debug, Clone)]
pub(crate) struct Backlog {
  tx:     mpsc::UnboundedSender<PathBuf>,
  shared: Arc<Shared>,
}

impl Backlog {
  pub fn new(tx: mpsc::UnboundedSender<PathBuf>, shared: Arc<Shared>) -> Self {
    Self { tx, shared }
  }

  pub fn shared(&self) -> &Shared { &self.shared }

  /// Queue `path`. Returns `false` if it was already waiting or the
  /// sequencer is gone.
  pub fn push(&self, path: PathBuf) -> bool {
    if !lock(&self.shared.pending).insert(path.clone()) {
      return false;
    }
    if self.tx.send(path.clone()).is_err() {
      self.shared.take(&path);
      return false;
    }
    true
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn waiting_paths_are_coalesced() {
    let (tx, mut rx) = mpsc::unbounded_channel();
    let shared = Arc::new(Shared::default());
    let backlog = Backlog::new(tx, shared.clone());

    assert!(backlog.push("/s/a.v3".into()));
    assert!(backlog.push("/s/b.v3".into()));
    assert!(!backlog.push("/s/a.v3".into()));
    assert_eq!(shared.backlog_len(), 2);

    let first = rx.try_recv().unwrap();
    assert_eq!(first, PathBuf::from("/s/a.v3"));
    shared.take(&first);

    // Once picked up, a new write to the same file queues again.
    assert!(backlog.push("/s/a.v3".into()));
    let order: Vec<PathBuf> = std::iter::from_fn(|| rx.try_recv().ok()).collect();
    assert_eq!(order, vec![PathBuf::from("/s/b.v3"), PathBuf::from("/s/a.v3")]);
  }

  #[test]
  fn closed_backlog_rejects() {
    let (tx, rx) = mpsc::unbounded_channel();
    drop(rx);
    let shared = Arc::new(Shared::default());
    let backlog = Backlog::new(tx, shared.clone());
    assert!(!backlog.push("/s/a.v3".into()));
    assert_eq!(shared.backlog_len(), 0);
  }
}
