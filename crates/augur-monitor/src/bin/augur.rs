//! The `augur` command-line tool.
//!
//! Reads `augur.toml` (or the path given with `--config`) layered with
//! `AUGUR_*` environment variables, e.g. `AUGUR_SAVE_DIR`, then applies
//! command-line overrides.
//!
//! ```text
//! augur watch              # ingest new saves until Ctrl-C
//! augur analyze            # ingest what is already there and exit
//! augur status --json
//! augur extract autosave.v3
//! ```

use std::{
  path::{Path, PathBuf},
  sync::Arc,
};

use anyhow::Context as _;
use augur_core::store::StateStore;
use augur_monitor::{
  DrainReport, Monitor, MonitorConfig, MonitorEvent, WatchMode, playthrough,
};
use augur_pdx::{Extractor, default_decoder, filename_date, read_snapshot};
use augur_store_sqlite::{SqliteHistoryStore, SqliteStateStore};
use clap::{Parser, Subcommand};
use tokio::sync::broadcast::{self, error::RecvError};
use tracing::{info, level_filters::LevelFilter, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(author, version, about = "Economic histories from strategy game saves")]
struct Cli {
  /// Path to the TOML configuration file.
  #[arg(short, long, default_value = "augur.toml")]
  config: PathBuf,

  /// Directory the game writes saves into.
  #[arg(long, global = true)]
  save_dir: Option<PathBuf>,

  /// Directory holding histories and ingestion state.
  #[arg(long, global = true)]
  data_dir: Option<PathBuf>,

  #[command(subcommand)]
  command: Command,
}

#[derive(Subcommand)]
enum Command {
  /// Ingest new saves as they appear, until Ctrl-C.
  Watch {
    /// auto, native or poll.
    #[arg(long)]
    watch_mode: Option<WatchMode>,
    #[arg(long)]
    settle_ms:  Option<u64>,
    /// Do not queue saves that already exist at startup.
    #[arg(long)]
    no_scan:    bool,
  },
  /// Ingest the saves already in the directory, then exit.
  Analyze,
  /// List stored playthroughs.
  Status {
    #[arg(long)]
    json: bool,
  },
  /// Parse one save and print its record as JSON.
  Extract { file: PathBuf },
  /// Forget which saves in the directory have been ingested.
  Reset,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
  tracing_subscriber::fmt()
    .with_env_filter(
      EnvFilter::builder()
        .with_default_directive(LevelFilter::INFO.into())
        .from_env_lossy(),
    )
    .init();

  let cli = Cli::parse();
  let mut config = load_config(&cli)?;

  match cli.command {
    Command::Watch { watch_mode, settle_ms, no_scan } => {
      if let Some(mode) = watch_mode {
        config.watch_mode = mode;
      }
      if let Some(ms) = settle_ms {
        config.settle_ms = ms;
      }
      if no_scan {
        config.scan_existing = false;
      }
      watch(config).await
    }
    Command::Analyze => {
      config.scan_existing = true;
      analyze(config).await
    }
    Command::Status { json } => status(config, json).await,
    Command::Extract { file } => extract(&config, &file),
    Command::Reset => reset(config).await,
  }
}

fn load_config(cli: &Cli) -> anyhow::Result<MonitorConfig> {
  let settings = config::Config::builder()
    .add_source(config::File::from(cli.config.clone()).required(false))
    .add_source(config::Environment::with_prefix("AUGUR"))
    .build()
    .context("failed to read config file")?;

  let mut config: MonitorConfig = settings
    .try_deserialize()
    .context("failed to deserialise MonitorConfig")?;

  if let Some(dir) = &cli.save_dir {
    config.save_dir = dir.clone();
  }
  if let Some(dir) = &cli.data_dir {
    config.data_dir = dir.clone();
  }
  config.save_dir = expand_tilde(&config.save_dir);
  config.data_dir = expand_tilde(&config.data_dir);
  Ok(config)
}

async fn open_stores(
  config: &MonitorConfig,
) -> anyhow::Result<(Arc<SqliteHistoryStore>, Arc<SqliteStateStore>)> {
  let history = SqliteHistoryStore::open(&config.data_dir)
    .await
    .with_context(|| format!("failed to open histories in {:?}", config.data_dir))?;
  let state = SqliteStateStore::open(&config.data_dir)
    .await
    .with_context(|| format!("failed to open state in {:?}", config.data_dir))?;
  Ok((Arc::new(history), Arc::new(state)))
}

// ─── Commands ────────────────────────────────────────────────────────────────

async fn watch(config: MonitorConfig) -> anyhow::Result<()> {
  let (history, state) = open_stores(&config).await?;
  let mut monitor = Monitor::new(config, history, state);
  let printer = tokio::spawn(print_events(monitor.subscribe()));

  monitor.start().await.context("failed to start monitor")?;
  let Some(token) = monitor.stop_token() else {
    anyhow::bail!("monitor did not start");
  };

  tokio::select! {
    signal = tokio::signal::ctrl_c() => {
      signal.context("failed to listen for Ctrl-C")?;
      info!("interrupt received");
    }
    _ = token.cancelled() => {}
  }

  let report = monitor.stop().await?;
  drop(monitor);
  printer.await.ok();
  finish(report)
}

async fn analyze(config: MonitorConfig) -> anyhow::Result<()> {
  let (history, state) = open_stores(&config).await?;
  let mut monitor = Monitor::new(config, history, state);
  let printer = tokio::spawn(print_events(monitor.subscribe()));

  monitor.start().await.context("failed to start monitor")?;
  let report = monitor.stop().await?;
  drop(monitor);
  printer.await.ok();
  finish(report)
}

async fn status(config: MonitorConfig, json: bool) -> anyhow::Result<()> {
  let (history, state) = open_stores(&config).await?;
  let directory = canonical(&config.save_dir).await;
  let ingestion = state.load_state(&directory).await?;
  let monitor = Monitor::new(config, history, state);
  let status = monitor.status().await?;

  if json {
    let out = serde_json::json!({
      "directory":    directory,
      "seen_files":   ingestion.seen_count(),
      "last_drained": ingestion.last_drained,
      "playthroughs": status.playthroughs,
    });
    println!("{}", serde_json::to_string_pretty(&out)?);
    return Ok(());
  }

  println!(
    "{}: {} files seen{}",
    directory.display(),
    ingestion.seen_count(),
    if ingestion.last_drained { "" } else { " (last run did not drain)" }
  );
  if status.playthroughs.is_empty() {
    println!("no playthroughs recorded");
  }
  for p in &status.playthroughs {
    println!(
      "{:<24} {:>6} records  {} .. {}",
      p.playthrough_id,
      p.records,
      p.first_date.as_deref().unwrap_or("-"),
      p.last_date.as_deref().unwrap_or("-"),
    );
  }
  Ok(())
}

fn extract(config: &MonitorConfig, file: &Path) -> anyhow::Result<()> {
  let bytes = std::fs::read(file).with_context(|| format!("failed to read {file:?}"))?;
  let decoder = default_decoder();
  let extractor = Extractor::new(config.crash_threshold);
  let fallback = filename_date(&playthrough::file_stem(file));
  let mut record = read_snapshot(&bytes, decoder.as_ref(), &extractor, fallback)
    .with_context(|| format!("failed to read snapshot {file:?}"))?;

  let content_name = Some(record.playthrough_id.as_str()).filter(|n| !n.is_empty());
  record.playthrough_id = playthrough::resolve(file, content_name).playthrough_id;
  println!("{}", serde_json::to_string_pretty(&record)?);
  Ok(())
}

async fn reset(config: MonitorConfig) -> anyhow::Result<()> {
  let (_, state) = open_stores(&config).await?;
  let directory = canonical(&config.save_dir).await;
  state.reset(&directory).await?;
  println!("forgot ingestion state for {}", directory.display());
  Ok(())
}

// ─── Output ──────────────────────────────────────────────────────────────────

async fn print_events(mut rx: broadcast::Receiver<MonitorEvent>) {
  loop {
    match rx.recv().await {
      Ok(MonitorEvent::Ingested { playthrough_id, date, counts, superseded, .. }) => {
        println!(
          "{playthrough_id} {date}: {} goods, {} crashes, {} countries{}",
          counts.goods,
          counts.price_crashes,
          counts.countries,
          if superseded { " (replaced)" } else { "" }
        );
      }
      Ok(MonitorEvent::Failed { path, stage, reason, .. }) => {
        println!("{}: {stage} failed: {reason}", path.display());
      }
      Ok(MonitorEvent::VisualizationRequested { playthroughs }) if !playthroughs.is_empty() => {
        println!("histories ready: {}", playthroughs.join(", "));
      }
      Ok(_) => {}
      Err(RecvError::Lagged(n)) => warn!(missed = n, "event printer fell behind"),
      Err(RecvError::Closed) => break,
    }
  }
}

fn finish(report: DrainReport) -> anyhow::Result<()> {
  let s = report.stats;
  println!(
    "{} ingested ({} replaced), {} duplicate, {} failed, {} skipped",
    s.processed, s.superseded, s.duplicates, s.failed, s.skipped
  );
  if !report.paused.is_empty() {
    println!(
      "paused after store errors, will retry next run: {}",
      report.paused.join(", ")
    );
  }
  if let Some(fault) = report.fault {
    anyhow::bail!("save directory became unavailable: {fault}");
  }
  Ok(())
}

/// The key the directory's ingestion state is stored under.
async fn canonical(dir: &Path) -> PathBuf {
  tokio::fs::canonicalize(dir)
    .await
    .unwrap_or_else(|_| dir.to_path_buf())
}

/// Expand a leading `~` to the user's home directory.
fn expand_tilde(path: &Path) -> PathBuf {
  let s = path.to_string_lossy();
  if let Some(rest) = s.strip_prefix("~/")
    && let Ok(home) = std::env::var("HOME")
  {
    return PathBuf::from(home).join(rest);
  }
  path.to_path_buf()
}
