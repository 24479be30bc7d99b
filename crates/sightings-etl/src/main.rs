//! `sightings` command-line binary.
//!
//! Reads `sightings.toml` (or the path given with `--config`), opens the
//! SQLite store, and replaces or reloads the configured sources.
//!
//! ```text
//! sightings init
//! sightings ingest-all
//! sightings ingest ebird maps
//! sightings audit ebird
//! sightings export ebird --dir out/
//! ```

use std::path::PathBuf;

use anyhow::{Context as _, bail};
use clap::{Parser, Subcommand};
use sightings_etl::{EntryReport, EtlConfig, export::export_dataset, ingest_all, ingest_entries};
use sightings_ingest::Pipeline;
use sightings_store_sqlite::SqliteStore;
use tracing::level_filters::LevelFilter;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(author, version, about = "Normalise sighting datasets into one SQLite store")]
struct Cli {
  /// Path to the TOML configuration file.
  #[arg(short, long, default_value = "sightings.toml")]
  config: PathBuf,

  #[command(subcommand)]
  command: Command,
}

#[derive(Subcommand)]
enum Command {
  /// Create the store and its schema, then exit.
  Init,
  /// Replace and reload the named datasets.
  Ingest {
    #[arg(required = true)]
    ids: Vec<String>,
  },
  /// Replace and reload every configured source, taxonomies first.
  IngestAll,
  /// Check a dataset for dangling references.
  Audit { id: String },
  /// Write a dataset's places, events, and counts as CSV files.
  Export {
    id:  String,
    /// Defaults to `export_dir` from the configuration.
    #[arg(long)]
    dir: Option<PathBuf>,
  },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
  // Initialise tracing.
  tracing_subscriber::fmt()
    .with_env_filter(
      EnvFilter::builder()
        .with_default_directive(LevelFilter::INFO.into())
        .from_env_lossy(),
    )
    .init();

  let cli = Cli::parse();
  let cfg = EtlConfig::load(&cli.config)?;

  let store_path = cfg.resolve(&cfg.store_path);
  let store = SqliteStore::open(&store_path)
    .await
    .with_context(|| format!("failed to open store at {store_path:?}"))?;
  let pipeline = Pipeline::new(store, cfg.pipeline_options());

  match cli.command {
    Command::Init => {
      tracing::info!(path = %store_path.display(), "store ready");
    }
    Command::Ingest { ids } => {
      let entries = cfg.select(&ids)?;
      report(&ingest_entries(&pipeline, &cfg, &entries).await?);
    }
    Command::IngestAll => {
      report(&ingest_all(&pipeline, &cfg).await?);
    }
    Command::Audit { id } => {
      let integrity = pipeline.audit(&id).await?;
      if !integrity.is_clean() {
        bail!("dataset {id:?} has dangling references: {integrity:?}");
      }
      println!("{id}: clean");
    }
    Command::Export { id, dir } => {
      let dir = dir.map_or_else(|| cfg.resolve(&cfg.export_dir), |d| sightings_etl::expand_tilde(&d));
      let summary = export_dataset(pipeline.store(), &id, &dir).await?;
      println!(
        "{id}: {} places, {} events, {} counts -> {}",
        summary.places,
        summary.events,
        summary.counts,
        summary.dir.display()
      );
    }
  }

  Ok(())
}

fn report(reports: &[EntryReport]) {
  for r in reports {
    match r {
      EntryReport::Taxonomy { dataset_id, taxa, .. } => println!(
        "{dataset_id}: {} taxa added, {} already present, {} genus records",
        taxa.added, taxa.skipped, taxa.genera
      ),
      EntryReport::Dataset { ingest, replaced, skipped_records } => println!(
        "{}: {} rows, {} places, {} events, {} counts, {} dropped, {} unreadable ({} counts replaced)",
        ingest.dataset_id,
        ingest.stats.rows,
        ingest.stats.places,
        ingest.stats.events,
        ingest.stats.counts,
        ingest.stats.dropped(),
        skipped_records,
        replaced.counts
      ),
    }
  }
}
