//! File-driven orchestration for the sightings pipeline.
//!
//! Reads the source list from [`EtlConfig`], opens each file with a
//! [`DelimitedSource`], and replaces then reloads one dataset at a time.

pub mod config;
pub mod delimited;
pub mod export;

pub use crate::config::{EtlConfig, expand_tilde};
pub use crate::delimited::DelimitedSource;

use anyhow::Context as _;
use sightings_core::store::{ReplaceSummary, SightingStore};
use sightings_ingest::{IngestReport, Pipeline, taxa::TaxaReport};
use tracing::{info, warn};

use crate::config::Entry;

// ─── Reports ─────────────────────────────────────────────────────────────────

/// What one configured source did to the store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EntryReport {
  Taxonomy {
    dataset_id: String,
    replaced:   ReplaceSummary,
    taxa:       TaxaReport,
  },
  Dataset {
    replaced:        ReplaceSummary,
    ingest:          IngestReport,
    /// Records the reader could not decode.
    skipped_records: u64,
  },
}

impl EntryReport {
  pub fn dataset_id(&self) -> &str {
    match self {
      Self::Taxonomy { dataset_id, .. } => dataset_id,
      Self::Dataset { ingest, .. } => &ingest.dataset_id,
    }
  }
}

// ─── Orchestration ───────────────────────────────────────────────────────────

/// Replace and reload one configured source.
pub async fn ingest_entry<S: SightingStore>(
  pipeline: &Pipeline<S>,
  cfg: &EtlConfig,
  entry: Entry<'_>,
) -> anyhow::Result<EntryReport> {
  let dataset_id = entry.dataset_id();
  let path = cfg.resolve(&entry.source().path);
  let mut source = DelimitedSource::open(&path, entry.source())
    .with_context(|| format!("failed to open {}", path.display()))?;

  info!(dataset = %dataset_id, path = %path.display(), "loading source");
  let replaced = pipeline
    .replace(dataset_id)
    .await
    .with_context(|| format!("failed to replace dataset {dataset_id:?}"))?;

  let report = match entry {
    Entry::Taxonomy(t) => {
      let taxa = pipeline
        .load_taxonomy(&t.profile, &mut source)
        .await
        .with_context(|| format!("failed to load taxonomy {dataset_id:?}"))?;
      EntryReport::Taxonomy { dataset_id: dataset_id.to_owned(), replaced, taxa }
    }
    Entry::Dataset(d) => {
      let ingest = pipeline
        .ingest(&d.profile, &mut source)
        .await
        .with_context(|| format!("failed to ingest dataset {dataset_id:?}"))?;
      EntryReport::Dataset { replaced, ingest, skipped_records: source.skipped() }
    }
  };

  if source.skipped() > 0 {
    warn!(
      dataset = %dataset_id,
      records = source.skipped(),
      "records skipped for invalid encoding"
    );
  }
  Ok(report)
}

/// Load `entries` in order, stopping at the first failure.
pub async fn ingest_entries<S: SightingStore>(
  pipeline: &Pipeline<S>,
  cfg: &EtlConfig,
  entries: &[Entry<'_>],
) -> anyhow::Result<Vec<EntryReport>> {
  let mut reports = Vec::with_capacity(entries.len());
  for entry in entries {
    reports.push(ingest_entry(pipeline, cfg, *entry).await?);
  }
  Ok(reports)
}

/// Load every configured source: taxonomies first, then datasets.
pub async fn ingest_all<S: SightingStore>(
  pipeline: &Pipeline<S>,
  cfg: &EtlConfig,
) -> anyhow::Result<Vec<EntryReport>> {
  let entries: Vec<Entry<'_>> = cfg.entries().collect();
  ingest_entries(pipeline, cfg, &entries).await
}

#[cfg(test)]
mod tests;
