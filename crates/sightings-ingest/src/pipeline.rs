//! The per-dataset ingestion entry points.

use chrono::Utc;
use serde::Serialize;
use sightings_core::{
  source::SourceAdapter,
  store::{IntegrityReport, ReplaceSummary, SightingStore},
};
use tracing::{info, warn};

use crate::{
  Error, Result,
  allocate::IdAllocator,
  bulk::BulkLoadWindow,
  chunk::ChunkController,
  normalize::{NormalizeStats, Normalizer},
  profile::DatasetProfile,
  replace,
  taxa::{self, TaxaReport, TaxonomyProfile},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PipelineOptions {
  /// Rows pulled from a source per batch.
  pub chunk_size: usize,
  /// Drop unreferenced taxa of vanished authorities during replacement.
  pub prune_taxa: bool,
}

impl Default for PipelineOptions {
  fn default() -> Self { Self { chunk_size: 100_000, prune_taxa: true } }
}

/// Outcome of one [`Pipeline::ingest`] call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IngestReport {
  pub dataset_id: String,
  pub chunks:     u64,
  pub stats:      NormalizeStats,
}

/// Runs replacement and ingestion against one store.
///
/// Callers replace and ingest datasets one at a time, taxonomies before the
/// observation sources that reference them.
pub struct Pipeline<S> {
  store:   S,
  options: PipelineOptions,
}

impl<S: SightingStore> Pipeline<S> {
  pub fn new(store: S, options: PipelineOptions) -> Self { Self { store, options } }

  pub fn store(&self) -> &S { &self.store }

  pub fn options(&self) -> PipelineOptions { self.options }

  /// Delete everything `dataset_id` owns.
  pub async fn replace(&self, dataset_id: &str) -> Result<ReplaceSummary> {
    replace::replace(&self.store, dataset_id, self.options.prune_taxa).await
  }

  /// Load one observation source. The dataset must have been replaced (or
  /// never loaded) first.
  ///
  /// The bulk-load window is closed whether or not the load succeeds.
  pub async fn ingest<A: SourceAdapter>(
    &self,
    profile: &DatasetProfile,
    source: &mut A,
  ) -> Result<IngestReport> {
    let controller = ChunkController::new(&self.store, self.options.chunk_size)?;
    let dataset_id = profile.dataset_id();

    let taxa = self
      .store
      .taxon_index(&profile.taxon.key, profile.taxon.targets_only)
      .await
      .map_err(Error::from_store)?;
    let mut normalizer = Normalizer::new(profile, taxa)?;

    let mut dataset = profile.dataset.clone();
    dataset.extracted = Some(Utc::now());
    info!(dataset = %dataset_id, "inserting dataset record");
    self.store.insert_dataset(&dataset).await.map_err(Error::from_store)?;

    let mut ids = IdAllocator::seed(&self.store).await?;

    let window = BulkLoadWindow::begin(&self.store).await?;
    let outcome = controller.run(source, &mut normalizer, &mut ids).await;
    let restored = window.end().await;
    let totals = outcome?;
    restored?;

    let stats = totals.stats;
    if stats.missing_taxon > 0 {
      warn!(
        dataset = %dataset_id,
        rows = stats.missing_taxon,
        "rows dropped because their taxon is not in the store"
      );
    }
    info!(
      dataset = %dataset_id,
      rows = stats.rows,
      places = stats.places,
      events = stats.events,
      counts = stats.counts,
      dropped = stats.dropped(),
      "ingest finished"
    );

    Ok(IngestReport { dataset_id: dataset_id.to_owned(), chunks: totals.chunks, stats })
  }

  /// Load a taxonomy source.
  pub async fn load_taxonomy<A: SourceAdapter>(
    &self,
    profile: &TaxonomyProfile,
    source: &mut A,
  ) -> Result<TaxaReport> {
    taxa::load_taxa(&self.store, profile, source, self.options.chunk_size).await
  }

  /// Dangling references among `dataset_id`'s rows.
  pub async fn audit(&self, dataset_id: &str) -> Result<IntegrityReport> {
    let report = self.store.integrity(dataset_id).await.map_err(Error::from_store)?;
    if report.is_clean() {
      info!(dataset = %dataset_id, "integrity check passed");
    } else {
      warn!(dataset = %dataset_id, report = ?report, "integrity check found dangling references");
    }
    Ok(report)
  }
}
