//! The `SightingStore` trait and supporting types.
//!
//! The trait is implemented by storage backends (e.g.
//! `sightings-store-sqlite`). The ingestion pipeline depends on this
//! abstraction, not on any concrete backend.

use std::{collections::HashMap, future::Future};

use serde::{Deserialize, Serialize};

use crate::model::{Count, Dataset, Event, Place, Table, Taxon, TaxonId};

// ─── Query types ─────────────────────────────────────────────────────────────

/// Which taxon attribute a source uses to name taxa.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TaxonKey {
  /// The scientific name column.
  #[default]
  SciName,
  /// A code stored under `name` in the taxon attribute blob (e.g. an AOU
  /// number or a banding species code).
  Code { name: String },
}

/// Rows removed by [`SightingStore::delete_dataset`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ReplaceSummary {
  pub datasets: u64,
  pub places:   u64,
  pub events:   u64,
  pub counts:   u64,
  /// Filled in by the replacement manager when taxon hygiene runs.
  pub taxa:     u64,
}

/// Row counts for one dataset.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RowCounts {
  pub places: u64,
  pub events: u64,
  pub counts: u64,
}

/// Dangling references among one dataset's rows.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct IntegrityReport {
  /// Events whose `place_id` is not in places.
  pub events_without_place: u64,
  /// Counts whose `event_id` is not in events.
  pub counts_without_event: u64,
  /// Counts whose `taxon_id` is not in taxa.
  pub counts_without_taxon: u64,
}

impl IntegrityReport {
  pub fn is_clean(&self) -> bool { *self == Self::default() }
}

// ─── Trait ───────────────────────────────────────────────────────────────────

/// Abstraction over the relational store the pipeline writes into.
///
/// A single writer is assumed for the whole ingestion run: nothing here
/// detects or prevents two processes appending to the same table.
///
/// All methods return `Send` futures so the trait can be driven from a
/// multi-threaded tokio runtime.
pub trait SightingStore: Send + Sync {
  type Error: std::error::Error + Send + Sync + 'static;

  // ── Scalars ───────────────────────────────────────────────────────────

  /// The largest surrogate id in `table`, or 0 when it is empty.
  fn max_id(&self, table: Table) -> impl Future<Output = Result<i64, Self::Error>> + Send + '_;

  // ── Datasets ──────────────────────────────────────────────────────────

  fn insert_dataset<'a>(
    &'a self,
    dataset: &'a Dataset,
  ) -> impl Future<Output = Result<(), Self::Error>> + Send + 'a;

  fn get_dataset<'a>(
    &'a self,
    dataset_id: &'a str,
  ) -> impl Future<Output = Result<Option<Dataset>, Self::Error>> + Send + 'a;

  /// Delete the dataset row and every place, event, and count it owns, by the
  /// owning `dataset_id` column.
  fn delete_dataset<'a>(
    &'a self,
    dataset_id: &'a str,
  ) -> impl Future<Output = Result<ReplaceSummary, Self::Error>> + Send + 'a;

  /// Delete taxa whose authority no longer has a dataset row and that no
  /// count references. Returns the number removed.
  fn prune_orphan_taxa(&self) -> impl Future<Output = Result<u64, Self::Error>> + Send + '_;

  // ── Bulk appends ──────────────────────────────────────────────────────

  fn append_taxa(
    &self,
    rows: Vec<Taxon>,
  ) -> impl Future<Output = Result<usize, Self::Error>> + Send + '_;

  fn append_places(
    &self,
    rows: Vec<Place>,
  ) -> impl Future<Output = Result<usize, Self::Error>> + Send + '_;

  fn append_events(
    &self,
    rows: Vec<Event>,
  ) -> impl Future<Output = Result<usize, Self::Error>> + Send + '_;

  fn append_counts(
    &self,
    rows: Vec<Count>,
  ) -> impl Future<Output = Result<usize, Self::Error>> + Send + '_;

  // ── Lookups ───────────────────────────────────────────────────────────

  /// Map from the chosen taxon key to `taxon_id`. Taxa without a value for
  /// the key are left out.
  fn taxon_index<'a>(
    &'a self,
    key: &'a TaxonKey,
    targets_only: bool,
  ) -> impl Future<Output = Result<HashMap<String, TaxonId>, Self::Error>> + Send + 'a;

  // ── Bulk-load window ──────────────────────────────────────────────────

  /// Drop the secondary (coordinate and date) indexes and relax write-time
  /// checks ahead of a large insert.
  fn suspend_indexes(&self) -> impl Future<Output = Result<(), Self::Error>> + Send + '_;

  /// Rebuild everything [`suspend_indexes`](Self::suspend_indexes) removed.
  /// Safe to call when nothing is suspended.
  fn restore_indexes(&self) -> impl Future<Output = Result<(), Self::Error>> + Send + '_;

  // ── Reads ─────────────────────────────────────────────────────────────

  fn taxa(&self) -> impl Future<Output = Result<Vec<Taxon>, Self::Error>> + Send + '_;

  fn places<'a>(
    &'a self,
    dataset_id: &'a str,
  ) -> impl Future<Output = Result<Vec<Place>, Self::Error>> + Send + 'a;

  fn events<'a>(
    &'a self,
    dataset_id: &'a str,
  ) -> impl Future<Output = Result<Vec<Event>, Self::Error>> + Send + 'a;

  fn counts<'a>(
    &'a self,
    dataset_id: &'a str,
  ) -> impl Future<Output = Result<Vec<Count>, Self::Error>> + Send + 'a;

  fn row_counts<'a>(
    &'a self,
    dataset_id: &'a str,
  ) -> impl Future<Output = Result<RowCounts, Self::Error>> + Send + 'a;

  fn integrity<'a>(
    &'a self,
    dataset_id: &'a str,
  ) -> impl Future<Output = Result<IntegrityReport, Self::Error>> + Send + 'a;
}
