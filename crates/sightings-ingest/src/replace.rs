//! Dataset replacement: clear everything one source owns before it is
//! loaded again.

use sightings_core::store::{ReplaceSummary, SightingStore};
use tracing::info;

use crate::{Error, Result};

/// Delete the dataset row and every place, event, and count it owns. With
/// `prune_taxa`, also drop taxa whose authority is gone and that nothing
/// counts any more.
///
/// The deletion commits as a unit. Loading afterwards is not atomic: a run
/// that fails part-way is repaired by calling this again and re-ingesting.
pub async fn replace<S: SightingStore>(
  store: &S,
  dataset_id: &str,
  prune_taxa: bool,
) -> Result<ReplaceSummary> {
  info!(dataset = %dataset_id, "deleting old records");
  let mut summary = store.delete_dataset(dataset_id).await.map_err(Error::from_store)?;

  if prune_taxa {
    summary.taxa = store.prune_orphan_taxa().await.map_err(Error::from_store)?;
  }

  info!(
    dataset = %dataset_id,
    places = summary.places,
    events = summary.events,
    counts = summary.counts,
    taxa = summary.taxa,
    "deleted old records"
  );
  Ok(summary)
}
