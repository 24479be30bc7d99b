//! The streaming chunk controller.
//!
//! Pulls bounded batches from a source, normalises each one, and appends the
//! result before reading the next. Peak row memory is one chunk; the
//! normaliser's key maps are the only state that grows with the source.

use sightings_core::{
  key::{EventKey, PlaceKey},
  source::SourceAdapter,
  store::SightingStore,
};
use tracing::{debug, info};

use crate::{
  Error, Result,
  allocate::IdAllocator,
  normalize::{NormalizeStats, Normalizer},
  resolve::KeyMap,
};

/// Totals for one controller run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ChunkTotals {
  pub chunks: u64,
  pub stats:  NormalizeStats,
}

pub struct ChunkController<'s, S> {
  store:      &'s S,
  chunk_size: usize,
}

impl<'s, S: SightingStore> ChunkController<'s, S> {
  /// `chunk_size` must be positive.
  pub fn new(store: &'s S, chunk_size: usize) -> Result<Self> {
    if chunk_size == 0 {
      return Err(Error::InvalidProfile("chunk_size must be positive".into()));
    }
    Ok(Self { store, chunk_size })
  }

  /// Drain `source`. Each chunk's places are appended before its events and
  /// its events before its counts, so every reference written points at a row
  /// already in the store.
  pub async fn run<A, PM, EM>(
    &self,
    source: &mut A,
    normalizer: &mut Normalizer<'_, PM, EM>,
    ids: &mut IdAllocator,
  ) -> Result<ChunkTotals>
  where
    A: SourceAdapter,
    PM: KeyMap<PlaceKey>,
    EM: KeyMap<EventKey>,
  {
    let mut totals = ChunkTotals::default();

    while let Some(rows) = source.next_batch(self.chunk_size).map_err(Error::from_source)? {
      totals.chunks += 1;
      info!(chunk = totals.chunks, rows = rows.len(), "inserting chunk");

      let batch = normalizer.normalize(rows, ids)?;
      self.store.append_places(batch.places).await.map_err(Error::from_store)?;
      self.store.append_events(batch.events).await.map_err(Error::from_store)?;
      self.store.append_counts(batch.counts).await.map_err(Error::from_store)?;

      debug!(chunk = totals.chunks, stats = ?batch.stats, "chunk normalised");
      totals.stats += batch.stats;
    }

    Ok(totals)
  }
}
