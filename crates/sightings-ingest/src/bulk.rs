//! The bulk-load window.
//!
//! While open, the store's coordinate and date indexes are gone and
//! write-time checks are relaxed. Nothing in the pipeline queries the store
//! for natural keys during the window; resolution is purely in memory.

use sightings_core::store::SightingStore;
use tracing::{info, warn};

use crate::{Error, Result};

/// An open bulk-load window. Close it with [`end`](Self::end).
///
/// Dropping the guard without calling `end` cannot restore anything (the
/// restore is async); it only logs. Calling
/// [`SightingStore::restore_indexes`] later repairs the store.
#[must_use = "the window must be closed with `end`"]
pub struct BulkLoadWindow<'s, S: SightingStore> {
  store: &'s S,
  open:  bool,
}

impl<'s, S: SightingStore> BulkLoadWindow<'s, S> {
  pub async fn begin(store: &'s S) -> Result<Self> {
    info!("dropping secondary indexes");
    store.suspend_indexes().await.map_err(Error::from_store)?;
    Ok(Self { store, open: true })
  }

  pub async fn end(mut self) -> Result<()> {
    self.open = false;
    info!("restoring secondary indexes");
    self.store.restore_indexes().await.map_err(Error::from_store)
  }
}

impl<S: SightingStore> Drop for BulkLoadWindow<'_, S> {
  fn drop(&mut self) {
    if self.open {
      warn!("bulk load window dropped while open; secondary indexes are still suspended");
    }
  }
}
