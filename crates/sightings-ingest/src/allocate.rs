//! Surrogate id allocation.
//!
//! Each entity table has one counter, seeded from `MAX(id) + 1` when the run
//! starts and advanced in memory afterwards. There is no sequence object and
//! no locking: a single process must own ingestion for the whole run.

use std::collections::HashMap;

use sightings_core::{model::Table, store::SightingStore};

use crate::{Error, Result};

/// Hands out contiguous, never-reused id ranges per table for one run.
///
/// # Single writer
///
/// Two allocators seeded from the same store will issue the same ids. Only
/// one ingestion process may write a given store at a time.
#[derive(Debug, Clone, Default)]
pub struct IdAllocator {
  next: HashMap<Table, i64>,
}

impl IdAllocator {
  /// Read the current maximum id of every table once.
  pub async fn seed<S: SightingStore>(store: &S) -> Result<Self> {
    let mut next = HashMap::with_capacity(Table::ALL.len());
    for table in Table::ALL {
      let max = store.max_id(table).await.map_err(Error::from_store)?;
      let first = max.max(0).checked_add(1).ok_or(Error::IdOverflow(table))?;
      next.insert(table, first);
    }
    Ok(Self { next })
  }

  /// An allocator with explicit starting points. Tables not listed start
  /// at 1.
  pub fn with_next(next: impl IntoIterator<Item = (Table, i64)>) -> Self {
    Self { next: next.into_iter().collect() }
  }

  /// The id the next allocation in `table` will start at.
  pub fn peek(&self, table: Table) -> i64 { self.next.get(&table).copied().unwrap_or(1) }

  /// Reserve `count` ids in `table` and return the first. The range
  /// `[start, start + count)` is never handed out again by this allocator.
  pub fn allocate(&mut self, table: Table, count: usize) -> Result<i64> {
    let start = self.peek(table);
    let end = i64::try_from(count)
      .ok()
      .and_then(|n| start.checked_add(n))
      .ok_or(Error::IdOverflow(table))?;
    self.next.insert(table, end);
    Ok(start)
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn ranges_are_contiguous_and_disjoint() {
    let mut ids = IdAllocator::with_next([(Table::Counts, 41)]);
    assert_eq!(ids.allocate(Table::Counts, 3).unwrap(), 41);
    assert_eq!(ids.allocate(Table::Counts, 2).unwrap(), 44);
    assert_eq!(ids.peek(Table::Counts), 46);
  }

  #[test]
  fn tables_are_independent() {
    let mut ids = IdAllocator::default();
    assert_eq!(ids.allocate(Table::Places, 1).unwrap(), 1);
    assert_eq!(ids.allocate(Table::Events, 1).unwrap(), 1);
    assert_eq!(ids.allocate(Table::Places, 1).unwrap(), 2);
  }

  #[test]
  fn empty_allocation_does_not_advance() {
    let mut ids = IdAllocator::default();
    assert_eq!(ids.allocate(Table::Taxa, 0).unwrap(), 1);
    assert_eq!(ids.allocate(Table::Taxa, 1).unwrap(), 1);
  }

  #[test]
  fn overflow_is_reported() {
    let mut ids = IdAllocator::with_next([(Table::Events, i64::MAX)]);
    assert!(matches!(
      ids.allocate(Table::Events, 1),
      Err(Error::IdOverflow(Table::Events))
    ));
  }
}
