//! Natural-key resolution.
//!
//! A [`KeyResolver`] remembers, for one table and one run, which surrogate id
//! each natural key received. It never asks the store: the secondary indexes
//! that would make such a lookup cheap are dropped during bulk loads.
//!
//! The map grows with the number of distinct keys in the source and is never
//! evicted. The backing map is a type parameter so a larger-than-memory map
//! can be substituted without touching callers.

use std::{
  collections::{BTreeMap, HashMap},
  hash::Hash,
  marker::PhantomData,
};

use sightings_core::model::Table;

use crate::{Result, allocate::IdAllocator};

// ─── Backing map ─────────────────────────────────────────────────────────────

/// Storage for natural key → surrogate id.
pub trait KeyMap<K> {
  fn lookup(&self, key: &K) -> Option<i64>;
  fn remember(&mut self, key: K, id: i64);
  fn len(&self) -> usize;
}

impl<K: Eq + Hash> KeyMap<K> for HashMap<K, i64> {
  fn lookup(&self, key: &K) -> Option<i64> { self.get(key).copied() }

  fn remember(&mut self, key: K, id: i64) { self.insert(key, id); }

  fn len(&self) -> usize { HashMap::len(self) }
}

impl<K: Ord> KeyMap<K> for BTreeMap<K, i64> {
  fn lookup(&self, key: &K) -> Option<i64> { self.get(key).copied() }

  fn remember(&mut self, key: K, id: i64) { self.insert(key, id); }

  fn len(&self) -> usize { BTreeMap::len(self) }
}

// ─── Resolver ────────────────────────────────────────────────────────────────

/// Result of [`KeyResolver::resolve_or_create`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resolution {
  /// The key was seen earlier in this run.
  Existing(i64),
  /// The key is new; the caller must emit a row with this id.
  Created(i64),
}

impl Resolution {
  pub fn id(self) -> i64 {
    match self {
      Self::Existing(id) | Self::Created(id) => id,
    }
  }

  pub fn is_created(self) -> bool { matches!(self, Self::Created(_)) }
}

pub struct KeyResolver<K, M = HashMap<K, i64>> {
  table: Table,
  map:   M,
  _key:  PhantomData<fn(K)>,
}

impl<K, M: KeyMap<K> + Default> KeyResolver<K, M> {
  pub fn new(table: Table) -> Self { Self::with_map(table, M::default()) }
}

impl<K, M: KeyMap<K>> KeyResolver<K, M> {
  pub fn with_map(table: Table, map: M) -> Self { Self { table, map, _key: PhantomData } }

  pub fn table(&self) -> Table { self.table }

  /// The id already assigned to `key`, if any.
  pub fn resolve(&self, key: &K) -> Option<i64> { self.map.lookup(key) }

  /// Return the id for `key`, allocating one id from `ids` on first sight.
  pub fn resolve_or_create(&mut self, key: K, ids: &mut IdAllocator) -> Result<Resolution> {
    if let Some(id) = self.map.lookup(&key) {
      return Ok(Resolution::Existing(id));
    }
    let id = ids.allocate(self.table, 1)?;
    self.map.remember(key, id);
    Ok(Resolution::Created(id))
  }

  /// Number of distinct keys seen so far.
  pub fn len(&self) -> usize { self.map.len() }

  pub fn is_empty(&self) -> bool { self.len() == 0 }
}

#[cfg(test)]
mod tests {
  use sightings_core::key::PlaceKey;

  use super::*;

  #[test]
  fn equal_keys_share_one_id() {
    let mut ids = IdAllocator::with_next([(Table::Places, 10)]);
    let mut places: KeyResolver<PlaceKey> = KeyResolver::new(Table::Places);

    let a = places.resolve_or_create(PlaceKey::coordinates(-85.0, 34.0), &mut ids).unwrap();
    let b = places.resolve_or_create(PlaceKey::coordinates(-84.0, 34.0), &mut ids).unwrap();
    let c = places.resolve_or_create(PlaceKey::coordinates(-85.0, 34.0), &mut ids).unwrap();

    assert_eq!(a, Resolution::Created(10));
    assert_eq!(b, Resolution::Created(11));
    assert_eq!(c, Resolution::Existing(10));
    assert_eq!(places.len(), 2);
    assert_eq!(ids.peek(Table::Places), 12);
  }

  #[test]
  fn ordered_backing_map_behaves_the_same() {
    let mut ids = IdAllocator::default();
    let mut codes: KeyResolver<String, BTreeMap<String, i64>> = KeyResolver::new(Table::Places);

    let first = codes.resolve_or_create("MAPS-0101".into(), &mut ids).unwrap();
    assert!(first.is_created());
    assert_eq!(codes.resolve(&"MAPS-0101".to_string()), Some(first.id()));
    assert_eq!(codes.resolve(&"MAPS-0102".to_string()), None);
  }
}
