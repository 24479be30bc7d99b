//! The entity normaliser: raw rows in, canonical place/event/count rows out.
//!
//! A [`Normalizer`] lives for one ingestion run. Its place and event resolvers
//! carry natural-key state from chunk to chunk, so splitting a source into
//! batches of any size yields the same canonical rows.

use std::{collections::HashMap, ops::AddAssign};

use serde::Serialize;
use sightings_core::{
  key::{EventKey, PlaceKey},
  model::{Count, Event, Place, Table, TaxonId},
  source::RawRow,
};

use crate::{
  Result,
  allocate::IdAllocator,
  profile::{AttrTarget, DatasetProfile, Routing},
  resolve::{KeyMap, KeyResolver, Resolution},
};

// ─── Output ──────────────────────────────────────────────────────────────────

/// Per-batch (or per-run, when summed) counters. Dropped rows are only
/// counted, never logged one by one.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct NormalizeStats {
  pub rows:            u64,
  pub filtered:        u64,
  pub bad_coordinates: u64,
  pub out_of_bounds:   u64,
  pub bad_date:        u64,
  pub bad_count:       u64,
  pub missing_key:     u64,
  pub missing_taxon:   u64,
  pub places:          u64,
  pub events:          u64,
  pub counts:          u64,
}

impl NormalizeStats {
  /// Rows that produced no count.
  pub fn dropped(&self) -> u64 {
    self.filtered
      + self.bad_coordinates
      + self.out_of_bounds
      + self.bad_date
      + self.bad_count
      + self.missing_key
      + self.missing_taxon
  }

  fn record(&mut self, reason: Rejection) {
    let slot = match reason {
      Rejection::Filtered => &mut self.filtered,
      Rejection::BadCoordinates => &mut self.bad_coordinates,
      Rejection::OutOfBounds => &mut self.out_of_bounds,
      Rejection::BadDate => &mut self.bad_date,
      Rejection::BadCount => &mut self.bad_count,
      Rejection::MissingKey => &mut self.missing_key,
      Rejection::MissingTaxon => &mut self.missing_taxon,
    };
    *slot += 1;
  }
}

impl AddAssign for NormalizeStats {
  fn add_assign(&mut self, o: Self) {
    self.rows += o.rows;
    self.filtered += o.filtered;
    self.bad_coordinates += o.bad_coordinates;
    self.out_of_bounds += o.out_of_bounds;
    self.bad_date += o.bad_date;
    self.bad_count += o.bad_count;
    self.missing_key += o.missing_key;
    self.missing_taxon += o.missing_taxon;
    self.places += o.places;
    self.events += o.events;
    self.counts += o.counts;
  }
}

/// New rows produced from one batch. Places and events only appear the first
/// time their natural key is seen in the run.
#[derive(Debug, Clone, Default)]
pub struct NormalizedBatch {
  pub places: Vec<Place>,
  pub events: Vec<Event>,
  pub counts: Vec<Count>,
  pub stats:  NormalizeStats,
}

#[derive(Debug, Clone, Copy)]
enum Rejection {
  Filtered,
  BadCoordinates,
  OutOfBounds,
  BadDate,
  BadCount,
  MissingKey,
  MissingTaxon,
}

// ─── Normalizer ──────────────────────────────────────────────────────────────

/// Place and event keys are held in `PM` and `EM`; any [`KeyMap`] works.
pub struct Normalizer<'p, PM = HashMap<PlaceKey, i64>, EM = HashMap<EventKey, i64>> {
  profile: &'p DatasetProfile,
  routing: Routing,
  taxa:    HashMap<String, TaxonId>,
  places:  KeyResolver<PlaceKey, PM>,
  events:  KeyResolver<EventKey, EM>,
}

impl<'p> Normalizer<'p> {
  /// `taxa` maps the profile's taxon key to `taxon_id`.
  pub fn new(profile: &'p DatasetProfile, taxa: HashMap<String, TaxonId>) -> Result<Self> {
    Self::with_maps(profile, taxa, HashMap::new(), HashMap::new())
  }
}

impl<'p, PM: KeyMap<PlaceKey>, EM: KeyMap<EventKey>> Normalizer<'p, PM, EM> {
  /// Like [`new`](Normalizer::new), with caller-supplied key maps.
  pub fn with_maps(
    profile: &'p DatasetProfile,
    taxa: HashMap<String, TaxonId>,
    places: PM,
    events: EM,
  ) -> Result<Self> {
    profile.validate()?;
    Ok(Self {
      routing: Routing::new(profile),
      profile,
      taxa,
      places: KeyResolver::with_map(Table::Places, places),
      events: KeyResolver::with_map(Table::Events, events),
    })
  }

  /// Distinct places seen so far in this run.
  pub fn places_seen(&self) -> usize { self.places.len() }

  /// Distinct events seen so far in this run.
  pub fn events_seen(&self) -> usize { self.events.len() }

  /// Normalise one batch. New place and event ids are drawn one at a time as
  /// keys are first seen; the batch's counts share one contiguous range.
  pub fn normalize(&mut self, rows: Vec<RawRow>, ids: &mut IdAllocator) -> Result<NormalizedBatch> {
    let mut batch = NormalizedBatch::default();
    let mut pending = Vec::new();

    for row in &rows {
      batch.stats.rows += 1;
      match self.normalize_row(row, ids, &mut batch)? {
        Ok(count) => pending.push(count),
        Err(reason) => batch.stats.record(reason),
      }
    }

    if !pending.is_empty() {
      let start = ids.allocate(Table::Counts, pending.len())?;
      for (count_id, mut count) in (start..).zip(pending) {
        count.count_id = count_id;
        batch.counts.push(count);
      }
    }

    batch.stats.places = batch.places.len() as u64;
    batch.stats.events = batch.events.len() as u64;
    batch.stats.counts = batch.counts.len() as u64;
    Ok(batch)
  }

  /// The outer `Result` aborts the run; the inner one drops the row.
  fn normalize_row(
    &mut self,
    row: &RawRow,
    ids: &mut IdAllocator,
    batch: &mut NormalizedBatch,
  ) -> Result<Result<Count, Rejection>> {
    let p = self.profile;
    let dataset_id = p.dataset_id();

    if !p.require.iter().all(|r| r.matches(row)) {
      return Ok(Err(Rejection::Filtered));
    }

    let coord = |field: &str| row.value(field).and_then(crate::coerce::parse_number);
    let (Some(lng), Some(lat)) = (coord(&p.place.lng), coord(&p.place.lat)) else {
      return Ok(Err(Rejection::BadCoordinates));
    };
    if !p.bbox.contains(lng, lat) {
      return Ok(Err(Rejection::OutOfBounds));
    }

    let Some((year, day)) = p.event.date.year_and_day(row) else {
      return Ok(Err(Rejection::BadDate));
    };
    let Some(tally) = p.count.tally(row) else {
      return Ok(Err(Rejection::BadCount));
    };

    let radius = p.place.radius.radius(row);
    let Some(place_key) = p.place.key.key(row, lng, lat, radius) else {
      return Ok(Err(Rejection::MissingKey));
    };
    let Some(event_key) = p.event.key.key(row, &place_key, year, day) else {
      return Ok(Err(Rejection::MissingKey));
    };

    // A known event already has its place; only a new event may add one.
    let event_id = match self.events.resolve(&event_key) {
      Some(id) => id,
      None => {
        let place_id = match self.places.resolve_or_create(place_key, ids)? {
          Resolution::Existing(id) => id,
          Resolution::Created(id) => {
            batch.places.push(Place {
              place_id: id,
              dataset_id: dataset_id.to_owned(),
              lng,
              lat,
              radius,
              attrs: self.routing.attrs(row, AttrTarget::Place, dataset_id),
            });
            id
          }
        };

        let id = self.events.resolve_or_create(event_key, ids)?.id();
        let (started, ended) = p.event.times(row);
        batch.events.push(Event {
          event_id: id,
          place_id,
          dataset_id: dataset_id.to_owned(),
          year,
          day,
          started,
          ended,
          attrs: self.routing.attrs(row, AttrTarget::Event, dataset_id),
        });
        id
      }
    };

    // The place and event stay even when the taxon is unknown; another row
    // may report a known taxon for the same event.
    let Some(taxon_id) = p.taxon.name(row).and_then(|n| self.taxa.get(&n).copied()) else {
      return Ok(Err(Rejection::MissingTaxon));
    };

    Ok(Ok(Count {
      count_id: 0,
      event_id,
      taxon_id,
      dataset_id: dataset_id.to_owned(),
      count: tally,
      attrs: self.routing.attrs(row, AttrTarget::Count, dataset_id),
    }))
  }
}

#[cfg(test)]
mod tests {
  use sightings_core::{
    model::{Dataset, Tally},
    store::TaxonKey,
  };

  use std::collections::BTreeMap;

  use super::*;
  use crate::profile::{
    BoundingBox, CountRule, DateRule, EventKeyRule, EventRule, PlaceKeyRule, PlaceRule,
    RadiusRule, TaxonRule,
  };

  fn profile() -> DatasetProfile {
    DatasetProfile {
      dataset: Dataset::new("checklists"),
      bbox:    BoundingBox { min_lng: -95.0, max_lng: -50.0, min_lat: 20.0, max_lat: 90.0 },
      require: vec![],
      place:   PlaceRule {
        lng:    "LONGITUDE".into(),
        lat:    "LATITUDE".into(),
        radius: RadiusRule::Exact,
        key:    PlaceKeyRule::Coordinates,
        attrs:  vec!["LOCALITY".into()],
      },
      event:   EventRule {
        date:             DateRule::field("DATE"),
        started:          Some("TIME".into()),
        ended:            None,
        duration_minutes: None,
        key:              EventKeyRule::default(),
        attrs:            vec![],
      },
      count:   CountRule {
        field:           Some("COUNT".into()),
        default:         None,
        present_markers: vec!["X".into()],
      },
      taxon:   TaxonRule {
        fields:       vec!["SCI".into()],
        key:          TaxonKey::SciName,
        targets_only: false,
      },
    }
  }

  fn taxa() -> HashMap<String, TaxonId> { [("Turdus migratorius".to_string(), 7)].into_iter().collect() }

  fn row(lng: &str, lat: &str, date: &str, count: &str, sci: &str) -> RawRow {
    [
      ("LONGITUDE", lng),
      ("LATITUDE", lat),
      ("DATE", date),
      ("COUNT", count),
      ("SCI", sci),
      ("LOCALITY", "Pond"),
      ("OBSERVER", "obs1"),
    ]
    .into_iter()
    .collect()
  }

  #[test]
  fn one_place_two_events() {
    let profile = profile();
    let mut n = Normalizer::new(&profile, taxa()).unwrap();
    let mut ids = IdAllocator::default();

    let batch = n
      .normalize(
        vec![
          row("-85.0", "34.0", "2020-01-01", "2", "Turdus migratorius"),
          row("-85.0", "34.0", "2020-06-01", "X", "Turdus migratorius"),
        ],
        &mut ids,
      )
      .unwrap();

    assert_eq!(batch.places.len(), 1);
    let place = &batch.places[0];
    assert_eq!((place.lng, place.lat), (-85.0, 34.0));

    let days: Vec<u32> = batch.events.iter().map(|e| e.day).collect();
    assert_eq!(days, vec![1, 153]);
    assert!(batch.events.iter().all(|e| e.place_id == place.place_id));

    let tallies: Vec<Tally> = batch.counts.iter().map(|c| c.count).collect();
    assert_eq!(tallies, vec![Tally::Counted(2), Tally::Present]);
    assert_eq!(batch.counts[0].count_id + 1, batch.counts[1].count_id);
  }

  #[test]
  fn attrs_are_routed_and_tagged() {
    let profile = profile();
    let mut n = Normalizer::new(&profile, taxa()).unwrap();
    let batch = n
      .normalize(
        vec![row("-85.0", "34.0", "2020-01-01", "2", "Turdus migratorius")],
        &mut IdAllocator::default(),
      )
      .unwrap();

    let place_attrs = &batch.places[0].attrs;
    assert_eq!(place_attrs.get("LOCALITY").map(ToString::to_string), Some("Pond".into()));
    assert_eq!(place_attrs.dataset_id(), Some("checklists"));
    assert!(!place_attrs.contains_key("OBSERVER"));

    let count_attrs = &batch.counts[0].attrs;
    assert!(count_attrs.contains_key("OBSERVER"));
    assert!(!count_attrs.contains_key("COUNT"));
    assert!(!count_attrs.contains_key("LOCALITY"));

    assert_eq!(batch.events[0].attrs.len(), 1);
  }

  #[test]
  fn malformed_rows_are_counted_not_raised() {
    let profile = profile();
    let mut n = Normalizer::new(&profile, taxa()).unwrap();
    let mut ids = IdAllocator::default();

    let batch = n
      .normalize(
        vec![
          row("west", "34.0", "2020-01-01", "1", "Turdus migratorius"),
          row("-120.0", "34.0", "2020-01-01", "1", "Turdus migratorius"),
          row("-85.0", "34.0", "someday", "1", "Turdus migratorius"),
          row("-85.0", "34.0", "2020-01-01", "many", "Turdus migratorius"),
          row("-85.0", "34.0", "2020-01-01", "1", "Vanessa cardui"),
        ],
        &mut ids,
      )
      .unwrap();

    let s = batch.stats;
    assert_eq!(
      (s.rows, s.bad_coordinates, s.out_of_bounds, s.bad_date, s.bad_count, s.missing_taxon),
      (5, 1, 1, 1, 1, 1)
    );
    assert_eq!(s.dropped(), 5);
    assert!(batch.counts.is_empty());

    // Only the unknown-taxon row got far enough to create a place and event.
    assert_eq!(batch.places.len(), 1);
    assert_eq!(batch.events.len(), 1);
    assert_eq!(ids.peek(Table::Places), 2);
  }

  #[test]
  fn keys_persist_across_batches() {
    let profile = profile();
    let mut n = Normalizer::new(&profile, taxa()).unwrap();
    let mut ids = IdAllocator::default();

    let first = n
      .normalize(vec![row("-85.0", "34.0", "2020-01-01", "1", "Turdus migratorius")], &mut ids)
      .unwrap();
    let second = n
      .normalize(vec![row("-85.0", "34.0", "2020-01-01", "3", "Turdus migratorius")], &mut ids)
      .unwrap();

    assert!(second.places.is_empty());
    assert!(second.events.is_empty());
    assert_eq!(second.counts[0].event_id, first.events[0].event_id);
    assert_eq!(n.places_seen(), 1);
    assert_eq!(n.events_seen(), 1);
  }

  #[test]
  fn required_fields_filter_rows() {
    let mut profile = profile();
    profile.require = vec![crate::profile::FieldEquals { field: "APPROVED".into(), value: "1".into() }];
    let mut n = Normalizer::new(&profile, taxa()).unwrap();

    let mut approved = row("-85.0", "34.0", "2020-01-01", "1", "Turdus migratorius");
    approved.insert("APPROVED", "1");
    let mut rejected = approved.clone();
    rejected.insert("APPROVED", "0");

    let batch = n.normalize(vec![approved, rejected], &mut IdAllocator::default()).unwrap();
    assert_eq!(batch.stats.filtered, 1);
    assert_eq!(batch.counts.len(), 1);
    assert!(!batch.counts[0].attrs.contains_key("APPROVED"));
  }

  #[test]
  fn ordered_key_maps_give_the_same_rows() {
    let profile = profile();
    let rows = || {
      vec![
        row("-85.0", "34.0", "2020-01-01", "2", "Turdus migratorius"),
        row("-84.0", "34.0", "2020-01-01", "1", "Turdus migratorius"),
        row("-85.0", "34.0", "2020-01-01", "X", "Turdus migratorius"),
      ]
    };

    let mut hashed = Normalizer::new(&profile, taxa()).unwrap();
    let expected = hashed.normalize(rows(), &mut IdAllocator::default()).unwrap();

    let mut ordered = Normalizer::with_maps(
      &profile,
      taxa(),
      BTreeMap::<PlaceKey, i64>::new(),
      BTreeMap::<EventKey, i64>::new(),
    )
    .unwrap();
    let actual = ordered.normalize(rows(), &mut IdAllocator::default()).unwrap();

    assert_eq!(actual.places, expected.places);
    assert_eq!(actual.events, expected.events);
    assert_eq!(actual.counts, expected.counts);
    assert_eq!(ordered.places_seen(), 2);
  }

  #[test]
  fn repeated_token_elsewhere_adds_no_place() {
    let mut profile = profile();
    profile.event.key = EventKeyRule::Token { field: "CHECKLIST".into() };
    let mut n = Normalizer::new(&profile, taxa()).unwrap();
    let mut ids = IdAllocator::default();

    let mut first = row("-85.0", "34.0", "2020-01-01", "1", "Turdus migratorius");
    first.insert("CHECKLIST", "S1");
    let mut moved = row("-84.0", "33.0", "2020-01-01", "2", "Turdus migratorius");
    moved.insert("CHECKLIST", "S1");

    let batch = n.normalize(vec![first, moved], &mut ids).unwrap();
    assert_eq!(batch.places.len(), 1);
    assert_eq!(batch.events.len(), 1);
    assert_eq!(batch.events[0].place_id, batch.places[0].place_id);
    assert!(batch.counts.iter().all(|c| c.event_id == batch.events[0].event_id));
    assert_eq!(ids.peek(Table::Places), 2);
  }
}
