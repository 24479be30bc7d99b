//! Flat-file export of one dataset.

use std::{
  collections::HashMap,
  fs,
  path::{Path, PathBuf},
};

use anyhow::Context as _;
use sightings_core::{model::Tally, store::SightingStore};
use tracing::info;

/// Files written by [`export_dataset`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportSummary {
  pub dir:    PathBuf,
  pub places: usize,
  pub events: usize,
  pub counts: usize,
}

const TIME_FORMAT: &str = "%H:%M";

/// Write `<dir>/<dataset_id>/{places,events,counts}.csv`.
pub async fn export_dataset<S: SightingStore>(
  store: &S,
  dataset_id: &str,
  dir: &Path,
) -> anyhow::Result<ExportSummary> {
  if store.get_dataset(dataset_id).await?.is_none() {
    anyhow::bail!("dataset {dataset_id:?} is not in the store");
  }

  let dir = dir.join(dataset_id);
  fs::create_dir_all(&dir).with_context(|| format!("failed to create {}", dir.display()))?;

  let places = store.places(dataset_id).await?;
  let mut w = csv::Writer::from_path(dir.join("places.csv"))?;
  w.write_record(["place_id", "lng", "lat", "radius", "attrs"])?;
  for p in &places {
    w.write_record([
      p.place_id.to_string(),
      p.lng.to_string(),
      p.lat.to_string(),
      p.radius.map(|r| r.to_string()).unwrap_or_default(),
      p.attrs.encode()?,
    ])?;
  }
  w.flush()?;

  let events = store.events(dataset_id).await?;
  let mut w = csv::Writer::from_path(dir.join("events.csv"))?;
  w.write_record(["event_id", "place_id", "year", "day", "started", "ended", "attrs"])?;
  for e in &events {
    let time = |t: Option<chrono::NaiveTime>| t.map(|t| t.format(TIME_FORMAT).to_string());
    w.write_record([
      e.event_id.to_string(),
      e.place_id.to_string(),
      e.year.to_string(),
      e.day.to_string(),
      time(e.started).unwrap_or_default(),
      time(e.ended).unwrap_or_default(),
      e.attrs.encode()?,
    ])?;
  }
  w.flush()?;

  let names: HashMap<i64, String> = store
    .taxa()
    .await?
    .into_iter()
    .filter_map(|t| t.sci_name.map(|n| (t.taxon_id, n)))
    .collect();
  let counts = store.counts(dataset_id).await?;
  let mut w = csv::Writer::from_path(dir.join("counts.csv"))?;
  w.write_record(["count_id", "event_id", "taxon_id", "sci_name", "count", "attrs"])?;
  for c in &counts {
    let tally = match c.count {
      Tally::Counted(n) => n.to_string(),
      Tally::Present => "X".to_owned(),
    };
    w.write_record([
      c.count_id.to_string(),
      c.event_id.to_string(),
      c.taxon_id.to_string(),
      names.get(&c.taxon_id).cloned().unwrap_or_default(),
      tally,
      c.attrs.encode()?,
    ])?;
  }
  w.flush()?;

  info!(
    dataset = %dataset_id,
    dir = %dir.display(),
    places = places.len(),
    events = events.len(),
    counts = counts.len(),
    "exported dataset"
  );
  Ok(ExportSummary { dir, places: places.len(), events: events.len(), counts: counts.len() })
}
