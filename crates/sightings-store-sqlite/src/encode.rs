//! Column codecs for the sightings tables.
//!
//! Timestamps are RFC 3339 strings, times of day are `HH:MM`, attribute blobs
//! are the compact JSON produced by [`Attrs::encode`], and booleans are
//! 0/1 integers.

use chrono::{DateTime, NaiveTime, Utc};
use sightings_core::{
  attrs::Attrs,
  model::{Count, Dataset, Event, Place, Tally, Taxon},
};

use crate::{Error, Result};

// ─── DateTime<Utc> ───────────────────────────────────────────────────────────

pub fn encode_dt(dt: DateTime<Utc>) -> String { dt.to_rfc3339() }

pub fn decode_dt(s: &str) -> Result<DateTime<Utc>> {
  DateTime::parse_from_rfc3339(s)
    .map(|dt| dt.with_timezone(&Utc))
    .map_err(|e| Error::DateParse(e.to_string()))
}

// ─── Time of day ─────────────────────────────────────────────────────────────

pub fn encode_time(t: NaiveTime) -> String { t.format("%H:%M").to_string() }

pub fn decode_time(s: &str) -> Result<NaiveTime> {
  NaiveTime::parse_from_str(s, "%H:%M").map_err(|e| Error::DateParse(format!("{s:?}: {e}")))
}

// ─── Day of year ─────────────────────────────────────────────────────────────

pub fn decode_day(day: i64) -> Result<u32> {
  u32::try_from(day)
    .ok()
    .filter(|d| (1..=366).contains(d))
    .ok_or(Error::DayOutOfRange(day))
}

// ─── Encoded row types ───────────────────────────────────────────────────────
//
// Built on the async side so that the closures handed to tokio-rusqlite only
// move plain column values.

pub struct TaxonColumns {
  pub taxon_id:    i64,
  pub sci_name:    Option<String>,
  pub class:       Option<String>,
  pub order:       Option<String>,
  pub family:      Option<String>,
  pub genus:       Option<String>,
  pub common_name: Option<String>,
  pub target:      bool,
  pub attrs:       String,
}

impl TaxonColumns {
  pub fn encode(t: Taxon) -> Result<Self> {
    Ok(Self {
      attrs:       t.attrs.encode()?,
      taxon_id:    t.taxon_id,
      sci_name:    t.sci_name,
      class:       t.class,
      order:       t.order,
      family:      t.family,
      genus:       t.genus,
      common_name: t.common_name,
      target:      t.target,
    })
  }

  pub fn decode(self) -> Result<Taxon> {
    Ok(Taxon {
      taxon_id:    self.taxon_id,
      sci_name:    self.sci_name,
      class:       self.class,
      order:       self.order,
      family:      self.family,
      genus:       self.genus,
      common_name: self.common_name,
      target:      self.target,
      attrs:       Attrs::decode(&self.attrs)?,
    })
  }
}

pub struct PlaceColumns {
  pub place_id:   i64,
  pub dataset_id: String,
  pub lng:        f64,
  pub lat:        f64,
  pub radius:     Option<f64>,
  pub attrs:      String,
}

impl PlaceColumns {
  pub fn encode(p: Place) -> Result<Self> {
    Ok(Self {
      attrs:      p.attrs.encode()?,
      place_id:   p.place_id,
      dataset_id: p.dataset_id,
      lng:        p.lng,
      lat:        p.lat,
      radius:     p.radius,
    })
  }

  pub fn decode(self) -> Result<Place> {
    Ok(Place {
      place_id:   self.place_id,
      dataset_id: self.dataset_id,
      lng:        self.lng,
      lat:        self.lat,
      radius:     self.radius,
      attrs:      Attrs::decode(&self.attrs)?,
    })
  }
}

pub struct EventColumns {
  pub event_id:   i64,
  pub place_id:   i64,
  pub dataset_id: String,
  pub year:       i64,
  pub day:        i64,
  pub started:    Option<String>,
  pub ended:      Option<String>,
  pub attrs:      String,
}

impl EventColumns {
  pub fn encode(e: Event) -> Result<Self> {
    Ok(Self {
      attrs:      e.attrs.encode()?,
      event_id:   e.event_id,
      place_id:   e.place_id,
      dataset_id: e.dataset_id,
      year:       i64::from(e.year),
      day:        i64::from(e.day),
      started:    e.started.map(encode_time),
      ended:      e.ended.map(encode_time),
    })
  }

  pub fn decode(self) -> Result<Event> {
    Ok(Event {
      event_id:   self.event_id,
      place_id:   self.place_id,
      dataset_id: self.dataset_id,
      year:       i32::try_from(self.year)
        .map_err(|_| Error::DateParse(format!("year out of range: {}", self.year)))?,
      day:        decode_day(self.day)?,
      started:    self.started.as_deref().map(decode_time).transpose()?,
      ended:      self.ended.as_deref().map(decode_time).transpose()?,
      attrs:      Attrs::decode(&self.attrs)?,
    })
  }
}

pub struct CountColumns {
  pub count_id:   i64,
  pub event_id:   i64,
  pub taxon_id:   i64,
  pub dataset_id: String,
  pub count:      Option<i64>,
  pub attrs:      String,
}

impl CountColumns {
  pub fn encode(c: Count) -> Result<Self> {
    Ok(Self {
      attrs:      c.attrs.encode()?,
      count_id:   c.count_id,
      event_id:   c.event_id,
      taxon_id:   c.taxon_id,
      dataset_id: c.dataset_id,
      count:      c.count.as_column(),
    })
  }

  pub fn decode(self) -> Result<Count> {
    Ok(Count {
      count_id:   self.count_id,
      event_id:   self.event_id,
      taxon_id:   self.taxon_id,
      dataset_id: self.dataset_id,
      count:      Tally::from_column(self.count),
      attrs:      Attrs::decode(&self.attrs)?,
    })
  }
}

/// Raw strings read directly from a `datasets` row.
pub struct RawDataset {
  pub dataset_id: String,
  pub version:    String,
  pub title:      String,
  pub url:        String,
  pub extracted:  Option<String>,
}

impl RawDataset {
  pub fn into_dataset(self) -> Result<Dataset> {
    Ok(Dataset {
      dataset_id: self.dataset_id,
      version:    self.version,
      title:      self.title,
      url:        self.url,
      extracted:  self.extracted.as_deref().map(decode_dt).transpose()?,
    })
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn times_are_minute_granular() {
    let t = NaiveTime::from_hms_opt(6, 5, 59).unwrap();
    assert_eq!(encode_time(t), "06:05");
    assert_eq!(decode_time("06:05").unwrap(), NaiveTime::from_hms_opt(6, 5, 0).unwrap());
  }

  #[test]
  fn day_range_is_checked() {
    assert_eq!(decode_day(366).unwrap(), 366);
    assert!(matches!(decode_day(0), Err(Error::DayOutOfRange(0))));
    assert!(matches!(decode_day(367), Err(Error::DayOutOfRange(367))));
  }
}
