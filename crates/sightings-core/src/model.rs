//! Canonical entity rows, the shared schema every source is normalised into.
//!
//! Places, events, and counts are owned by exactly one dataset and are
//! destroyed in bulk when that dataset is replaced. Taxa are shared between
//! datasets and outlive any single replacement cycle.

use std::{fmt, str::FromStr};

use chrono::{DateTime, NaiveTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{Error, attrs::Attrs};

pub type TaxonId = i64;
pub type PlaceId = i64;
pub type EventId = i64;
pub type CountId = i64;

// ─── Tables ──────────────────────────────────────────────────────────────────

/// An entity table that carries a surrogate integer key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Table {
  Taxa,
  Places,
  Events,
  Counts,
}

impl Table {
  pub const ALL: [Table; 4] = [Table::Taxa, Table::Places, Table::Events, Table::Counts];

  pub fn name(self) -> &'static str {
    match self {
      Self::Taxa => "taxa",
      Self::Places => "places",
      Self::Events => "events",
      Self::Counts => "counts",
    }
  }

  /// The surrogate key column.
  pub fn id_column(self) -> &'static str {
    match self {
      Self::Taxa => "taxon_id",
      Self::Places => "place_id",
      Self::Events => "event_id",
      Self::Counts => "count_id",
    }
  }
}

impl fmt::Display for Table {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str(self.name()) }
}

impl FromStr for Table {
  type Err = Error;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    Table::ALL
      .into_iter()
      .find(|t| t.name() == s)
      .ok_or_else(|| Error::UnknownTable(s.to_owned()))
  }
}

// ─── Dataset ─────────────────────────────────────────────────────────────────

/// One ingested source. Deleted and recreated whenever the source is
/// re-ingested.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Dataset {
  pub dataset_id: String,
  #[serde(default)]
  pub title:      String,
  #[serde(default)]
  pub version:    String,
  #[serde(default)]
  pub url:        String,
  /// When this copy of the source was loaded; set by the pipeline.
  #[serde(default)]
  pub extracted:  Option<DateTime<Utc>>,
}

impl Dataset {
  pub fn new(dataset_id: impl Into<String>) -> Self {
    Self {
      dataset_id: dataset_id.into(),
      title:      String::new(),
      version:    String::new(),
      url:        String::new(),
      extracted:  None,
    }
  }
}

// ─── Taxon ───────────────────────────────────────────────────────────────────

/// A biological classification unit, shared by all datasets.
#[derive(Debug, Clone, PartialEq)]
pub struct Taxon {
  pub taxon_id:    TaxonId,
  /// Absent for coarse groupings that have no binomial.
  pub sci_name:    Option<String>,
  pub class:       Option<String>,
  pub order:       Option<String>,
  pub family:      Option<String>,
  pub genus:       Option<String>,
  pub common_name: Option<String>,
  /// Marks taxa of interest; several sources only keep target taxa.
  pub target:      bool,
  /// Source-specific codes; `dataset_id` names the classification authority.
  pub attrs:       Attrs,
}

// ─── Place ───────────────────────────────────────────────────────────────────

/// A physical location.
#[derive(Debug, Clone, PartialEq)]
pub struct Place {
  pub place_id:   PlaceId,
  pub dataset_id: String,
  pub lng:        f64,
  pub lat:        f64,
  /// Uncertainty radius in meters. `None` means the coordinate is exact.
  pub radius:     Option<f64>,
  pub attrs:      Attrs,
}

// ─── Event ───────────────────────────────────────────────────────────────────

/// A sampling occasion at a place.
#[derive(Debug, Clone, PartialEq)]
pub struct Event {
  pub event_id:   EventId,
  pub place_id:   PlaceId,
  pub dataset_id: String,
  pub year:       i32,
  /// Day of year, 1–366.
  pub day:        u32,
  /// Minute-granular start time; `None` when the source recorded none.
  pub started:    Option<NaiveTime>,
  pub ended:      Option<NaiveTime>,
  pub attrs:      Attrs,
}

// ─── Count ───────────────────────────────────────────────────────────────────

/// How many individuals an observation reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum Tally {
  Counted(u32),
  /// The taxon was present but not counted (eBird's `X`).
  Present,
}

impl Tally {
  /// The stored column value; `Present` is the NULL sentinel.
  pub fn as_column(self) -> Option<i64> {
    match self {
      Self::Counted(n) => Some(i64::from(n)),
      Self::Present => None,
    }
  }

  pub fn from_column(value: Option<i64>) -> Self {
    match value.and_then(|v| u32::try_from(v).ok()) {
      Some(n) => Self::Counted(n),
      None => Self::Present,
    }
  }
}

/// One observation record.
#[derive(Debug, Clone, PartialEq)]
pub struct Count {
  pub count_id:   CountId,
  pub event_id:   EventId,
  pub taxon_id:   TaxonId,
  pub dataset_id: String,
  pub count:      Tally,
  pub attrs:      Attrs,
}
