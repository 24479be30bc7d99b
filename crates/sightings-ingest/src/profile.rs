//! Dataset profiles: the declarative field map that tells the normaliser
//! where each canonical column lives in one source's rows.
//!
//! Profiles deserialise from configuration, so each source is described in
//! TOML rather than by a hand-written ingest routine.

use std::collections::BTreeSet;

use chrono::NaiveTime;
use serde::Deserialize;
use sightings_core::{
  attrs::{Attrs, DATASET_TAG},
  key::{EventKey, PlaceKey},
  model::{Dataset, Tally},
  source::RawRow,
  store::TaxonKey,
};

use crate::{
  Error, Result,
  coerce::{self, normalize_whitespace},
};

// ─── Profile ─────────────────────────────────────────────────────────────────

/// How to turn one source's rows into places, events, and counts.
#[derive(Debug, Clone, Deserialize)]
pub struct DatasetProfile {
  pub dataset: Dataset,
  #[serde(default)]
  pub bbox:    BoundingBox,
  /// Rows whose field differs from the required value are skipped.
  #[serde(default)]
  pub require: Vec<FieldEquals>,
  pub place:   PlaceRule,
  pub event:   EventRule,
  pub count:   CountRule,
  pub taxon:   TaxonRule,
}

impl DatasetProfile {
  pub fn dataset_id(&self) -> &str { &self.dataset.dataset_id }

  /// Reject profiles that could never produce a row.
  pub fn validate(&self) -> Result<()> {
    let invalid = |msg: String| Err(Error::InvalidProfile(format!("{}: {msg}", self.dataset_id())));

    if self.dataset_id().trim().is_empty() {
      return Err(Error::InvalidProfile("dataset_id is empty".into()));
    }
    if !self.bbox.is_valid() {
      return invalid(format!("bounding box is inverted or not finite: {:?}", self.bbox));
    }
    for (what, name) in [("place.lng", &self.place.lng), ("place.lat", &self.place.lat)] {
      require_name(what, name).or_else(invalid)?;
    }
    for r in &self.require {
      require_name("require.field", &r.field).or_else(invalid)?;
    }
    self.place.radius.validate().or_else(invalid)?;
    if let PlaceKeyRule::Fields { names } = &self.place.key {
      require_names("place.key.names", names).or_else(invalid)?;
    }
    self.event.date.validate().or_else(invalid)?;
    if let EventKeyRule::Token { field } = &self.event.key {
      require_name("event.key.field", field).or_else(invalid)?;
    }
    if self.count.field.is_none() && self.count.default.is_none() {
      return invalid("count needs a field or a default".into());
    }
    require_names("taxon.fields", &self.taxon.fields).or_else(invalid)?;
    if let TaxonKey::Code { name } = &self.taxon.key {
      require_name("taxon.key.name", name).or_else(invalid)?;
      // Becomes a quoted JSON path member in the store's lookup.
      if name.contains(['"', '\\']) {
        return invalid(format!("taxon.key.name may not contain quotes or backslashes: {name:?}"));
      }
    }
    Ok(())
  }
}

fn require_name(what: &str, name: &str) -> std::result::Result<(), String> {
  if name.trim().is_empty() {
    Err(format!("{what} is empty"))
  } else {
    Ok(())
  }
}

fn require_names(what: &str, names: &[String]) -> std::result::Result<(), String> {
  if names.is_empty() {
    return Err(format!("{what} lists no fields"));
  }
  names.iter().try_for_each(|n| require_name(what, n))
}

// ─── Row filters ─────────────────────────────────────────────────────────────

/// Inclusive longitude/latitude window. Defaults to the whole globe.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
pub struct BoundingBox {
  pub min_lng: f64,
  pub max_lng: f64,
  pub min_lat: f64,
  pub max_lat: f64,
}

impl Default for BoundingBox {
  fn default() -> Self { Self { min_lng: -180.0, max_lng: 180.0, min_lat: -90.0, max_lat: 90.0 } }
}

impl BoundingBox {
  pub fn contains(&self, lng: f64, lat: f64) -> bool {
    (self.min_lng..=self.max_lng).contains(&lng) && (self.min_lat..=self.max_lat).contains(&lat)
  }

  fn is_valid(&self) -> bool {
    [self.min_lng, self.max_lng, self.min_lat, self.max_lat]
      .iter()
      .all(|v| v.is_finite())
      && self.min_lng <= self.max_lng
      && self.min_lat <= self.max_lat
  }
}

/// `field == value`, compared after trimming.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct FieldEquals {
  pub field: String,
  pub value: String,
}

impl FieldEquals {
  pub fn matches(&self, row: &RawRow) -> bool { row.value(&self.field) == Some(self.value.trim()) }
}

// ─── Places ──────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Deserialize)]
pub struct PlaceRule {
  pub lng:    String,
  pub lat:    String,
  #[serde(default)]
  pub radius: RadiusRule,
  #[serde(default)]
  pub key:    PlaceKeyRule,
  /// Extra fields kept in `place_attrs`.
  #[serde(default)]
  pub attrs:  Vec<String>,
}

/// Where the uncertainty radius (meters) comes from.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RadiusRule {
  /// Coordinates are exact.
  #[default]
  #[serde(rename = "none")]
  Exact,
  /// A numeric field multiplied by `scale` (e.g. kilometers with 1000).
  Field {
    field: String,
    #[serde(default = "unit_scale")]
    scale: f64,
  },
  /// The same radius for every row, e.g. a survey route's extent.
  Fixed { meters: f64 },
  /// A precision code looked up in `table`. Unknown codes mean exact.
  Codes {
    field: String,
    table: Vec<CodeRadius>,
  },
}

/// One entry of a precision-code table.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct CodeRadius {
  pub code:   String,
  pub meters: f64,
}

fn unit_scale() -> f64 { 1.0 }

impl RadiusRule {
  pub fn radius(&self, row: &RawRow) -> Option<f64> {
    match self {
      Self::Exact => None,
      Self::Field { field, scale } => row
        .value(field)
        .and_then(coerce::parse_number)
        .map(|v| v * scale),
      Self::Fixed { meters } => Some(*meters),
      Self::Codes { field, table } => {
        let code = row.value(field)?;
        table.iter().find(|c| c.code == code).map(|c| c.meters)
      }
    }
  }

  fn source_field(&self) -> Option<&str> {
    match self {
      Self::Field { field, .. } | Self::Codes { field, .. } => Some(field.as_str()),
      Self::Exact | Self::Fixed { .. } => None,
    }
  }

  fn validate(&self) -> std::result::Result<(), String> {
    match self {
      Self::Exact => Ok(()),
      Self::Field { field, scale } => {
        require_name("place.radius.field", field)?;
        if scale.is_finite() && *scale > 0.0 {
          Ok(())
        } else {
          Err(format!("place.radius.scale must be positive, got {scale}"))
        }
      }
      Self::Fixed { meters } if meters.is_finite() && *meters >= 0.0 => Ok(()),
      Self::Fixed { meters } => Err(format!("place.radius.meters must be non-negative, got {meters}")),
      Self::Codes { field, .. } => require_name("place.radius.field", field),
    }
  }
}

/// What makes two rows the same place.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum PlaceKeyRule {
  #[default]
  Coordinates,
  /// Coordinates plus radius: one coordinate at two precisions is two places.
  CoordinatesRadius,
  /// One or more code fields, e.g. a route or station identifier.
  Fields { names: Vec<String> },
}

impl PlaceKeyRule {
  /// `None` when a code field is missing.
  pub fn key(&self, row: &RawRow, lng: f64, lat: f64, radius: Option<f64>) -> Option<PlaceKey> {
    match self {
      Self::Coordinates => Some(PlaceKey::coordinates(lng, lat)),
      Self::CoordinatesRadius => Some(PlaceKey::precise(lng, lat, radius)),
      Self::Fields { names } => names
        .iter()
        .map(|n| row.value(n).map(str::to_owned))
        .collect::<Option<Vec<_>>>()
        .map(PlaceKey::Code),
    }
  }
}

// ─── Events ──────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Deserialize)]
pub struct EventRule {
  pub date:             DateRule,
  #[serde(default)]
  pub started:          Option<String>,
  #[serde(default)]
  pub ended:            Option<String>,
  /// Used to derive the end time when `ended` has no value.
  #[serde(default)]
  pub duration_minutes: Option<String>,
  #[serde(default)]
  pub key:              EventKeyRule,
  /// Extra fields kept in `event_attrs`.
  #[serde(default)]
  pub attrs:            Vec<String>,
}

impl EventRule {
  /// Start and end times. Unreadable values are absent, never defaulted.
  pub fn times(&self, row: &RawRow) -> (Option<NaiveTime>, Option<NaiveTime>) {
    let time = |field: &Option<String>| {
      field
        .as_deref()
        .and_then(|f| row.value(f))
        .and_then(coerce::parse_time)
    };

    let started = time(&self.started);
    let ended = time(&self.ended).or_else(|| {
      let minutes = self
        .duration_minutes
        .as_deref()
        .and_then(|f| row.value(f))
        .and_then(coerce::parse_number)?;
      coerce::add_minutes(started?, minutes)
    });
    (started, ended)
  }
}

fn default_date_formats() -> Vec<String> { vec!["%Y-%m-%d".into()] }

/// Where the calendar date comes from.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DateRule {
  /// One field, tried against each format in turn.
  Field {
    field:   String,
    #[serde(default = "default_date_formats")]
    formats: Vec<String>,
  },
  /// Separate year, month, and day fields.
  Parts {
    year:  String,
    month: String,
    day:   String,
  },
}

impl DateRule {
  pub fn field(field: impl Into<String>) -> Self {
    Self::Field { field: field.into(), formats: default_date_formats() }
  }

  /// `(year, day_of_year)`, or `None` when the date is missing or invalid.
  pub fn year_and_day(&self, row: &RawRow) -> Option<(i32, u32)> {
    let date = match self {
      Self::Field { field, formats } => coerce::parse_date(row.value(field)?, formats)?,
      Self::Parts { year, month, day } => {
        coerce::date_from_parts(row.value(year)?, row.value(month)?, row.value(day)?)?
      }
    };
    Some(coerce::year_and_day(date))
  }

  fn fields(&self) -> Vec<&str> {
    match self {
      Self::Field { field, .. } => vec![field.as_str()],
      Self::Parts { year, month, day } => vec![year.as_str(), month.as_str(), day.as_str()],
    }
  }

  fn validate(&self) -> std::result::Result<(), String> {
    match self {
      Self::Field { field, formats } => {
        require_name("event.date.field", field)?;
        require_names("event.date.formats", formats)
      }
      Self::Parts { year, month, day } => [year, month, day]
        .into_iter()
        .try_for_each(|f| require_name("event.date", f)),
    }
  }
}

/// What makes two rows the same sampling event.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum EventKeyRule {
  /// The place and the date, narrowed by `extra` fields (missing values
  /// compare as empty).
  PlaceDate {
    #[serde(default)]
    extra: Vec<String>,
  },
  /// A source-native event identifier.
  Token { field: String },
}

impl Default for EventKeyRule {
  fn default() -> Self { Self::PlaceDate { extra: Vec::new() } }
}

impl EventKeyRule {
  /// `None` when the token field is missing.
  pub fn key(&self, row: &RawRow, place: &PlaceKey, year: i32, day: u32) -> Option<EventKey> {
    match self {
      Self::PlaceDate { extra } => Some(EventKey::PlaceDate {
        place: place.clone(),
        year,
        day,
        extra: extra
          .iter()
          .map(|f| row.value(f).unwrap_or_default().to_owned())
          .collect(),
      }),
      Self::Token { field } => row.value(field).map(|t| EventKey::Token(t.to_owned())),
    }
  }
}

// ─── Counts & taxa ───────────────────────────────────────────────────────────

fn default_present_markers() -> Vec<String> { vec!["X".into()] }

#[derive(Debug, Clone, Deserialize)]
pub struct CountRule {
  #[serde(default)]
  pub field:           Option<String>,
  /// Used when the field is absent or blank.
  #[serde(default)]
  pub default:         Option<u32>,
  /// Values meaning "present, not counted".
  #[serde(default = "default_present_markers")]
  pub present_markers: Vec<String>,
}

impl CountRule {
  /// A constant count for sources where every row is one individual.
  pub fn constant(n: u32) -> Self {
    Self { field: None, default: Some(n), present_markers: default_present_markers() }
  }

  pub fn tally(&self, row: &RawRow) -> Option<Tally> {
    match self.field.as_deref().and_then(|f| row.value(f)) {
      Some(v) => coerce::parse_tally(v, &self.present_markers),
      None => self.default.map(Tally::Counted),
    }
  }
}

#[derive(Debug, Clone, Deserialize)]
pub struct TaxonRule {
  /// Joined with single spaces, e.g. genus then species.
  pub fields:       Vec<String>,
  #[serde(default)]
  pub key:          TaxonKey,
  /// Only resolve against taxa flagged as targets.
  #[serde(default)]
  pub targets_only: bool,
}

impl TaxonRule {
  /// The lookup name, or `None` when any part is missing.
  pub fn name(&self, row: &RawRow) -> Option<String> {
    let parts = self
      .fields
      .iter()
      .map(|f| row.value(f))
      .collect::<Option<Vec<_>>>()?;
    Some(normalize_whitespace(&parts.join(" ")))
  }
}

// ─── Attribute routing ───────────────────────────────────────────────────────

/// Which side-channel blob a raw field belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttrTarget {
  Place,
  Event,
  Count,
}

/// Field routing derived from a profile. Fields mapped to a canonical column
/// are dropped; place and event fields go to their blobs; everything else
/// lands on the count.
#[derive(Debug, Clone, Default)]
pub struct Routing {
  consumed: BTreeSet<String>,
  place:    BTreeSet<String>,
  event:    BTreeSet<String>,
}

impl Routing {
  pub fn new(profile: &DatasetProfile) -> Self {
    let mut consumed: BTreeSet<String> = BTreeSet::new();
    consumed.insert(profile.place.lng.clone());
    consumed.insert(profile.place.lat.clone());
    consumed.extend(profile.place.radius.source_field().map(str::to_owned));
    consumed.extend(profile.event.date.fields().into_iter().map(str::to_owned));
    consumed.extend(
      [&profile.event.started, &profile.event.ended, &profile.event.duration_minutes, &profile.count.field]
        .into_iter()
        .flatten()
        .cloned(),
    );
    consumed.extend(profile.taxon.fields.iter().cloned());
    consumed.extend(profile.require.iter().map(|r| r.field.clone()));

    let mut place: BTreeSet<String> = profile.place.attrs.iter().cloned().collect();
    if let PlaceKeyRule::Fields { names } = &profile.place.key {
      place.extend(names.iter().cloned());
    }

    let mut event: BTreeSet<String> = profile.event.attrs.iter().cloned().collect();
    match &profile.event.key {
      EventKeyRule::PlaceDate { extra } => event.extend(extra.iter().cloned()),
      EventKeyRule::Token { field } => {
        event.insert(field.clone());
      }
    }

    Self { consumed, place, event }
  }

  pub fn target(&self, field: &str) -> Option<AttrTarget> {
    if self.place.contains(field) {
      Some(AttrTarget::Place)
    } else if self.event.contains(field) {
      Some(AttrTarget::Event)
    } else if self.consumed.contains(field) {
      None
    } else {
      Some(AttrTarget::Count)
    }
  }

  /// The blob for `target`, tagged with the owning dataset.
  pub fn attrs(&self, row: &RawRow, target: AttrTarget, dataset_id: &str) -> Attrs {
    let mut attrs = Attrs::new();
    for (field, value) in row.iter() {
      if self.target(field) == Some(target) {
        attrs.insert_raw(field, value);
      }
    }
    attrs.insert(DATASET_TAG, dataset_id);
    attrs
  }
}
