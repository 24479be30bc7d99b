//! Natural keys: the source-side identity of places and events.
//!
//! A natural key is whatever a source uses to say "the same place" or "the
//! same sampling occasion": a coordinate pair, a station code, a checklist
//! token. The resolver maps each distinct key to one surrogate id.

use std::fmt;

// ─── Coordinates ─────────────────────────────────────────────────────────────

/// A coordinate component compared by exact bit pattern, so it can be hashed
/// and ordered. Negative zero is folded into positive zero.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CoordBits(u64);

impl CoordBits {
  pub fn new(value: f64) -> Self {
    let value = if value == 0.0 { 0.0 } else { value };
    Self(value.to_bits())
  }

  pub fn value(self) -> f64 { f64::from_bits(self.0) }
}

impl fmt::Debug for CoordBits {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { write!(f, "{}", self.value()) }
}

// ─── PlaceKey ────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum PlaceKey {
  /// A `(longitude, latitude)` pair.
  Coordinates { lng: CoordBits, lat: CoordBits },
  /// A coordinate pair plus its precision bucket. The same coordinate
  /// declared at two precisions is two places.
  Precise {
    lng:    CoordBits,
    lat:    CoordBits,
    radius: Option<CoordBits>,
  },
  /// One or more source code fields, e.g. a banding station code.
  Code(Vec<String>),
}

impl PlaceKey {
  pub fn coordinates(lng: f64, lat: f64) -> Self {
    Self::Coordinates { lng: CoordBits::new(lng), lat: CoordBits::new(lat) }
  }

  pub fn precise(lng: f64, lat: f64, radius: Option<f64>) -> Self {
    Self::Precise {
      lng:    CoordBits::new(lng),
      lat:    CoordBits::new(lat),
      radius: radius.map(CoordBits::new),
    }
  }
}

// ─── EventKey ────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum EventKey {
  /// A place and a calendar date, optionally narrowed by extra source fields
  /// (e.g. a repeat-visit number).
  PlaceDate {
    place: PlaceKey,
    year:  i32,
    day:   u32,
    extra: Vec<String>,
  },
  /// A source-native sampling-event identifier.
  Token(String),
}

#[cfg(test)]
mod tests {
  use std::collections::HashSet;

  use super::*;

  #[test]
  fn negative_zero_is_the_same_coordinate() {
    assert_eq!(PlaceKey::coordinates(-0.0, 10.0), PlaceKey::coordinates(0.0, 10.0));
  }

  #[test]
  fn precision_bucket_separates_places() {
    let keys: HashSet<_> = [
      PlaceKey::precise(-85.0, 34.0, Some(30.92)),
      PlaceKey::precise(-85.0, 34.0, Some(309.2)),
      PlaceKey::precise(-85.0, 34.0, None),
      PlaceKey::precise(-85.0, 34.0, Some(30.92)),
    ]
    .into_iter()
    .collect();
    assert_eq!(keys.len(), 3);
  }
}
