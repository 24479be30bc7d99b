//! Side-channel attribute blobs.
//!
//! Every source carries fields that have no canonical column. They are kept
//! per row in an [`Attrs`] map instead of being given a static schema. The
//! stored form is a compact JSON object whose keys are in lexicographic order,
//! so two equal maps always encode to byte-identical text.

use std::{collections::BTreeMap, fmt};

use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// Key under which every blob records the dataset that wrote it.
pub const DATASET_TAG: &str = "dataset_id";

// ─── AttrValue ───────────────────────────────────────────────────────────────

/// A scalar value in an attribute blob.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AttrValue {
  Bool(bool),
  Number(f64),
  Text(String),
}

impl AttrValue {
  pub fn as_str(&self) -> Option<&str> {
    match self {
      Self::Text(s) => Some(s),
      _ => None,
    }
  }
}

impl fmt::Display for AttrValue {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      Self::Bool(b) => write!(f, "{b}"),
      Self::Number(n) => write!(f, "{n}"),
      Self::Text(s) => f.write_str(s),
    }
  }
}

impl From<&str> for AttrValue {
  fn from(s: &str) -> Self { Self::Text(s.to_owned()) }
}

impl From<String> for AttrValue {
  fn from(s: String) -> Self { Self::Text(s) }
}

impl From<f64> for AttrValue {
  fn from(n: f64) -> Self { Self::Number(n) }
}

impl From<i64> for AttrValue {
  fn from(n: i64) -> Self { Self::Number(n as f64) }
}

impl From<bool> for AttrValue {
  fn from(b: bool) -> Self { Self::Bool(b) }
}

// ─── Attrs ───────────────────────────────────────────────────────────────────

/// Ordered mapping from source field name to scalar value.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Attrs(BTreeMap<String, AttrValue>);

impl Attrs {
  pub fn new() -> Self { Self::default() }

  /// An empty blob already tagged with the owning dataset.
  pub fn tagged(dataset_id: &str) -> Self {
    let mut attrs = Self::new();
    attrs.insert(DATASET_TAG, dataset_id);
    attrs
  }

  pub fn insert(&mut self, key: impl Into<String>, value: impl Into<AttrValue>) {
    self.0.insert(key.into(), value.into());
  }

  /// Insert a raw source value verbatim. Blank values are dropped.
  pub fn insert_raw(&mut self, key: &str, value: &str) {
    if !value.trim().is_empty() {
      self.0.insert(key.to_owned(), AttrValue::Text(value.to_owned()));
    }
  }

  pub fn get(&self, key: &str) -> Option<&AttrValue> { self.0.get(key) }

  pub fn contains_key(&self, key: &str) -> bool { self.0.contains_key(key) }

  /// The dataset tag, if present.
  pub fn dataset_id(&self) -> Option<&str> {
    self.get(DATASET_TAG).and_then(AttrValue::as_str)
  }

  pub fn len(&self) -> usize { self.0.len() }

  pub fn is_empty(&self) -> bool { self.0.is_empty() }

  pub fn iter(&self) -> impl Iterator<Item = (&str, &AttrValue)> {
    self.0.iter().map(|(k, v)| (k.as_str(), v))
  }

  /// Serialise to the stored JSON text.
  pub fn encode(&self) -> Result<String> { Ok(serde_json::to_string(&self.0)?) }

  /// Parse stored JSON text. `null` members are skipped; nested arrays and
  /// objects are rejected.
  pub fn decode(s: &str) -> Result<Self> {
    let value: serde_json::Value = serde_json::from_str(s)?;
    let serde_json::Value::Object(map) = value else {
      return Err(Error::AttrsNotObject(s.to_owned()));
    };

    let mut attrs = Self::new();
    for (key, value) in map {
      let value = match value {
        serde_json::Value::Null => continue,
        serde_json::Value::Bool(b) => AttrValue::Bool(b),
        serde_json::Value::Number(n) => match n.as_f64() {
          Some(f) => AttrValue::Number(f),
          None => return Err(Error::UnsupportedAttrValue(key)),
        },
        serde_json::Value::String(s) => AttrValue::Text(s),
        _ => return Err(Error::UnsupportedAttrValue(key)),
      };
      attrs.0.insert(key, value);
    }
    Ok(attrs)
  }
}

impl FromIterator<(String, AttrValue)> for Attrs {
  fn from_iter<I: IntoIterator<Item = (String, AttrValue)>>(iter: I) -> Self {
    Self(iter.into_iter().collect())
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn encoding_is_key_ordered() {
    let mut a = Attrs::tagged("ebird");
    a.insert_raw("STATE CODE", "US-GA");
    a.insert_raw("BCR CODE", "29");

    let mut b = Attrs::new();
    b.insert_raw("BCR CODE", "29");
    b.insert(DATASET_TAG, "ebird");
    b.insert_raw("STATE CODE", "US-GA");

    let encoded = a.encode().unwrap();
    assert_eq!(encoded, b.encode().unwrap());
    assert_eq!(
      encoded,
      r#"{"BCR CODE":"29","STATE CODE":"US-GA","dataset_id":"ebird"}"#
    );
  }

  #[test]
  fn blank_raw_values_are_dropped() {
    let mut a = Attrs::new();
    a.insert_raw("NOTE", "   ");
    a.insert_raw("NET", "");
    assert!(a.is_empty());
  }

  #[test]
  fn decode_reads_scalars_and_skips_nulls() {
    let a = Attrs::decode(r#"{"dataset_id":"bbs","route":"12","active":true,"stratum":4,"x":null}"#)
      .unwrap();
    assert_eq!(a.dataset_id(), Some("bbs"));
    assert_eq!(a.get("active"), Some(&AttrValue::Bool(true)));
    assert_eq!(a.get("stratum"), Some(&AttrValue::Number(4.0)));
    assert!(!a.contains_key("x"));
    assert_eq!(a.len(), 4);
  }

  #[test]
  fn decode_rejects_non_objects() {
    assert!(matches!(Attrs::decode("[1,2]"), Err(Error::AttrsNotObject(_))));
    assert!(matches!(
      Attrs::decode(r#"{"nested":{"a":1}}"#),
      Err(Error::UnsupportedAttrValue(k)) if k == "nested"
    ));
  }
}
