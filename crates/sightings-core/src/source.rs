//! The source-adapter seam.
//!
//! A source adapter knows one file format and nothing else. It hands the
//! pipeline bounded batches of [`RawRow`]s keyed by the source's own field
//! names; all normalisation happens downstream.

use std::{collections::BTreeMap, convert::Infallible};

// ─── RawRow ──────────────────────────────────────────────────────────────────

/// One semi-structured source record: field name → raw text.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RawRow(BTreeMap<String, String>);

impl RawRow {
  pub fn new() -> Self { Self::default() }

  pub fn insert(&mut self, field: impl Into<String>, value: impl Into<String>) {
    self.0.insert(field.into(), value.into());
  }

  /// The raw value of `field`, untouched.
  pub fn get(&self, field: &str) -> Option<&str> { self.0.get(field).map(String::as_str) }

  /// The trimmed value of `field`, or `None` when missing or blank.
  pub fn value(&self, field: &str) -> Option<&str> {
    self.get(field).map(str::trim).filter(|v| !v.is_empty())
  }

  pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
    self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
  }

  pub fn len(&self) -> usize { self.0.len() }

  pub fn is_empty(&self) -> bool { self.0.is_empty() }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for RawRow {
  fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
    Self(iter.into_iter().map(|(k, v)| (k.into(), v.into())).collect())
  }
}

// ─── Trait ───────────────────────────────────────────────────────────────────

/// A reader of one source format.
///
/// Implementations should stream: a call to [`next_batch`](Self::next_batch)
/// reads at most `max_rows` records, so memory is bounded by the batch size
/// rather than the source size.
pub trait SourceAdapter {
  type Error: std::error::Error + Send + Sync + 'static;

  /// Read up to `max_rows` rows. Returns `Ok(None)` once the source is
  /// exhausted; a returned batch is never empty.
  fn next_batch(&mut self, max_rows: usize) -> Result<Option<Vec<RawRow>>, Self::Error>;
}

// ─── In-memory adapters ──────────────────────────────────────────────────────

/// Adapts any iterator of rows into a [`SourceAdapter`].
pub struct IterSource<I> {
  rows: I,
}

impl<I: Iterator<Item = RawRow>> IterSource<I> {
  pub fn new(rows: impl IntoIterator<IntoIter = I>) -> Self { Self { rows: rows.into_iter() } }
}

impl<I: Iterator<Item = RawRow>> SourceAdapter for IterSource<I> {
  type Error = Infallible;

  fn next_batch(&mut self, max_rows: usize) -> Result<Option<Vec<RawRow>>, Infallible> {
    let batch: Vec<RawRow> = self.rows.by_ref().take(max_rows.max(1)).collect();
    Ok((!batch.is_empty()).then_some(batch))
  }
}

/// A fully materialised source, mostly useful for tests and small lists.
pub type VecSource = IterSource<std::vec::IntoIter<RawRow>>;

impl From<Vec<RawRow>> for VecSource {
  fn from(rows: Vec<RawRow>) -> Self { IterSource::new(rows) }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn row(n: usize) -> RawRow { [("n", n.to_string())].into_iter().collect() }

  #[test]
  fn batches_are_bounded_and_terminate() {
    let mut source = VecSource::from((0..5).map(row).collect::<Vec<_>>());

    let sizes: Vec<usize> = std::iter::from_fn(|| source.next_batch(2).unwrap())
      .map(|b| b.len())
      .collect();
    assert_eq!(sizes, vec![2, 2, 1]);
    assert!(source.next_batch(2).unwrap().is_none());
  }

  #[test]
  fn value_trims_and_hides_blanks() {
    let r: RawRow = [("a", "  7 "), ("b", "   ")].into_iter().collect();
    assert_eq!(r.value("a"), Some("7"));
    assert_eq!(r.get("b"), Some("   "));
    assert_eq!(r.value("b"), None);
    assert_eq!(r.value("missing"), None);
  }
}
