//! A [`SourceAdapter`] over comma-, tab-, or otherwise-delimited text files.

use std::{fs::File, io::Read, path::Path};

use csv::{ErrorKind, ReaderBuilder, StringRecord, Trim};
use sightings_core::source::{RawRow, SourceAdapter};
use tracing::debug;

use crate::config::SourceConfig;

/// Streams a delimited file with a header line.
///
/// Records that are not valid UTF-8 are skipped and counted; any other read
/// error ends the load.
pub struct DelimitedSource<R = File> {
  reader:  csv::Reader<R>,
  headers: Option<Vec<String>>,
  record:  StringRecord,
  skipped: u64,
}

impl DelimitedSource<File> {
  pub fn open(path: &Path, cfg: &SourceConfig) -> anyhow::Result<Self> {
    let file = File::open(path)?;
    Self::from_reader(file, cfg.delimiter_byte()?, cfg.quoting)
  }
}

impl<R: Read> DelimitedSource<R> {
  pub fn from_reader(reader: R, delimiter: u8, quoting: bool) -> anyhow::Result<Self> {
    let reader = ReaderBuilder::new()
      .delimiter(delimiter)
      .quoting(quoting)
      .flexible(true)
      .trim(Trim::Headers)
      .from_reader(reader);
    Ok(Self { reader, headers: None, record: StringRecord::new(), skipped: 0 })
  }

  /// Records dropped so far for bad encoding.
  pub fn skipped(&self) -> u64 { self.skipped }

  fn headers(&mut self) -> Result<Vec<String>, csv::Error> {
    if let Some(headers) = &self.headers {
      return Ok(headers.clone());
    }
    let headers: Vec<String> = self.reader.headers()?.iter().map(str::to_owned).collect();
    self.headers = Some(headers.clone());
    Ok(headers)
  }
}

impl<R: Read> SourceAdapter for DelimitedSource<R> {
  type Error = csv::Error;

  fn next_batch(&mut self, max_rows: usize) -> Result<Option<Vec<RawRow>>, csv::Error> {
    let headers = self.headers()?;
    let mut batch = Vec::with_capacity(max_rows.clamp(1, 4096));

    while batch.len() < max_rows.max(1) {
      match self.reader.read_record(&mut self.record) {
        Ok(false) => break,
        // Short rows keep the fields they have; extra trailing fields are
        // dropped.
        Ok(true) => batch.push(
          headers
            .iter()
            .zip(self.record.iter())
            .map(|(h, v)| (h.as_str(), v))
            .collect::<RawRow>(),
        ),
        Err(e) if matches!(e.kind(), ErrorKind::Utf8 { .. }) => {
          self.skipped += 1;
          debug!(position = ?e.position().map(|p| p.line()), "skipping record that is not UTF-8");
        }
        Err(e) => return Err(e),
      }
    }

    Ok((!batch.is_empty()).then_some(batch))
  }
}

#[cfg(test)]
mod tests {
  use std::io::Cursor;

  use super::*;

  fn drain<R: Read>(source: &mut DelimitedSource<R>, max_rows: usize) -> Vec<Vec<RawRow>> {
    let mut batches = Vec::new();
    while let Some(batch) = source.next_batch(max_rows).unwrap() {
      batches.push(batch);
    }
    batches
  }

  #[test]
  fn batches_are_bounded() {
    let text = "a,b\n1,2\n3,4\n5,6\n";
    let mut source = DelimitedSource::from_reader(Cursor::new(text), b',', true).unwrap();

    let batches = drain(&mut source, 2);
    assert_eq!(batches.iter().map(Vec::len).collect::<Vec<_>>(), vec![2, 1]);
    assert_eq!(batches[1][0].get("a"), Some("5"));
    assert_eq!(batches[1][0].get("b"), Some("6"));
  }

  #[test]
  fn header_whitespace_is_trimmed_but_values_are_not() {
    let text = " LATITUDE \t LONGITUDE\n 42.1\t-71.2\n";
    let mut source = DelimitedSource::from_reader(Cursor::new(text), b'\t', true).unwrap();

    let row = &drain(&mut source, 10)[0][0];
    assert_eq!(row.get("LATITUDE"), Some(" 42.1"));
    assert_eq!(row.value("LATITUDE"), Some("42.1"));
    assert_eq!(row.value("LONGITUDE"), Some("-71.2"));
  }

  #[test]
  fn ragged_rows_keep_what_they_have() {
    let text = "a,b,c\n1,2\n1,2,3,4\n";
    let mut source = DelimitedSource::from_reader(Cursor::new(text), b',', true).unwrap();

    let rows = drain(&mut source, 10).concat();
    assert_eq!(rows[0].len(), 2);
    assert_eq!(rows[0].get("c"), None);
    assert_eq!(rows[1].len(), 3);
  }

  #[test]
  fn quote_characters_are_data_when_quoting_is_off() {
    let text = "name\tnote\n\"Smith\tsaid \"hi\n";
    let mut source = DelimitedSource::from_reader(Cursor::new(text), b'\t', false).unwrap();

    let row = &drain(&mut source, 10)[0][0];
    assert_eq!(row.get("name"), Some("\"Smith"));
    assert_eq!(row.get("note"), Some("said \"hi"));
  }

  #[test]
  fn quoted_delimiters_are_kept_when_quoting_is_on() {
    let text = "name,note\n\"Smith, J\",ok\n";
    let mut source = DelimitedSource::from_reader(Cursor::new(text), b',', true).unwrap();

    let row = &drain(&mut source, 10)[0][0];
    assert_eq!(row.get("name"), Some("Smith, J"));
  }

  #[test]
  fn invalid_utf8_records_are_skipped() {
    let mut bytes = b"a,b\n1,2\n".to_vec();
    bytes.extend_from_slice(b"\xff\xfe,3\n");
    bytes.extend_from_slice(b"4,5\n");
    let mut source = DelimitedSource::from_reader(Cursor::new(bytes), b',', true).unwrap();

    let rows = drain(&mut source, 10).concat();
    assert_eq!(rows.len(), 2);
    assert_eq!(rows[1].get("a"), Some("4"));
    assert_eq!(source.skipped(), 1);
  }

  #[test]
  fn open_reads_from_disk() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("taxa.csv");
    std::fs::write(&path, "scientific name,English name\nCardinalis cardinalis,Northern Cardinal\n")
      .unwrap();
    let cfg = SourceConfig { path: path.clone(), delimiter: ",".into(), quoting: true };

    let mut source = DelimitedSource::open(&path, &cfg).unwrap();
    let row = &drain(&mut source, 10)[0][0];
    assert_eq!(row.value("English name"), Some("Northern Cardinal"));
  }
}
