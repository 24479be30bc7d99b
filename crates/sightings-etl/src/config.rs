//! Runtime configuration, deserialised from `sightings.toml` and `SIGHTINGS_*`
//! environment variables.

use std::{
  collections::HashSet,
  path::{Path, PathBuf},
};

use anyhow::{Context as _, bail};
use serde::Deserialize;
use sightings_ingest::{PipelineOptions, profile::DatasetProfile, taxa::TaxonomyProfile};

fn default_chunk_size() -> usize { PipelineOptions::default().chunk_size }

fn default_prune_taxa() -> bool { PipelineOptions::default().prune_taxa }

fn default_export_dir() -> PathBuf { PathBuf::from("export") }

#[derive(Debug, Clone, Deserialize)]
pub struct EtlConfig {
  pub store_path: PathBuf,
  #[serde(default = "default_chunk_size")]
  pub chunk_size: usize,
  #[serde(default = "default_prune_taxa")]
  pub prune_taxa: bool,
  #[serde(default = "default_export_dir")]
  pub export_dir: PathBuf,
  /// Loaded before any dataset, in file order.
  #[serde(default)]
  pub taxonomies: Vec<TaxonomyEntry>,
  /// Loaded in file order.
  #[serde(default)]
  pub datasets:   Vec<DatasetEntry>,
  /// Directory relative paths are resolved against; the config file's own.
  #[serde(skip)]
  pub base_dir:   PathBuf,
}

/// Where a source file lives and how it is delimited.
#[derive(Debug, Clone, Deserialize)]
pub struct SourceConfig {
  pub path:      PathBuf,
  /// A single ASCII character; `"\t"` for TSV.
  #[serde(default = "default_delimiter")]
  pub delimiter: String,
  /// Off for dumps whose quote characters are data, not syntax.
  #[serde(default = "default_quoting")]
  pub quoting:   bool,
}

fn default_delimiter() -> String { ",".into() }

fn default_quoting() -> bool { true }

impl SourceConfig {
  pub fn delimiter_byte(&self) -> anyhow::Result<u8> {
    match self.delimiter.as_bytes() {
      [b] if b.is_ascii() => Ok(*b),
      _ => bail!("delimiter must be one ASCII character, got {:?}", self.delimiter),
    }
  }
}

#[derive(Debug, Clone, Deserialize)]
pub struct TaxonomyEntry {
  pub source:  SourceConfig,
  pub profile: TaxonomyProfile,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DatasetEntry {
  pub source:  SourceConfig,
  pub profile: DatasetProfile,
}

/// A configured source of either kind.
#[derive(Debug, Clone, Copy)]
pub enum Entry<'a> {
  Taxonomy(&'a TaxonomyEntry),
  Dataset(&'a DatasetEntry),
}

impl<'a> Entry<'a> {
  pub fn dataset_id(&self) -> &'a str {
    match self {
      Self::Taxonomy(t) => t.profile.dataset_id(),
      Self::Dataset(d) => d.profile.dataset_id(),
    }
  }

  pub fn source(&self) -> &'a SourceConfig {
    match self {
      Self::Taxonomy(t) => &t.source,
      Self::Dataset(d) => &d.source,
    }
  }
}

impl EtlConfig {
  /// Layer `path` (optional) under `SIGHTINGS_*` environment variables.
  pub fn load(path: &Path) -> anyhow::Result<Self> {
    let settings = config::Config::builder()
      .add_source(config::File::from(path).required(false))
      .add_source(config::Environment::with_prefix("SIGHTINGS"))
      .build()
      .context("failed to read config file")?;

    let mut cfg: Self = settings
      .try_deserialize()
      .context("failed to deserialise EtlConfig")?;
    cfg.base_dir = path.parent().map(Path::to_path_buf).unwrap_or_default();
    cfg.validate()?;
    Ok(cfg)
  }

  pub fn validate(&self) -> anyhow::Result<()> {
    if self.chunk_size == 0 {
      bail!("chunk_size must be positive");
    }
    let mut seen = HashSet::new();
    for entry in self.entries() {
      let id = entry.dataset_id();
      if !seen.insert(id) {
        bail!("dataset {id:?} is configured twice");
      }
      entry.source().delimiter_byte().with_context(|| format!("dataset {id:?}"))?;
    }
    for t in &self.taxonomies {
      t.profile.validate()?;
    }
    for d in &self.datasets {
      d.profile.validate()?;
    }
    Ok(())
  }

  /// Expand `~` and anchor relative paths at [`base_dir`](Self::base_dir).
  pub fn resolve(&self, path: &Path) -> PathBuf {
    let path = expand_tilde(path);
    if path.is_relative() { self.base_dir.join(path) } else { path }
  }

  pub fn pipeline_options(&self) -> PipelineOptions {
    PipelineOptions { chunk_size: self.chunk_size, prune_taxa: self.prune_taxa }
  }

  /// Every source in ingestion order: taxonomies first, then datasets.
  pub fn entries(&self) -> impl Iterator<Item = Entry<'_>> {
    self
      .taxonomies
      .iter()
      .map(Entry::Taxonomy)
      .chain(self.datasets.iter().map(Entry::Dataset))
  }

  /// The entries named in `ids`, in ingestion order regardless of the order
  /// given. Unknown ids are an error.
  pub fn select(&self, ids: &[String]) -> anyhow::Result<Vec<Entry<'_>>> {
    for id in ids {
      if !self.entries().any(|e| e.dataset_id() == id) {
        bail!("no dataset {id:?} in configuration");
      }
    }
    Ok(
      self
        .entries()
        .filter(|e| ids.iter().any(|id| id == e.dataset_id()))
        .collect(),
    )
  }
}

/// Expand a leading `~` to the user's home directory.
pub fn expand_tilde(path: &Path) -> PathBuf {
  let s = path.to_string_lossy();
  if let Some(rest) = s.strip_prefix("~/")
    && let Ok(home) = std::env::var("HOME")
  {
    return PathBuf::from(home).join(rest);
  }
  path.to_path_buf()
}

#[cfg(test)]
mod tests {
  use sightings_ingest::profile::{PlaceKeyRule, RadiusRule};

  use super::*;

  const SAMPLE: &str = r#"
store_path = "sightings.sqlite"
chunk_size = 500

[[taxonomies]]
source  = { path = "taxonomy/clements.csv" }
profile = { dataset = { dataset_id = "clements", version = "2017-07-27" }, sci_name = ["scientific name"], common_name = "English name", default_class = "aves", require = [{ field = "category", value = "species" }] }

[[datasets]]
source = { path = "raw/maps.tsv", delimiter = "\t", quoting = false }

[datasets.profile]
dataset = { dataset_id = "maps", title = "MAPS banding stations" }
place   = { lng = "DECLNG", lat = "DECLAT", key = { kind = "coordinates_radius" }, radius = { kind = "codes", field = "PRECISION", table = [{ code = "01S", meters = 30.92 }, { code = "10M", meters = 1113200.0 }] } }
event   = { date = { kind = "field", field = "DATE", formats = ["%m/%d/%Y"] }, started = "START", ended = "END", key = { kind = "place_date", extra = ["STATION"] } }
count   = { default = 1 }
taxon   = { fields = ["SCINAME"] }
"#;

  fn write_config(dir: &Path) -> PathBuf {
    let path = dir.join("sightings.toml");
    std::fs::write(&path, SAMPLE).unwrap();
    path
  }

  #[test]
  fn loads_profiles_from_toml() {
    let dir = tempfile::tempdir().unwrap();
    let cfg = EtlConfig::load(&write_config(dir.path())).unwrap();

    assert_eq!(cfg.chunk_size, 500);
    assert!(cfg.prune_taxa);
    assert_eq!(cfg.export_dir, PathBuf::from("export"));

    let maps = &cfg.datasets[0];
    assert_eq!(maps.source.delimiter_byte().unwrap(), b'\t');
    assert!(!maps.source.quoting);
    assert_eq!(maps.profile.place.key, PlaceKeyRule::CoordinatesRadius);
    assert!(matches!(&maps.profile.place.radius, RadiusRule::Codes { table, .. } if table.len() == 2));
    assert_eq!(maps.profile.count.default, Some(1));

    let clements = &cfg.taxonomies[0];
    assert_eq!(clements.profile.dataset.version, "2017-07-27");
    assert_eq!(clements.source.delimiter_byte().unwrap(), b',');

    assert_eq!(cfg.resolve(&maps.source.path), dir.path().join("raw/maps.tsv"));
    assert_eq!(cfg.resolve(Path::new("/srv/maps.tsv")), PathBuf::from("/srv/maps.tsv"));
  }

  #[test]
  fn rejects_multi_character_delimiters() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("sightings.toml");
    let text = SAMPLE.replace(r#"delimiter = "\t""#, r#"delimiter = "||""#);
    std::fs::write(&path, text).unwrap();

    let err = EtlConfig::load(&path).unwrap_err();
    assert!(format!("{err:#}").contains("delimiter"));
  }

  #[test]
  fn selection_follows_ingestion_order() {
    let dir = tempfile::tempdir().unwrap();
    let cfg = EtlConfig::load(&write_config(dir.path())).unwrap();

    let ids: Vec<&str> = cfg
      .select(&["maps".into(), "clements".into()])
      .unwrap()
      .iter()
      .map(|e| e.dataset_id())
      .collect();
    assert_eq!(ids, vec!["clements", "maps"]);

    assert!(cfg.select(&["pollard".into()]).is_err());
  }
}
