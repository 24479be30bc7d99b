//! File-to-store tests: config on disk, delimited sources, SQLite in memory.

use std::path::Path;

use sightings_core::store::SightingStore;
use sightings_ingest::Pipeline;
use sightings_store_sqlite::SqliteStore;

use crate::{EntryReport, EtlConfig, export::export_dataset, ingest_all, ingest_entries};

const TAXONOMY: &str = "\
scientific name,English name,category
Turdus migratorius,American Robin,species
Turdus grayi,Clay-colored Thrush,species
Turdus migratorius achrusterus,American Robin (southern),subspecies
";

const CHECKLISTS: &str = "\
LATITUDE\tLONGITUDE\tOBSERVATION DATE\tSCIENTIFIC NAME\tOBSERVATION COUNT\tLOCALITY
34.0\t-85.0\t2020-01-01\tTurdus migratorius\t2\tJoe's \"big\" pond
34.0\t-85.0\t2020-01-01\tTurdus grayi\tX\tJoe's \"big\" pond
33.0\t-84.5\t2020-06-01\tTurdus migratorius\t5\tRidge
33.0\t-84.5\tsometime\tTurdus migratorius\t1\tRidge
";

const CONFIG: &str = r#"
store_path = "sightings.sqlite"
chunk_size = 2

[[taxonomies]]
source = { path = "clements.csv" }

[taxonomies.profile]
dataset     = { dataset_id = "clements" }
sci_name    = ["scientific name"]
common_name = "English name"
require     = [{ field = "category", value = "species" }]

[[datasets]]
source = { path = "ebird.tsv", delimiter = "\t", quoting = false }

[datasets.profile]
dataset = { dataset_id = "ebird" }
place   = { lng = "LONGITUDE", lat = "LATITUDE", attrs = ["LOCALITY"] }
event   = { date = { kind = "field", field = "OBSERVATION DATE" } }
count   = { field = "OBSERVATION COUNT" }
taxon   = { fields = ["SCIENTIFIC NAME"] }
"#;

fn write_workspace(dir: &Path) -> EtlConfig {
  std::fs::write(dir.join("clements.csv"), TAXONOMY).unwrap();
  std::fs::write(dir.join("ebird.tsv"), CHECKLISTS).unwrap();
  let path = dir.join("sightings.toml");
  std::fs::write(&path, CONFIG).unwrap();
  EtlConfig::load(&path).unwrap()
}

async fn pipeline(cfg: &EtlConfig) -> Pipeline<SqliteStore> {
  let store = SqliteStore::open_in_memory().await.unwrap();
  Pipeline::new(store, cfg.pipeline_options())
}

#[tokio::test]
async fn ingest_all_loads_taxonomy_then_checklists() {
  let dir = tempfile::tempdir().unwrap();
  let cfg = write_workspace(dir.path());
  let p = pipeline(&cfg).await;

  let reports = ingest_all(&p, &cfg).await.unwrap();
  let ids: Vec<&str> = reports.iter().map(EntryReport::dataset_id).collect();
  assert_eq!(ids, vec!["clements", "ebird"]);

  let EntryReport::Taxonomy { taxa, .. } = &reports[0] else { panic!("taxonomy first") };
  assert_eq!(taxa.added, 2);

  let EntryReport::Dataset { ingest, skipped_records, .. } = &reports[1] else {
    panic!("dataset second")
  };
  assert_eq!(*skipped_records, 0);
  assert_eq!(ingest.chunks, 2);
  assert_eq!(ingest.stats.rows, 4);
  assert_eq!(ingest.stats.bad_date, 1);
  assert_eq!(ingest.stats.places, 2);
  assert_eq!(ingest.stats.events, 2);
  assert_eq!(ingest.stats.counts, 3);

  let places = p.store().places("ebird").await.unwrap();
  let locality = places[0].attrs.get("LOCALITY").and_then(|v| v.as_str());
  assert_eq!(locality, Some("Joe's \"big\" pond"));
  assert!(p.audit("ebird").await.unwrap().is_clean());
}

#[tokio::test]
async fn reloading_one_dataset_replaces_it() {
  let dir = tempfile::tempdir().unwrap();
  let cfg = write_workspace(dir.path());
  let p = pipeline(&cfg).await;
  ingest_all(&p, &cfg).await.unwrap();
  let before = p.store().row_counts("ebird").await.unwrap();

  let entries = cfg.select(&["ebird".into()]).unwrap();
  let reports = ingest_entries(&p, &cfg, &entries).await.unwrap();

  let EntryReport::Dataset { replaced, .. } = &reports[0] else { panic!("dataset") };
  assert_eq!(replaced.counts, 3);
  assert_eq!(p.store().row_counts("ebird").await.unwrap(), before);
  assert_eq!(p.store().taxa().await.unwrap().len(), 2);
}

#[tokio::test]
async fn missing_source_file_names_the_path() {
  let dir = tempfile::tempdir().unwrap();
  let cfg = write_workspace(dir.path());
  std::fs::remove_file(dir.path().join("ebird.tsv")).unwrap();
  let p = pipeline(&cfg).await;

  let err = ingest_all(&p, &cfg).await.unwrap_err();
  assert!(format!("{err:#}").contains("ebird.tsv"));
}

#[tokio::test]
async fn export_writes_one_file_per_table() {
  let dir = tempfile::tempdir().unwrap();
  let cfg = write_workspace(dir.path());
  let p = pipeline(&cfg).await;
  ingest_all(&p, &cfg).await.unwrap();

  let out = dir.path().join("export");
  let summary = export_dataset(p.store(), "ebird", &out).await.unwrap();
  assert_eq!((summary.places, summary.events, summary.counts), (2, 2, 3));

  let mut reader = csv::Reader::from_path(out.join("ebird").join("counts.csv")).unwrap();
  let rows: Vec<csv::StringRecord> = reader.records().map(Result::unwrap).collect();
  assert_eq!(rows.len(), 3);
  assert_eq!(&rows[1][3], "Turdus grayi");
  assert_eq!(&rows[1][4], "X");

  let mut reader = csv::Reader::from_path(out.join("ebird").join("events.csv")).unwrap();
  let days: Vec<String> = reader
    .records()
    .map(|r| r.unwrap()[3].to_owned())
    .collect();
  assert_eq!(days, vec!["1", "153"]);

  assert!(export_dataset(p.store(), "pollard", &out).await.is_err());
}
