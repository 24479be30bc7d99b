//! Taxonomy loading.
//!
//! Taxa are shared by every dataset, so a taxonomy load only ever adds names
//! the store does not already have. The taxonomy's own dataset row marks its
//! authority as live; see [`replace`](crate::replace::replace) for pruning.

use std::collections::{BTreeMap, HashSet};

use chrono::Utc;
use serde::Deserialize;
use sightings_core::{
  attrs::{Attrs, DATASET_TAG},
  model::{Dataset, Table, Taxon},
  source::{RawRow, SourceAdapter},
  store::{SightingStore, TaxonKey},
};
use tracing::info;

use crate::{
  Error, Result,
  allocate::IdAllocator,
  coerce::normalize_whitespace,
  profile::FieldEquals,
};

/// Field map for a checklist of taxa.
#[derive(Debug, Clone, Deserialize)]
pub struct TaxonomyProfile {
  pub dataset:       Dataset,
  #[serde(default)]
  pub require:       Vec<FieldEquals>,
  /// Joined with single spaces to form the scientific name.
  pub sci_name:      Vec<String>,
  #[serde(default)]
  pub common_name:   Option<String>,
  #[serde(default)]
  pub class:         Option<String>,
  #[serde(default)]
  pub order:         Option<String>,
  #[serde(default)]
  pub family:        Option<String>,
  /// When unset, the first word of the scientific name.
  #[serde(default)]
  pub genus:         Option<String>,
  /// Class for rows without a class field value, e.g. `"aves"`.
  #[serde(default)]
  pub default_class: Option<String>,
  /// Scientific names to flag as targets.
  #[serde(default)]
  pub targets:       Vec<String>,
  /// Add one `"<Genus> sp."` taxon per genus that holds a target.
  #[serde(default)]
  pub add_genera:    bool,
}

impl TaxonomyProfile {
  pub fn dataset_id(&self) -> &str { &self.dataset.dataset_id }

  pub fn validate(&self) -> Result<()> {
    if self.dataset_id().trim().is_empty() {
      return Err(Error::InvalidProfile("taxonomy dataset_id is empty".into()));
    }
    if self.sci_name.is_empty() || self.sci_name.iter().any(|f| f.trim().is_empty()) {
      return Err(Error::InvalidProfile(format!(
        "{}: sci_name needs at least one non-empty field",
        self.dataset_id()
      )));
    }
    Ok(())
  }

  fn consumed(&self) -> HashSet<&str> {
    let mut fields: HashSet<&str> = self.sci_name.iter().map(String::as_str).collect();
    fields.extend(
      [&self.common_name, &self.class, &self.order, &self.family, &self.genus]
        .into_iter()
        .flatten()
        .map(String::as_str),
    );
    fields.extend(self.require.iter().map(|r| r.field.as_str()));
    fields
  }

  fn taxon(&self, row: &RawRow, sci_name: String, targets: &HashSet<String>, consumed: &HashSet<&str>) -> Taxon {
    let field = |f: &Option<String>| f.as_deref().and_then(|f| row.value(f)).map(str::to_owned);

    let mut attrs = Attrs::new();
    for (k, v) in row.iter().filter(|(k, _)| !consumed.contains(k)) {
      attrs.insert_raw(k, v);
    }
    attrs.insert(DATASET_TAG, self.dataset_id());

    Taxon {
      taxon_id:    0,
      genus:       field(&self.genus)
        .or_else(|| sci_name.split(' ').next().map(str::to_owned)),
      class:       field(&self.class).or_else(|| self.default_class.clone()),
      order:       field(&self.order),
      family:      field(&self.family),
      common_name: field(&self.common_name),
      target:      targets.contains(&sci_name),
      sci_name:    Some(sci_name),
      attrs,
    }
  }
}

/// Rows added by [`load_taxa`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TaxaReport {
  pub added:   u64,
  pub skipped: u64,
  pub genera:  u64,
}

/// Insert the taxonomy's dataset row and every taxon the store lacks.
pub async fn load_taxa<S: SightingStore, A: SourceAdapter>(
  store: &S,
  profile: &TaxonomyProfile,
  source: &mut A,
  chunk_size: usize,
) -> Result<TaxaReport> {
  profile.validate()?;
  let dataset_id = profile.dataset_id();

  let mut dataset = profile.dataset.clone();
  dataset.extracted = Some(Utc::now());
  store.insert_dataset(&dataset).await.map_err(Error::from_store)?;

  let mut known: HashSet<String> = store
    .taxon_index(&TaxonKey::SciName, false)
    .await
    .map_err(Error::from_store)?
    .into_keys()
    .collect();
  let mut ids = IdAllocator::seed(store).await?;

  let targets: HashSet<String> = profile.targets.iter().map(|t| normalize_whitespace(t)).collect();
  let consumed = profile.consumed();
  // First target species seen in each genus.
  let mut genera: BTreeMap<String, Taxon> = BTreeMap::new();
  let mut report = TaxaReport::default();

  info!(dataset = %dataset_id, "inserting taxa");
  while let Some(rows) = source.next_batch(chunk_size.max(1)).map_err(Error::from_source)? {
    let mut batch = Vec::new();
    for row in &rows {
      if !profile.require.iter().all(|r| r.matches(row)) {
        continue;
      }
      let Some(parts) = profile
        .sci_name
        .iter()
        .map(|f| row.value(f))
        .collect::<Option<Vec<_>>>()
      else {
        continue;
      };
      let sci_name = normalize_whitespace(&parts.join(" "));
      let taxon = profile.taxon(row, sci_name, &targets, &consumed);

      // Genus records follow the checklist, even for species already stored.
      if profile.add_genera
        && taxon.target
        && let Some(genus) = &taxon.genus
      {
        genera.entry(genus.clone()).or_insert_with(|| taxon.clone());
      }

      let is_new = taxon.sci_name.as_ref().is_some_and(|n| known.insert(n.clone()));
      if is_new {
        batch.push(taxon);
      } else {
        report.skipped += 1;
      }
    }

    report.added += append(store, &mut ids, batch).await?;
  }

  let genus_taxa: Vec<Taxon> = genera
    .into_iter()
    .filter_map(|(genus, member)| {
      let sci_name = format!("{genus} sp.");
      known.insert(sci_name.clone()).then(|| {
        let mut attrs = Attrs::tagged(dataset_id);
        attrs.insert("genus_record", true);
        Taxon {
          taxon_id: 0,
          sci_name: Some(sci_name),
          class: member.class,
          order: member.order,
          family: member.family,
          genus: Some(genus),
          common_name: None,
          target: false,
          attrs,
        }
      })
    })
    .collect();
  report.genera = append(store, &mut ids, genus_taxa).await?;

  info!(
    dataset = %dataset_id,
    added = report.added,
    skipped = report.skipped,
    genera = report.genera,
    "inserted taxa"
  );
  Ok(report)
}

async fn append<S: SightingStore>(store: &S, ids: &mut IdAllocator, mut taxa: Vec<Taxon>) -> Result<u64> {
  if taxa.is_empty() {
    return Ok(0);
  }
  let start = ids.allocate(Table::Taxa, taxa.len())?;
  for (taxon_id, taxon) in (start..).zip(taxa.iter_mut()) {
    taxon.taxon_id = taxon_id;
  }
  let n = store.append_taxa(taxa).await.map_err(Error::from_store)?;
  Ok(n as u64)
}
