//! [`SqliteStore`], the SQLite implementation of [`SightingStore`].

use std::{collections::HashMap, path::Path};

use rusqlite::OptionalExtension as _;
use sightings_core::{
  model::{Count, Dataset, Event, Place, Table, Taxon, TaxonId},
  store::{IntegrityReport, ReplaceSummary, RowCounts, SightingStore, TaxonKey},
};

use crate::{
  Result,
  encode::{
    CountColumns, EventColumns, PlaceColumns, RawDataset, TaxonColumns, encode_dt,
  },
  schema::{CREATE_SECONDARY_INDEXES, DROP_SECONDARY_INDEXES, PRAGMAS, SCHEMA},
};

// ─── Store ───────────────────────────────────────────────────────────────────

/// A sightings store backed by a single SQLite file.
///
/// Cloning is cheap; the inner connection is reference-counted. Every clone
/// talks to the same connection, so connection-level pragmas set by the
/// bulk-load window apply to all of them.
#[derive(Clone)]
pub struct SqliteStore {
  conn: tokio_rusqlite::Connection,
}

impl SqliteStore {
  /// Open or create the database file at `path` and apply the schema.
  pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
    let conn = tokio_rusqlite::Connection::open(path).await?;
    let store = Self { conn };
    store.init_schema().await?;
    Ok(store)
  }

  /// A private in-memory store, used by tests.
  pub async fn open_in_memory() -> Result<Self> {
    let conn = tokio_rusqlite::Connection::open_in_memory().await?;
    let store = Self { conn };
    store.init_schema().await?;
    Ok(store)
  }

  async fn init_schema(&self) -> Result<()> {
    self
      .conn
      .call(|conn| {
        conn.execute_batch(PRAGMAS)?;
        conn.execute_batch(SCHEMA)?;
        conn.execute_batch(CREATE_SECONDARY_INDEXES)?;
        Ok(())
      })
      .await?;
    Ok(())
  }

  /// Names of the indexes currently defined on the entity tables.
  pub async fn index_names(&self) -> Result<Vec<String>> {
    let names = self
      .conn
      .call(|conn| {
        let mut stmt = conn.prepare(
          "SELECT name FROM sqlite_master
            WHERE type = 'index' AND name NOT LIKE 'sqlite_%'
            ORDER BY name",
        )?;
        let rows = stmt
          .query_map([], |row| row.get(0))?
          .collect::<rusqlite::Result<Vec<String>>>()?;
        Ok(rows)
      })
      .await?;
    Ok(names)
  }

  async fn count_rows(&self, sql: &'static str, dataset_id: &str) -> Result<u64> {
    let dataset_id = dataset_id.to_owned();
    let n: i64 = self
      .conn
      .call(move |conn| Ok(conn.query_row(sql, rusqlite::params![dataset_id], |r| r.get(0))?))
      .await?;
    Ok(n.max(0) as u64)
  }
}

// ─── SightingStore impl ──────────────────────────────────────────────────────

impl SightingStore for SqliteStore {
  type Error = crate::Error;

  // ── Scalars ───────────────────────────────────────────────────────────────

  async fn max_id(&self, table: Table) -> Result<i64> {
    let sql = format!(
      "SELECT COALESCE(MAX({}), 0) FROM {}",
      table.id_column(),
      table.name()
    );
    let max = self
      .conn
      .call(move |conn| Ok(conn.query_row(&sql, [], |r| r.get(0))?))
      .await?;
    Ok(max)
  }

  // ── Datasets ──────────────────────────────────────────────────────────────

  async fn insert_dataset(&self, dataset: &Dataset) -> Result<()> {
    let d = dataset.clone();
    let extracted = d.extracted.map(encode_dt);

    self
      .conn
      .call(move |conn| {
        conn.execute(
          "INSERT INTO datasets (dataset_id, version, title, url, extracted)
           VALUES (?1, ?2, ?3, ?4, ?5)",
          rusqlite::params![d.dataset_id, d.version, d.title, d.url, extracted],
        )?;
        Ok(())
      })
      .await?;
    Ok(())
  }

  async fn get_dataset(&self, dataset_id: &str) -> Result<Option<Dataset>> {
    let id = dataset_id.to_owned();

    let raw: Option<RawDataset> = self
      .conn
      .call(move |conn| {
        Ok(
          conn
            .query_row(
              "SELECT dataset_id, version, title, url, extracted
                 FROM datasets WHERE dataset_id = ?1",
              rusqlite::params![id],
              |row| {
                Ok(RawDataset {
                  dataset_id: row.get(0)?,
                  version:    row.get(1)?,
                  title:      row.get(2)?,
                  url:        row.get(3)?,
                  extracted:  row.get(4)?,
                })
              },
            )
            .optional()?,
        )
      })
      .await?;

    raw.map(RawDataset::into_dataset).transpose()
  }

  async fn delete_dataset(&self, dataset_id: &str) -> Result<ReplaceSummary> {
    let id = dataset_id.to_owned();

    let summary = self
      .conn
      .call(move |conn| {
        // Dependents go before the rows they reference, so a reader never
        // sees a count without its event or an event without its place.
        let tx = conn.transaction()?;
        let datasets = tx.execute("DELETE FROM datasets WHERE dataset_id = ?1", [&id])?;
        let counts = tx.execute("DELETE FROM counts WHERE dataset_id = ?1", [&id])?;
        let events = tx.execute("DELETE FROM events WHERE dataset_id = ?1", [&id])?;
        let places = tx.execute("DELETE FROM places WHERE dataset_id = ?1", [&id])?;
        tx.commit()?;

        Ok(ReplaceSummary {
          datasets: datasets as u64,
          places:   places as u64,
          events:   events as u64,
          counts:   counts as u64,
          taxa:     0,
        })
      })
      .await?;

    Ok(summary)
  }

  async fn prune_orphan_taxa(&self) -> Result<u64> {
    let removed = self
      .conn
      .call(|conn| {
        Ok(conn.execute(
          "DELETE FROM taxa
            WHERE COALESCE(json_extract(taxon_attrs, '$.dataset_id'), '')
                  NOT IN (SELECT dataset_id FROM datasets)
              AND taxon_id NOT IN (SELECT taxon_id FROM counts)",
          [],
        )?)
      })
      .await?;
    Ok(removed as u64)
  }

  // ── Bulk appends ──────────────────────────────────────────────────────────

  async fn append_taxa(&self, rows: Vec<Taxon>) -> Result<usize> {
    if rows.is_empty() {
      return Ok(0);
    }
    let rows = rows
      .into_iter()
      .map(TaxonColumns::encode)
      .collect::<Result<Vec<_>>>()?;
    let n = rows.len();

    self
      .conn
      .call(move |conn| {
        let tx = conn.transaction()?;
        {
          let mut stmt = tx.prepare_cached(
            r#"INSERT INTO taxa (
                 taxon_id, sci_name, "class", "order", family, genus,
                 common_name, target, taxon_attrs
               ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)"#,
          )?;
          for t in &rows {
            stmt.execute(rusqlite::params![
              t.taxon_id,
              t.sci_name,
              t.class,
              t.order,
              t.family,
              t.genus,
              t.common_name,
              t.target,
              t.attrs,
            ])?;
          }
        }
        tx.commit()?;
        Ok(())
      })
      .await?;
    Ok(n)
  }

  async fn append_places(&self, rows: Vec<Place>) -> Result<usize> {
    if rows.is_empty() {
      return Ok(0);
    }
    let rows = rows
      .into_iter()
      .map(PlaceColumns::encode)
      .collect::<Result<Vec<_>>>()?;
    let n = rows.len();

    self
      .conn
      .call(move |conn| {
        let tx = conn.transaction()?;
        {
          let mut stmt = tx.prepare_cached(
            "INSERT INTO places (place_id, dataset_id, lng, lat, radius, place_attrs)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
          )?;
          for p in &rows {
            stmt.execute(rusqlite::params![
              p.place_id,
              p.dataset_id,
              p.lng,
              p.lat,
              p.radius,
              p.attrs,
            ])?;
          }
        }
        tx.commit()?;
        Ok(())
      })
      .await?;
    Ok(n)
  }

  async fn append_events(&self, rows: Vec<Event>) -> Result<usize> {
    if rows.is_empty() {
      return Ok(0);
    }
    let rows = rows
      .into_iter()
      .map(EventColumns::encode)
      .collect::<Result<Vec<_>>>()?;
    let n = rows.len();

    self
      .conn
      .call(move |conn| {
        let tx = conn.transaction()?;
        {
          let mut stmt = tx.prepare_cached(
            "INSERT INTO events (
               event_id, place_id, dataset_id, year, day, started, ended, event_attrs
             ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
          )?;
          for e in &rows {
            stmt.execute(rusqlite::params![
              e.event_id,
              e.place_id,
              e.dataset_id,
              e.year,
              e.day,
              e.started,
              e.ended,
              e.attrs,
            ])?;
          }
        }
        tx.commit()?;
        Ok(())
      })
      .await?;
    Ok(n)
  }

  async fn append_counts(&self, rows: Vec<Count>) -> Result<usize> {
    if rows.is_empty() {
      return Ok(0);
    }
    let rows = rows
      .into_iter()
      .map(CountColumns::encode)
      .collect::<Result<Vec<_>>>()?;
    let n = rows.len();

    self
      .conn
      .call(move |conn| {
        let tx = conn.transaction()?;
        {
          let mut stmt = tx.prepare_cached(
            "INSERT INTO counts (
               count_id, event_id, taxon_id, dataset_id, count, count_attrs
             ) VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
          )?;
          for c in &rows {
            stmt.execute(rusqlite::params![
              c.count_id,
              c.event_id,
              c.taxon_id,
              c.dataset_id,
              c.count,
              c.attrs,
            ])?;
          }
        }
        tx.commit()?;
        Ok(())
      })
      .await?;
    Ok(n)
  }

  // ── Lookups ───────────────────────────────────────────────────────────────

  async fn taxon_index(
    &self,
    key: &TaxonKey,
    targets_only: bool,
  ) -> Result<HashMap<String, TaxonId>> {
    let target_clause = if targets_only { "AND target = 1" } else { "" };

    // Highest ids first, so that when a key is ambiguous the lowest id wins
    // the final insert into the map.
    let (sql, path) = match key {
      TaxonKey::SciName => (
        format!(
          "SELECT sci_name, taxon_id FROM taxa
            WHERE sci_name IS NOT NULL {target_clause}
            ORDER BY taxon_id DESC"
        ),
        None,
      ),
      TaxonKey::Code { name } => (
        format!(
          "SELECT CAST(json_extract(taxon_attrs, ?1) AS TEXT), taxon_id FROM taxa
            WHERE json_extract(taxon_attrs, ?1) IS NOT NULL {target_clause}
            ORDER BY taxon_id DESC"
        ),
        Some(format!("$.\"{name}\"")),
      ),
    };

    let pairs: Vec<(String, TaxonId)> = self
      .conn
      .call(move |conn| {
        let mut stmt = conn.prepare(&sql)?;
        let map_row = |row: &rusqlite::Row<'_>| -> rusqlite::Result<(String, TaxonId)> {
          Ok((row.get(0)?, row.get(1)?))
        };
        let rows = match path {
          Some(p) => stmt
            .query_map(rusqlite::params![p], map_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?,
          None => stmt.query_map([], map_row)?.collect::<rusqlite::Result<Vec<_>>>()?,
        };
        Ok(rows)
      })
      .await?;

    Ok(pairs.into_iter().collect())
  }

  // ── Bulk-load window ──────────────────────────────────────────────────────

  async fn suspend_indexes(&self) -> Result<()> {
    self
      .conn
      .call(|conn| {
        conn.execute_batch(DROP_SECONDARY_INDEXES)?;
        Ok(())
      })
      .await?;
    Ok(())
  }

  async fn restore_indexes(&self) -> Result<()> {
    self
      .conn
      .call(|conn| {
        conn.execute_batch(CREATE_SECONDARY_INDEXES)?;
        Ok(())
      })
      .await?;
    Ok(())
  }

  // ── Reads ─────────────────────────────────────────────────────────────────

  async fn taxa(&self) -> Result<Vec<Taxon>> {
    let raws: Vec<TaxonColumns> = self
      .conn
      .call(|conn| {
        let mut stmt = conn.prepare(
          r#"SELECT taxon_id, sci_name, "class", "order", family, genus,
                    common_name, target, taxon_attrs
               FROM taxa ORDER BY taxon_id"#,
        )?;
        let rows = stmt
          .query_map([], |row| {
            Ok(TaxonColumns {
              taxon_id:    row.get(0)?,
              sci_name:    row.get(1)?,
              class:       row.get(2)?,
              order:       row.get(3)?,
              family:      row.get(4)?,
              genus:       row.get(5)?,
              common_name: row.get(6)?,
              target:      row.get(7)?,
              attrs:       row.get(8)?,
            })
          })?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;

    raws.into_iter().map(TaxonColumns::decode).collect()
  }

  async fn places(&self, dataset_id: &str) -> Result<Vec<Place>> {
    let id = dataset_id.to_owned();

    let raws: Vec<PlaceColumns> = self
      .conn
      .call(move |conn| {
        let mut stmt = conn.prepare(
          "SELECT place_id, dataset_id, lng, lat, radius, place_attrs
             FROM places WHERE dataset_id = ?1 ORDER BY place_id",
        )?;
        let rows = stmt
          .query_map(rusqlite::params![id], |row| {
            Ok(PlaceColumns {
              place_id:   row.get(0)?,
              dataset_id: row.get(1)?,
              lng:        row.get(2)?,
              lat:        row.get(3)?,
              radius:     row.get(4)?,
              attrs:      row.get(5)?,
            })
          })?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;

    raws.into_iter().map(PlaceColumns::decode).collect()
  }

  async fn events(&self, dataset_id: &str) -> Result<Vec<Event>> {
    let id = dataset_id.to_owned();

    let raws: Vec<EventColumns> = self
      .conn
      .call(move |conn| {
        let mut stmt = conn.prepare(
          "SELECT event_id, place_id, dataset_id, year, day, started, ended, event_attrs
             FROM events WHERE dataset_id = ?1 ORDER BY event_id",
        )?;
        let rows = stmt
          .query_map(rusqlite::params![id], |row| {
            Ok(EventColumns {
              event_id:   row.get(0)?,
              place_id:   row.get(1)?,
              dataset_id: row.get(2)?,
              year:       row.get(3)?,
              day:        row.get(4)?,
              started:    row.get(5)?,
              ended:      row.get(6)?,
              attrs:      row.get(7)?,
            })
          })?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;

    raws.into_iter().map(EventColumns::decode).collect()
  }

  async fn counts(&self, dataset_id: &str) -> Result<Vec<Count>> {
    let id = dataset_id.to_owned();

    let raws: Vec<CountColumns> = self
      .conn
      .call(move |conn| {
        let mut stmt = conn.prepare(
          "SELECT count_id, event_id, taxon_id, dataset_id, count, count_attrs
             FROM counts WHERE dataset_id = ?1 ORDER BY count_id",
        )?;
        let rows = stmt
          .query_map(rusqlite::params![id], |row| {
            Ok(CountColumns {
              count_id:   row.get(0)?,
              event_id:   row.get(1)?,
              taxon_id:   row.get(2)?,
              dataset_id: row.get(3)?,
              count:      row.get(4)?,
              attrs:      row.get(5)?,
            })
          })?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;

    raws.into_iter().map(CountColumns::decode).collect()
  }

  async fn row_counts(&self, dataset_id: &str) -> Result<RowCounts> {
    Ok(RowCounts {
      places: self
        .count_rows("SELECT COUNT(*) FROM places WHERE dataset_id = ?1", dataset_id)
        .await?,
      events: self
        .count_rows("SELECT COUNT(*) FROM events WHERE dataset_id = ?1", dataset_id)
        .await?,
      counts: self
        .count_rows("SELECT COUNT(*) FROM counts WHERE dataset_id = ?1", dataset_id)
        .await?,
    })
  }

  async fn integrity(&self, dataset_id: &str) -> Result<IntegrityReport> {
    Ok(IntegrityReport {
      events_without_place: self
        .count_rows(
          "SELECT COUNT(*) FROM events e
            WHERE e.dataset_id = ?1
              AND NOT EXISTS (SELECT 1 FROM places p WHERE p.place_id = e.place_id)",
          dataset_id,
        )
        .await?,
      counts_without_event: self
        .count_rows(
          "SELECT COUNT(*) FROM counts c
            WHERE c.dataset_id = ?1
              AND NOT EXISTS (SELECT 1 FROM events e WHERE e.event_id = c.event_id)",
          dataset_id,
        )
        .await?,
      counts_without_taxon: self
        .count_rows(
          "SELECT COUNT(*) FROM counts c
            WHERE c.dataset_id = ?1
              AND NOT EXISTS (SELECT 1 FROM taxa t WHERE t.taxon_id = c.taxon_id)",
          dataset_id,
        )
        .await?,
    })
  }
}
