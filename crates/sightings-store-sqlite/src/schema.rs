//! SQL schema for the sightings SQLite store.
//!
//! Executed once at connection startup. Future migrations will be gated on
//! `PRAGMA user_version`.

/// Connection-level settings applied before the schema.
pub const PRAGMAS: &str = "
PRAGMA page_size    = 65536;
PRAGMA busy_timeout = 10000;
PRAGMA journal_mode = WAL;
PRAGMA foreign_keys = ON;
";

/// Full schema DDL; idempotent thanks to `IF NOT EXISTS`.
pub const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS datasets (
    dataset_id TEXT PRIMARY KEY,
    version    TEXT NOT NULL DEFAULT '',
    title      TEXT NOT NULL DEFAULT '',
    url        TEXT NOT NULL DEFAULT '',
    extracted  TEXT                      -- RFC 3339 UTC
);

-- Shared by every dataset. The classification authority is the
-- `dataset_id` member of taxon_attrs.
CREATE TABLE IF NOT EXISTS taxa (
    taxon_id    INTEGER PRIMARY KEY,
    sci_name    TEXT,
    \"class\"     TEXT,
    \"order\"     TEXT,
    family      TEXT,
    genus       TEXT,
    common_name TEXT,
    target      INTEGER NOT NULL DEFAULT 0,
    taxon_attrs TEXT NOT NULL DEFAULT '{}'
);

CREATE TABLE IF NOT EXISTS places (
    place_id    INTEGER PRIMARY KEY,
    dataset_id  TEXT NOT NULL,
    lng         REAL NOT NULL,
    lat         REAL NOT NULL,
    radius      REAL,                    -- meters; NULL = exact
    place_attrs TEXT NOT NULL DEFAULT '{}'
);

CREATE TABLE IF NOT EXISTS events (
    event_id    INTEGER PRIMARY KEY,
    place_id    INTEGER NOT NULL REFERENCES places(place_id),
    dataset_id  TEXT NOT NULL,
    year        INTEGER NOT NULL,
    day         INTEGER NOT NULL CHECK (day BETWEEN 1 AND 366),
    started     TEXT,                    -- HH:MM or NULL
    ended       TEXT,                    -- HH:MM or NULL
    event_attrs TEXT NOT NULL DEFAULT '{}'
);

CREATE TABLE IF NOT EXISTS counts (
    count_id    INTEGER PRIMARY KEY,
    event_id    INTEGER NOT NULL REFERENCES events(event_id),
    taxon_id    INTEGER NOT NULL REFERENCES taxa(taxon_id),
    dataset_id  TEXT NOT NULL,
    count       INTEGER,                 -- NULL = present, not counted
    count_attrs TEXT NOT NULL DEFAULT '{}'
);

-- Ownership and reference indexes stay in place for the whole run; dataset
-- replacement and foreign-key checks rely on them.
CREATE INDEX IF NOT EXISTS taxa_sci_name_idx   ON taxa(sci_name);
CREATE INDEX IF NOT EXISTS places_dataset_idx  ON places(dataset_id);
CREATE INDEX IF NOT EXISTS events_dataset_idx  ON events(dataset_id);
CREATE INDEX IF NOT EXISTS events_place_idx    ON events(place_id);
CREATE INDEX IF NOT EXISTS counts_dataset_idx  ON counts(dataset_id);
CREATE INDEX IF NOT EXISTS counts_event_idx    ON counts(event_id);
CREATE INDEX IF NOT EXISTS counts_taxon_idx    ON counts(taxon_id);

PRAGMA user_version = 1;
";

/// Secondary indexes rebuilt at the end of a bulk load.
pub const CREATE_SECONDARY_INDEXES: &str = "
CREATE INDEX IF NOT EXISTS places_lng_lat_idx  ON places(lng, lat);
CREATE INDEX IF NOT EXISTS events_year_day_idx ON events(year, day);
PRAGMA foreign_keys = ON;
PRAGMA synchronous  = NORMAL;
";

/// Secondary indexes dropped for the duration of a bulk load.
pub const DROP_SECONDARY_INDEXES: &str = "
DROP INDEX IF EXISTS places_lng_lat_idx;
DROP INDEX IF EXISTS events_year_day_idx;
PRAGMA foreign_keys = OFF;
PRAGMA synchronous  = OFF;
";
