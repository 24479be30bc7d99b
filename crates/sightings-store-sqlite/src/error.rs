//! Error type for `sightings-store-sqlite`.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
  #[error("core error: {0}")]
  Core(#[from] sightings_core::Error),

  #[error("database error: {0}")]
  Database(#[from] tokio_rusqlite::Error),

  #[error("date/time parse error: {0}")]
  DateParse(String),

  #[error("day of year out of range: {0}")]
  DayOutOfRange(i64),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
