//! Error type for `sightings-ingest`.
//!
//! Malformed source values are not errors here; they are counted in
//! [`NormalizeStats`](crate::normalize::NormalizeStats) and the row is
//! skipped. Everything below aborts the run.

use sightings_core::model::Table;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
  #[error("invalid profile: {0}")]
  InvalidProfile(String),

  #[error("surrogate id space exhausted for table {0}")]
  IdOverflow(Table),

  #[error("store error: {0}")]
  Store(#[source] Box<dyn std::error::Error + Send + Sync>),

  #[error("source error: {0}")]
  Source(#[source] Box<dyn std::error::Error + Send + Sync>),
}

impl Error {
  pub(crate) fn from_store<E: std::error::Error + Send + Sync + 'static>(e: E) -> Self {
    Self::Store(Box::new(e))
  }

  pub(crate) fn from_source<E: std::error::Error + Send + Sync + 'static>(e: E) -> Self {
    Self::Source(Box::new(e))
  }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
