//! Error types for `sightings-core`.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
  #[error("attribute blob is not a JSON object: {0}")]
  AttrsNotObject(String),

  #[error("unsupported attribute value for key {0:?}")]
  UnsupportedAttrValue(String),

  #[error("unknown table: {0:?}")]
  UnknownTable(String),

  #[error("serialization error: {0}")]
  Serialization(#[from] serde_json::Error),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
