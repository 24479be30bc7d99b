//! The sightings normalisation pipeline.
//!
//! Generic over any [`SightingStore`](sightings_core::store::SightingStore)
//! and any [`SourceAdapter`](sightings_core::source::SourceAdapter). One
//! ingestion run per dataset: [`Pipeline::replace`] clears the old rows, then
//! [`Pipeline::ingest`] streams the source through the normaliser inside a
//! bulk-load window.

pub mod allocate;
pub mod bulk;
pub mod chunk;
pub mod coerce;
pub mod error;
pub mod normalize;
pub mod pipeline;
pub mod profile;
pub mod replace;
pub mod resolve;
pub mod taxa;

pub use error::{Error, Result};
pub use pipeline::{IngestReport, Pipeline, PipelineOptions};
