//! Core types and trait definitions for the sightings database.
//!
//! This crate is deliberately free of database and file-format dependencies.
//! The SQLite backend, the ingestion pipeline, and the ETL binary all depend
//! on it; it depends on nothing of theirs.

// Store methods spell out their `Send` futures; implementations use `async fn`.
#![allow(async_fn_in_trait)]

pub mod attrs;
pub mod error;
pub mod key;
pub mod model;
pub mod source;
pub mod store;

pub use error::{Error, Result};
