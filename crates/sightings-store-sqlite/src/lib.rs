//! SQLite backend for the sightings database.
//!
//! Every statement runs on the [`tokio_rusqlite`] connection thread, so callers
//! on the async runtime never block on SQLite I/O.

mod encode;
mod schema;
mod store;

pub mod error;

pub use error::{Error, Result};
pub use store::SqliteStore;
