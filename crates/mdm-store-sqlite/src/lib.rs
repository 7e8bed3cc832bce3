//! SQLite backend for the MDM engine.
//!
//! Implements both [`mdm_core::store::RecordAccessor`] and
//! [`mdm_core::store::RelationshipStore`] over a single database. Wraps
//! [`tokio_rusqlite`] so all database access runs on a dedicated thread
//! without blocking the async runtime.

mod encode;
mod schema;
mod store;

pub mod error;

pub use error::{Error, Result};
pub use store::SqliteStore;

#[cfg(test)]
mod tests;
