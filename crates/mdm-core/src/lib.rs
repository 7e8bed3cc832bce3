//! Core types and trait definitions for the MDM entity resolution engine.
//!
//! This crate is deliberately free of HTTP and database dependencies. It
//! defines the record and relationship model, the transaction shape handed to
//! a relationship store, and the collaborator traits (record access,
//! relationship storage, classification, notification, privacy) that the
//! engine is constructed with.

// We intentionally use native `async fn` in traits (stabilised in Rust 1.75).
// Suppress the advisory lint about `Send` bounds on the returned futures.
#![allow(async_fn_in_trait)]

pub mod edge;
pub mod error;
pub mod matching;
pub mod privacy;
pub mod record;
pub mod store;
pub mod transaction;

pub use error::{BoxError, Error, ErrorKind, Result};
