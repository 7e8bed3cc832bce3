//! The record-linkage and master-synthesis engine.
//!
//! - [`MasterSynthesizer`] computes the golden view of a master on read.
//! - [`RelationshipRedirector`] moves the locals' own relationships onto
//!   their master.
//! - [`LinkageCoordinator`] builds (and optionally commits) transactions that
//!   link, unlink, ignore and merge, keeping the graph invariants.
//! - [`CandidateEvaluator`] drives a classifier to propose candidate links.
//!
//! Every component is constructed with its collaborators; nothing is looked
//! up from ambient state.

pub mod candidates;
pub mod config;
pub mod linkage;
pub mod redirect;
pub mod synthesize;

pub use candidates::CandidateEvaluator;
pub use config::EngineConfig;
pub use linkage::LinkageCoordinator;
pub use redirect::RelationshipRedirector;
pub use synthesize::{MasterSynthesizer, merge_fields};

use mdm_core::{
  Error, Result,
  edge::RelationshipEdge,
  record::{Record, RecordClass},
  store::{EdgeQuery, RecordAccessor, RelationshipStore},
};
use uuid::Uuid;

/// Run an edge query, wrapping backend failures.
pub(crate) async fn edges<S: RelationshipStore>(
  store: &S,
  query: EdgeQuery,
) -> Result<Vec<RelationshipEdge>> {
  store.query_edges(&query).await.map_err(Error::store)
}

/// Fetch a record and check its class.
pub(crate) async fn require_record<A: RecordAccessor>(
  accessor: &A,
  key: Uuid,
  class: RecordClass,
) -> Result<Record> {
  let record = accessor
    .get(key)
    .await
    .map_err(Error::store)?
    .ok_or(Error::RecordNotFound(key))?;
  if record.class != class {
    return Err(Error::InvalidState(format!(
      "record {key} is a {:?} record, expected {class:?}",
      record.class
    )));
  }
  Ok(record)
}

#[cfg(test)]
mod tests;
