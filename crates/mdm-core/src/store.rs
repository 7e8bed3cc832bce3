//! Collaborator traits and their query types.
//!
//! The traits are implemented outside the engine (e.g. by
//! `mdm-store-sqlite`). The engine depends on these abstractions only, and is
//! handed concrete implementations at construction.
//!
//! All async methods return `Send` futures so the traits can be used in
//! multi-threaded async runtimes.

use std::future::Future;

use uuid::Uuid;

use crate::{
  BoxError,
  edge::{Classification, EdgeType, RelationshipEdge},
  matching::{MatchConfiguration, MatchResult},
  record::{Record, RecordClass},
  transaction::{CommittedTransaction, Transaction},
};

// ─── Query types ─────────────────────────────────────────────────────────────

/// Parameters for [`RecordAccessor::query`].
#[derive(Debug, Clone, Default)]
pub struct RecordQuery {
  pub class:         Option<RecordClass>,
  pub resource_type: Option<String>,
  pub source:        Option<String>,
  pub limit:         Option<usize>,
}

impl RecordQuery {
  pub fn locals(resource_type: impl Into<String>) -> Self {
    Self {
      class: Some(RecordClass::Local),
      resource_type: Some(resource_type.into()),
      ..Self::default()
    }
  }

  pub fn masters(resource_type: impl Into<String>) -> Self {
    Self {
      class: Some(RecordClass::Master),
      resource_type: Some(resource_type.into()),
      ..Self::default()
    }
  }
}

/// Parameters for [`RelationshipStore::query_edges`]. Unset fields do not
/// filter; obsolete edges are excluded unless `include_obsolete` is set.
#[derive(Debug, Clone, Default)]
pub struct EdgeQuery {
  pub source:           Option<Uuid>,
  pub target:           Option<Uuid>,
  /// Match any of these types. Empty matches every type.
  pub edge_types:       Vec<EdgeType>,
  pub classification:   Option<Classification>,
  pub include_obsolete: bool,
}

impl EdgeQuery {
  pub fn from_source(source: Uuid) -> Self {
    Self { source: Some(source), ..Self::default() }
  }

  pub fn to_target(target: Uuid) -> Self {
    Self { target: Some(target), ..Self::default() }
  }

  pub fn between(source: Uuid, target: Uuid) -> Self {
    Self { source: Some(source), target: Some(target), ..Self::default() }
  }

  pub fn of_type(mut self, edge_type: EdgeType) -> Self {
    self.edge_types.push(edge_type);
    self
  }

  pub fn of_types(mut self, edge_types: impl IntoIterator<Item = EdgeType>) -> Self {
    self.edge_types.extend(edge_types);
    self
  }

  pub fn classified(mut self, classification: Classification) -> Self {
    self.classification = Some(classification);
    self
  }

  pub fn including_obsolete(mut self) -> Self {
    self.include_obsolete = true;
    self
  }

  /// Whether `edge` satisfies this query. Backends may use this to filter
  /// in memory.
  pub fn matches(&self, edge: &RelationshipEdge) -> bool {
    self.source.is_none_or(|s| s == edge.source)
      && self.target.is_none_or(|t| t == edge.target)
      && (self.edge_types.is_empty() || self.edge_types.contains(&edge.edge_type))
      && self.classification.is_none_or(|c| c == edge.classification)
      && (self.include_obsolete || edge.is_active())
  }
}

// ─── Traits ──────────────────────────────────────────────────────────────────

/// Read access to local and master records.
pub trait RecordAccessor: Send + Sync {
  type Error: std::error::Error + Send + Sync + 'static;

  /// Fetch one record. Returns `None` if the key is unknown.
  fn get(
    &self,
    key: Uuid,
  ) -> impl Future<Output = Result<Option<Record>, Self::Error>> + Send + '_;

  fn query<'a>(
    &'a self,
    query: &'a RecordQuery,
  ) -> impl Future<Output = Result<Vec<Record>, Self::Error>> + Send + 'a;
}

/// A typed, versioned store of relationship edges.
pub trait RelationshipStore: Send + Sync {
  type Error: std::error::Error + Send + Sync + 'static;

  /// Edges matching `query`, oldest first.
  fn query_edges<'a>(
    &'a self,
    query: &'a EdgeQuery,
  ) -> impl Future<Output = Result<Vec<RelationshipEdge>, Self::Error>> + Send + 'a;

  /// Apply `transaction` atomically.
  ///
  /// Must fail, applying nothing, if an edge to obsolete is no longer active
  /// or if an insertion would give a local a second active master link or a
  /// master a second active record of truth.
  fn submit(
    &self,
    transaction: Transaction,
  ) -> impl Future<Output = Result<CommittedTransaction, Self::Error>> + Send + '_;
}

/// A record-matching classifier.
pub trait Classifier: Send + Sync {
  type Error: std::error::Error + Send + Sync + 'static;

  /// Look up a matching configuration by id.
  fn configuration(&self, id: &str) -> Option<MatchConfiguration>;

  /// Score `probe` against each of `candidates` under `configuration`.
  fn classify<'a>(
    &'a self,
    probe: &'a Record,
    candidates: &'a [Record],
    configuration: &'a str,
  ) -> impl Future<Output = Result<Vec<MatchResult>, Self::Error>> + Send + 'a;
}

/// Receives link events after a transaction commits. Failures are logged by
/// the caller and never undo the commit.
pub trait NotificationSink: Send + Sync {
  fn on_link_established(&self, edge: &RelationshipEdge) -> Result<(), BoxError>;

  fn on_link_removed(&self, edge: &RelationshipEdge) -> Result<(), BoxError>;
}

/// A sink that drops every notification.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullSink;

impl NotificationSink for NullSink {
  fn on_link_established(&self, _edge: &RelationshipEdge) -> Result<(), BoxError> { Ok(()) }

  fn on_link_removed(&self, _edge: &RelationshipEdge) -> Result<(), BoxError> { Ok(()) }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn edge_query_filters_obsolete_by_default() {
    let (local, master) = (Uuid::new_v4(), Uuid::new_v4());
    let mut edge =
      RelationshipEdge::new(local, master, EdgeType::Candidate, Classification::Automatic);

    let query = EdgeQuery::between(local, master).of_type(EdgeType::Candidate);
    assert!(query.matches(&edge));
    assert!(!query.clone().classified(Classification::Verified).matches(&edge));

    edge.obsoleted_at = Some(chrono::Utc::now());
    assert!(!query.matches(&edge));
    assert!(query.including_obsolete().matches(&edge));
  }
}
