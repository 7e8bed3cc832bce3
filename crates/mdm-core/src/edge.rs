//! Relationship edges: the typed, directed graph that ties locals to
//! masters and records everything else the records say about each other.
//!
//! Edges are never deleted. A mutation obsoletes the old edge (stamps
//! `obsoleted_at`) and, where needed, inserts a new one.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

// ─── Edge type ───────────────────────────────────────────────────────────────

/// The type of a relationship edge.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EdgeType {
  /// local → master: the local belongs to the master.
  MasterLink,
  /// local → master: an unresolved possible match.
  Candidate,
  /// local → master: a rejected candidate that must not re-surface.
  Ignored,
  /// master → local: the local's values override synthesis.
  RecordOfTruth,
  /// master → master: the source master superseded the target.
  Replaces,
  /// master → master: the target is the master the source was split from.
  OriginalMaster,
  /// Any relationship the records themselves carry (e.g. `"spouse"`).
  External(String),
}

impl EdgeType {
  pub fn external(name: impl Into<String>) -> Self { Self::External(name.into()) }

  /// Bookkeeping types describe the MDM graph itself and are never
  /// redirected onto a master.
  pub fn is_bookkeeping(&self) -> bool { !matches!(self, Self::External(_)) }

  pub fn is_lineage(&self) -> bool {
    matches!(self, Self::Replaces | Self::OriginalMaster)
  }
}

impl fmt::Display for EdgeType {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      Self::MasterLink => f.write_str("master_link"),
      Self::Candidate => f.write_str("candidate"),
      Self::Ignored => f.write_str("ignored"),
      Self::RecordOfTruth => f.write_str("record_of_truth"),
      Self::Replaces => f.write_str("replaces"),
      Self::OriginalMaster => f.write_str("original_master"),
      Self::External(name) => f.write_str(name),
    }
  }
}

// ─── Provenance ──────────────────────────────────────────────────────────────

/// Who or what established an edge. Automated re-matching may only remove
/// what it created itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Classification {
  /// Created by the classifier.
  Automatic,
  /// Created by the engine as a side effect of another operation.
  System,
  /// A human decision.
  Verified,
}

// ─── Edge ────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RelationshipEdge {
  pub edge_id:         Uuid,
  pub source:          Uuid,
  pub target:          Uuid,
  pub edge_type:       EdgeType,
  /// Optional qualifier of an external relationship (e.g. `"primary"`).
  pub role:            Option<String>,
  pub classification:  Classification,
  /// Classifier score, on candidate edges.
  pub score:           Option<f64>,
  /// The holder before redirection onto a master.
  pub original_source: Option<Uuid>,
  /// The target before redirection onto a master.
  pub original_target: Option<Uuid>,
  pub created_at:      DateTime<Utc>,
  pub obsoleted_at:    Option<DateTime<Utc>>,
}

impl RelationshipEdge {
  pub fn new(
    source: Uuid,
    target: Uuid,
    edge_type: EdgeType,
    classification: Classification,
  ) -> Self {
    Self {
      edge_id: Uuid::new_v4(),
      source,
      target,
      edge_type,
      role: None,
      classification,
      score: None,
      original_source: None,
      original_target: None,
      created_at: Utc::now(),
      obsoleted_at: None,
    }
  }

  pub fn with_role(mut self, role: impl Into<String>) -> Self {
    self.role = Some(role.into());
    self
  }

  pub fn with_score(mut self, score: f64) -> Self {
    self.score = Some(score);
    self
  }

  pub fn is_active(&self) -> bool { self.obsoleted_at.is_none() }

  pub fn is_redirected(&self) -> bool {
    self.original_source.is_some() || self.original_target.is_some()
  }

  pub fn connects(&self, source: Uuid, target: Uuid) -> bool {
    self.source == source && self.target == target
  }

  /// A copy of this edge moved onto new endpoints. The endpoints it had
  /// before its first redirection are kept in `original_*`.
  pub fn redirected(&self, source: Uuid, target: Uuid) -> Self {
    let mut edge = self.clone();
    if source != self.source {
      edge.original_source = self.original_source.or(Some(self.source));
    }
    if target != self.target {
      edge.original_target = self.original_target.or(Some(self.target));
    }
    edge.source = source;
    edge.target = target;
    edge
  }

  /// A fresh, active edge at the endpoints this edge had before it was
  /// redirected.
  pub fn restored(&self) -> Self {
    let mut edge = RelationshipEdge::new(
      self.original_source.unwrap_or(self.source),
      self.original_target.unwrap_or(self.target),
      self.edge_type.clone(),
      self.classification,
    );
    edge.role = self.role.clone();
    edge
  }

  /// Whether two edges state the same relationship: equal endpoints and type,
  /// and equal roles unless either side carries none.
  pub fn same_relationship(&self, other: &Self) -> bool {
    self.source == other.source
      && self.target == other.target
      && self.edge_type == other.edge_type
      && match (&self.role, &other.role) {
        (Some(a), Some(b)) => a == b,
        _ => true,
      }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn spouse(source: Uuid, target: Uuid) -> RelationshipEdge {
    RelationshipEdge::new(
      source,
      target,
      EdgeType::external("spouse"),
      Classification::System,
    )
  }

  #[test]
  fn only_external_edges_are_redirectable() {
    assert!(EdgeType::MasterLink.is_bookkeeping());
    assert!(EdgeType::Replaces.is_bookkeeping());
    assert!(EdgeType::Replaces.is_lineage());
    assert!(!EdgeType::external("employer").is_bookkeeping());
  }

  #[test]
  fn redirection_keeps_first_endpoints() {
    let (local, master, other, other_master) =
      (Uuid::new_v4(), Uuid::new_v4(), Uuid::new_v4(), Uuid::new_v4());
    let edge = spouse(local, other);

    let once = edge.redirected(master, other);
    assert_eq!(once.original_source, Some(local));
    assert_eq!(once.original_target, None);

    let twice = once.redirected(master, other_master);
    assert_eq!(twice.original_source, Some(local));
    assert_eq!(twice.original_target, Some(other));

    let back = twice.restored();
    assert!(back.connects(local, other));
    assert!(!back.is_redirected());
    assert_ne!(back.edge_id, edge.edge_id);
  }

  #[test]
  fn missing_role_matches_any_role() {
    let (a, b) = (Uuid::new_v4(), Uuid::new_v4());
    let plain = spouse(a, b);
    let primary = spouse(a, b).with_role("primary");
    let secondary = spouse(a, b).with_role("secondary");

    assert!(plain.same_relationship(&primary));
    assert!(primary.same_relationship(&plain));
    assert!(!primary.same_relationship(&secondary));
    assert!(!plain.same_relationship(&spouse(b, a)));
  }
}
