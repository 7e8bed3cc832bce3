//! Transactions: atomic sets of edge insertions and obsoletions.
//!
//! The engine only ever builds transactions. Applying them is the
//! relationship store's job, and the store must apply all of a transaction
//! or none of it.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::edge::{EdgeType, RelationshipEdge};

/// A pending set of edge mutations.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Transaction {
  pub transaction_id: Uuid,
  pub inserts:        Vec<RelationshipEdge>,
  /// Active edges to obsolete. The store must reject the transaction if any
  /// of them is no longer active at commit.
  pub obsoletes:      Vec<RelationshipEdge>,
}

impl Default for Transaction {
  fn default() -> Self { Self::new() }
}

impl Transaction {
  pub fn new() -> Self {
    Self {
      transaction_id: Uuid::new_v4(),
      inserts:        Vec::new(),
      obsoletes:      Vec::new(),
    }
  }

  pub fn is_empty(&self) -> bool { self.inserts.is_empty() && self.obsoletes.is_empty() }

  pub fn len(&self) -> usize { self.inserts.len() + self.obsoletes.len() }

  pub fn insert(&mut self, edge: RelationshipEdge) {
    if !self.inserts.iter().any(|e| e.edge_id == edge.edge_id) {
      self.inserts.push(edge);
    }
  }

  /// Queue `edge` for obsoletion. Obsoleting an edge inserted earlier in the
  /// same transaction simply drops the insertion.
  pub fn obsolete(&mut self, edge: RelationshipEdge) {
    if let Some(pos) = self.inserts.iter().position(|e| e.edge_id == edge.edge_id) {
      self.inserts.remove(pos);
      return;
    }
    if !self.obsoletes.iter().any(|e| e.edge_id == edge.edge_id) {
      self.obsoletes.push(edge);
    }
  }

  pub fn extend(&mut self, other: Transaction) {
    for edge in other.obsoletes {
      self.obsolete(edge);
    }
    for edge in other.inserts {
      self.insert(edge);
    }
  }

  /// Whether this transaction obsoletes the edge with `edge_id`.
  pub fn obsoletes_edge(&self, edge_id: Uuid) -> bool {
    self.obsoletes.iter().any(|e| e.edge_id == edge_id)
  }
}

// ─── Committed ───────────────────────────────────────────────────────────────

/// A transaction as the store applied it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommittedTransaction {
  pub transaction_id: Uuid,
  pub committed_at:   DateTime<Utc>,
  pub inserted:       Vec<RelationshipEdge>,
  /// The obsoleted edges, with `obsoleted_at` set.
  pub obsoleted:      Vec<RelationshipEdge>,
}

impl CommittedTransaction {
  /// The result of committing an empty transaction: nothing changed.
  pub fn unchanged(transaction_id: Uuid) -> Self {
    Self {
      transaction_id,
      committed_at: Utc::now(),
      inserted: Vec::new(),
      obsoleted: Vec::new(),
    }
  }

  pub fn is_empty(&self) -> bool { self.inserted.is_empty() && self.obsoleted.is_empty() }

  /// Link notifications owed for this commit: one per inserted or obsoleted
  /// master link.
  pub fn notifications(&self) -> impl Iterator<Item = Notification<'_>> {
    let established = self
      .inserted
      .iter()
      .filter(|e| e.edge_type == EdgeType::MasterLink)
      .map(Notification::LinkEstablished);
    let removed = self
      .obsoleted
      .iter()
      .filter(|e| e.edge_type == EdgeType::MasterLink)
      .map(Notification::LinkRemoved);
    removed.chain(established)
  }
}

/// An event for the notification sink.
#[derive(Debug, Clone, Copy)]
pub enum Notification<'a> {
  LinkEstablished(&'a RelationshipEdge),
  LinkRemoved(&'a RelationshipEdge),
}
