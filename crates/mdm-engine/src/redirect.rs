//! Redirection of the locals' own relationships onto their master.
//!
//! A local's external relationships (anything that is not MDM bookkeeping)
//! are presented on the golden record as if the master held them. Each
//! redirected edge keeps the endpoints it had before redirection in
//! `original_source` / `original_target`, and keeps the `edge_id` of the edge
//! it was derived from.

use std::collections::HashMap;

use mdm_core::{
  Result,
  edge::{EdgeType, RelationshipEdge},
  store::{EdgeQuery, RelationshipStore},
};
use uuid::Uuid;

use crate::edges;

/// Append `edge` unless an edge stating the same relationship is already
/// present. Returns whether it was appended.
pub fn push_unique(out: &mut Vec<RelationshipEdge>, edge: RelationshipEdge) -> bool {
  if out.iter().any(|e| e.same_relationship(&edge)) {
    return false;
  }
  out.push(edge);
  true
}

pub struct RelationshipRedirector<'a, S> {
  store: &'a S,
}

impl<'a, S: RelationshipStore> RelationshipRedirector<'a, S> {
  pub fn new(store: &'a S) -> Self { Self { store } }

  /// The relationship set of `master`: external edges it holds directly,
  /// followed by the redirected relationships of `locals`, without
  /// duplicates.
  pub async fn redirect(
    &self,
    master: Uuid,
    locals: &[Uuid],
  ) -> Result<Vec<RelationshipEdge>> {
    let mut out = Vec::new();
    for edge in self.held_by_master(master).await? {
      push_unique(&mut out, edge);
    }
    for edge in self.redirect_locals(master, locals).await? {
      push_unique(&mut out, edge);
    }
    Ok(out)
  }

  /// Active external edges stored with `master` as an endpoint.
  pub async fn held_by_master(&self, master: Uuid) -> Result<Vec<RelationshipEdge>> {
    let mut held = self.external(EdgeQuery::from_source(master)).await?;
    held.extend(self.external(EdgeQuery::to_target(master)).await?);
    Ok(held)
  }

  /// Redirect the external edges of `locals` onto `master`.
  ///
  /// The far endpoint of each edge is itself resolved to its master when it
  /// is a linked local, so redirected edges never end on a linked local.
  /// Edges that would connect the master to itself are dropped.
  pub async fn redirect_locals(
    &self,
    master: Uuid,
    locals: &[Uuid],
  ) -> Result<Vec<RelationshipEdge>> {
    let mut ordered = locals.to_vec();
    ordered.sort();
    ordered.dedup();

    let mut resolved: HashMap<Uuid, Uuid> = ordered.iter().map(|l| (*l, master)).collect();
    let mut out = Vec::new();

    for local in ordered {
      for edge in self.external(EdgeQuery::from_source(local)).await? {
        if edge.target == master {
          continue;
        }
        let target = self.resolve(edge.target, &mut resolved).await?;
        if target != master {
          push_unique(&mut out, edge.redirected(master, target));
        }
      }

      for edge in self.external(EdgeQuery::to_target(local)).await? {
        if edge.source == master {
          continue;
        }
        let source = self.resolve(edge.source, &mut resolved).await?;
        if source != master {
          push_unique(&mut out, edge.redirected(source, master));
        }
      }
    }

    Ok(out)
  }

  async fn external(&self, query: EdgeQuery) -> Result<Vec<RelationshipEdge>> {
    let mut found = edges(self.store, query).await?;
    found.retain(|e| !e.edge_type.is_bookkeeping());
    Ok(found)
  }

  /// The master `key` is linked to, or `key` itself if it is not linked.
  async fn resolve(&self, key: Uuid, resolved: &mut HashMap<Uuid, Uuid>) -> Result<Uuid> {
    if let Some(master) = resolved.get(&key) {
      return Ok(*master);
    }
    let link = edges(self.store, EdgeQuery::from_source(key).of_type(EdgeType::MasterLink))
      .await?
      .into_iter()
      .next();
    let master = link.map_or(key, |e| e.target);
    resolved.insert(key, master);
    Ok(master)
  }
}
