//! The linkage state machine: link, unlink, ignore, record of truth and
//! master merge.
//!
//! Every operation validates against the current graph and returns a
//! [`Transaction`]; nothing is written until [`LinkageCoordinator::commit`]
//! (or the caller) hands it to the store. The store's uniqueness constraints
//! and stale-edge checks make the check-then-commit sequence safe under
//! concurrency: a transaction built on a graph that has since changed fails
//! at commit with [`Error::Conflict`].

use std::sync::Arc;

use mdm_core::{
  Error, Result,
  edge::{Classification, EdgeType, RelationshipEdge},
  record::RecordClass,
  store::{EdgeQuery, NotificationSink, RecordAccessor, RelationshipStore},
  transaction::{CommittedTransaction, Notification, Transaction},
};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::{RelationshipRedirector, edges, require_record};

pub struct LinkageCoordinator<A, S> {
  accessor: Arc<A>,
  store:    Arc<S>,
  sink:     Arc<dyn NotificationSink>,
}

impl<A, S> LinkageCoordinator<A, S>
where
  A: RecordAccessor,
  S: RelationshipStore,
{
  pub fn new(accessor: Arc<A>, store: Arc<S>, sink: Arc<dyn NotificationSink>) -> Self {
    Self { accessor, store, sink }
  }

  // ── Links ─────────────────────────────────────────────────────────────────

  /// Link `local_key` to `master_key`.
  ///
  /// Empty if the link already exists. Fails with [`Error::InvalidState`] if
  /// the local is linked to another master; it must be unlinked first.
  /// Candidate and ignored edges between the pair are resolved by the link.
  pub async fn link(&self, master_key: Uuid, local_key: Uuid) -> Result<Transaction> {
    self.require_pair(master_key, local_key).await?;

    let links = self.master_links_of(local_key).await?;
    if let Some(other) = links.iter().find(|e| e.target != master_key) {
      return Err(Error::InvalidState(format!(
        "local {local_key} is already linked to master {}",
        other.target
      )));
    }

    let mut tx = Transaction::new();
    if !links.is_empty() {
      debug!(master = %master_key, local = %local_key, "already linked");
      return Ok(tx);
    }

    tx.insert(RelationshipEdge::new(
      local_key,
      master_key,
      EdgeType::MasterLink,
      Classification::Verified,
    ));
    for resolved in self.pending_between(local_key, master_key).await? {
      tx.obsolete(resolved);
    }

    debug!(master = %master_key, local = %local_key, mutations = tx.len(), "built link");
    Ok(tx)
  }

  /// Unlink `local_key` from `master_key`.
  ///
  /// Besides obsoleting the link, this clears a record of truth pointing at
  /// the local, moves relationships stored on the master on behalf of this
  /// local alone back onto the local, and records the pair as ignored so
  /// candidate detection does not propose it again.
  pub async fn unlink(&self, master_key: Uuid, local_key: Uuid) -> Result<Transaction> {
    let link = self
      .master_links_of(local_key)
      .await?
      .into_iter()
      .find(|e| e.target == master_key)
      .ok_or_else(|| {
        Error::EdgeNotFound(format!("no active master link from {local_key} to {master_key}"))
      })?;

    let mut tx = Transaction::new();
    tx.obsolete(link);

    for rot in self.records_of_truth(master_key).await? {
      if rot.target == local_key {
        tx.obsolete(rot);
      }
    }

    self.restore_redirected(&mut tx, master_key, local_key).await?;

    let pending = self.pending_between(local_key, master_key).await?;
    let already_ignored = pending.iter().any(|e| e.edge_type == EdgeType::Ignored);
    for candidate in pending.into_iter().filter(|e| e.edge_type == EdgeType::Candidate) {
      tx.obsolete(candidate);
    }
    if !already_ignored {
      tx.insert(RelationshipEdge::new(
        local_key,
        master_key,
        EdgeType::Ignored,
        Classification::Verified,
      ));
    }

    debug!(master = %master_key, local = %local_key, mutations = tx.len(), "built unlink");
    Ok(tx)
  }

  /// Move relationships held by `master_key` that were redirected from
  /// `local_key`, and that no remaining local also holds, back to the local.
  async fn restore_redirected(
    &self,
    tx: &mut Transaction,
    master_key: Uuid,
    local_key: Uuid,
  ) -> Result<()> {
    let redirector = RelationshipRedirector::new(&*self.store);
    let attributable: Vec<RelationshipEdge> = redirector
      .held_by_master(master_key)
      .await?
      .into_iter()
      .filter(|e| e.original_source == Some(local_key) || e.original_target == Some(local_key))
      .collect();
    if attributable.is_empty() {
      return Ok(());
    }

    let remaining: Vec<Uuid> = edges(
      &*self.store,
      EdgeQuery::to_target(master_key).of_type(EdgeType::MasterLink),
    )
    .await?
    .into_iter()
    .map(|e| e.source)
    .filter(|k| *k != local_key)
    .collect();
    let shared = redirector.redirect_locals(master_key, &remaining).await?;

    let mut held = edges(&*self.store, EdgeQuery::from_source(local_key)).await?;
    held.extend(edges(&*self.store, EdgeQuery::to_target(local_key)).await?);

    for edge in attributable {
      if shared.iter().any(|s| s.same_relationship(&edge)) {
        continue;
      }
      let restored = edge.restored();
      tx.obsolete(edge);
      if !held.iter().any(|h| h.same_relationship(&restored)) {
        tx.insert(restored);
      }
    }
    Ok(())
  }

  // ── Ignore ────────────────────────────────────────────────────────────────

  /// Reject `local_key` as a candidate for `master_key`. Retires any
  /// candidate edge for the pair; empty if the pair is already ignored.
  pub async fn ignore(&self, master_key: Uuid, local_key: Uuid) -> Result<Transaction> {
    self.require_pair(master_key, local_key).await?;

    if self
      .master_links_of(local_key)
      .await?
      .iter()
      .any(|e| e.target == master_key)
    {
      return Err(Error::InvalidState(format!(
        "local {local_key} is linked to master {master_key}; unlink it instead"
      )));
    }

    let mut tx = Transaction::new();
    let pending = self.pending_between(local_key, master_key).await?;
    if pending.iter().any(|e| e.edge_type == EdgeType::Ignored) {
      return Ok(tx);
    }
    for candidate in pending {
      tx.obsolete(candidate);
    }
    tx.insert(RelationshipEdge::new(
      local_key,
      master_key,
      EdgeType::Ignored,
      Classification::Verified,
    ));
    Ok(tx)
  }

  /// Withdraw an earlier rejection, allowing the pair to be proposed again.
  pub async fn unignore(&self, master_key: Uuid, local_key: Uuid) -> Result<Transaction> {
    let ignored = edges(
      &*self.store,
      EdgeQuery::between(local_key, master_key).of_type(EdgeType::Ignored),
    )
    .await?;
    if ignored.is_empty() {
      return Err(Error::EdgeNotFound(format!(
        "no active ignored edge from {local_key} to {master_key}"
      )));
    }

    let mut tx = Transaction::new();
    for edge in ignored {
      tx.obsolete(edge);
    }
    Ok(tx)
  }

  // ── Record of truth ───────────────────────────────────────────────────────

  /// Make `local_key` the record of truth of `master_key`, replacing any
  /// previous one. The local must be linked to the master.
  pub async fn set_record_of_truth(
    &self,
    master_key: Uuid,
    local_key: Uuid,
  ) -> Result<Transaction> {
    if !self
      .master_links_of(local_key)
      .await?
      .iter()
      .any(|e| e.target == master_key)
    {
      return Err(Error::InvalidState(format!(
        "local {local_key} is not linked to master {master_key}"
      )));
    }

    let mut tx = Transaction::new();
    for current in self.records_of_truth(master_key).await? {
      if current.target == local_key {
        return Ok(tx);
      }
      tx.obsolete(current);
    }
    tx.insert(RelationshipEdge::new(
      master_key,
      local_key,
      EdgeType::RecordOfTruth,
      Classification::Verified,
    ));
    Ok(tx)
  }

  pub async fn clear_record_of_truth(&self, master_key: Uuid) -> Result<Transaction> {
    let current = self.records_of_truth(master_key).await?;
    if current.is_empty() {
      return Err(Error::EdgeNotFound(format!(
        "master {master_key} has no record of truth"
      )));
    }

    let mut tx = Transaction::new();
    for edge in current {
      tx.obsolete(edge);
    }
    Ok(tx)
  }

  // ── Merge ─────────────────────────────────────────────────────────────────

  /// Retire `retired_key` into `survivor_key`.
  ///
  /// All locals of the retired master move to the survivor, candidates
  /// against the retired master are dropped, its record of truth moves over
  /// unless the survivor already has one, relationships it holds move to the
  /// survivor, and a `Replaces` edge records the lineage.
  pub async fn merge(&self, survivor_key: Uuid, retired_key: Uuid) -> Result<Transaction> {
    if survivor_key == retired_key {
      return Err(Error::InvalidState(format!(
        "cannot merge master {survivor_key} into itself"
      )));
    }
    require_record(&*self.accessor, survivor_key, RecordClass::Master).await?;
    require_record(&*self.accessor, retired_key, RecordClass::Master).await?;

    for key in [retired_key, survivor_key] {
      let replaced =
        edges(&*self.store, EdgeQuery::to_target(key).of_type(EdgeType::Replaces)).await?;
      if !replaced.is_empty() {
        return Err(Error::InvalidState(format!("master {key} has already been retired")));
      }
    }

    let mut tx = Transaction::new();

    let links = edges(
      &*self.store,
      EdgeQuery::to_target(retired_key).of_type(EdgeType::MasterLink),
    )
    .await?;
    for link in links {
      let local = link.source;
      let classification = link.classification;
      tx.obsolete(link);
      tx.insert(RelationshipEdge::new(
        local,
        survivor_key,
        EdgeType::MasterLink,
        classification,
      ));
      for resolved in self.pending_between(local, survivor_key).await? {
        tx.obsolete(resolved);
      }
    }

    let candidates = edges(
      &*self.store,
      EdgeQuery::to_target(retired_key).of_type(EdgeType::Candidate),
    )
    .await?;
    for candidate in candidates {
      tx.obsolete(candidate);
    }

    let survivor_has_rot = !self.records_of_truth(survivor_key).await?.is_empty();
    for rot in self.records_of_truth(retired_key).await? {
      if !survivor_has_rot {
        tx.insert(RelationshipEdge::new(
          survivor_key,
          rot.target,
          EdgeType::RecordOfTruth,
          Classification::System,
        ));
      }
      tx.obsolete(rot);
    }

    let held = RelationshipRedirector::new(&*self.store)
      .held_by_master(retired_key)
      .await?;
    for edge in held {
      let (source, target) = if edge.source == retired_key {
        (survivor_key, edge.target)
      } else {
        (edge.source, survivor_key)
      };
      if source != target {
        let mut moved = edge.redirected(source, target);
        moved.edge_id = Uuid::new_v4();
        moved.created_at = chrono::Utc::now();
        tx.insert(moved);
      }
      tx.obsolete(edge);
    }

    tx.insert(RelationshipEdge::new(
      survivor_key,
      retired_key,
      EdgeType::Replaces,
      Classification::Verified,
    ));

    debug!(survivor = %survivor_key, retired = %retired_key, mutations = tx.len(), "built merge");
    Ok(tx)
  }

  // ── Commit ────────────────────────────────────────────────────────────────

  /// Submit `transaction` to the store and dispatch link notifications.
  ///
  /// An empty transaction is not submitted and notifies nobody. Any store
  /// failure is reported as [`Error::Conflict`]. Notification failures are
  /// logged and do not affect the result.
  pub async fn commit(&self, transaction: Transaction) -> Result<CommittedTransaction> {
    let transaction_id = transaction.transaction_id;
    if transaction.is_empty() {
      debug!(transaction = %transaction_id, "nothing to commit");
      return Ok(CommittedTransaction::unchanged(transaction_id));
    }

    let mutations = transaction.len();
    let committed = self.store.submit(transaction).await.map_err(|e| {
      warn!(transaction = %transaction_id, error = %e, "commit rejected");
      Error::Conflict(e.to_string())
    })?;
    info!(transaction = %transaction_id, mutations, "committed");

    self.notify(&committed);
    Ok(committed)
  }

  fn notify(&self, committed: &CommittedTransaction) {
    for notification in committed.notifications() {
      let (edge, outcome) = match notification {
        Notification::LinkEstablished(edge) => (edge, self.sink.on_link_established(edge)),
        Notification::LinkRemoved(edge) => (edge, self.sink.on_link_removed(edge)),
      };
      if let Err(e) = outcome {
        warn!(edge = %edge.edge_id, error = %e, "notification sink failed");
      }
    }
  }

  // ── Helpers ───────────────────────────────────────────────────────────────

  async fn require_pair(&self, master_key: Uuid, local_key: Uuid) -> Result<()> {
    require_record(&*self.accessor, master_key, RecordClass::Master).await?;
    require_record(&*self.accessor, local_key, RecordClass::Local).await?;
    Ok(())
  }

  async fn master_links_of(&self, local_key: Uuid) -> Result<Vec<RelationshipEdge>> {
    edges(
      &*self.store,
      EdgeQuery::from_source(local_key).of_type(EdgeType::MasterLink),
    )
    .await
  }

  async fn records_of_truth(&self, master_key: Uuid) -> Result<Vec<RelationshipEdge>> {
    edges(
      &*self.store,
      EdgeQuery::from_source(master_key).of_type(EdgeType::RecordOfTruth),
    )
    .await
  }

  /// Active candidate and ignored edges between a local and a master.
  async fn pending_between(
    &self,
    local_key: Uuid,
    master_key: Uuid,
  ) -> Result<Vec<RelationshipEdge>> {
    edges(
      &*self.store,
      EdgeQuery::between(local_key, master_key)
        .of_types([EdgeType::Candidate, EdgeType::Ignored]),
    )
    .await
  }
}
