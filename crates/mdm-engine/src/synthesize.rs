//! Synthesis of the golden record of a master.
//!
//! The golden record is recomputed on every call from the current graph:
//!
//! 1. linked locals the caller may not see are dropped entirely;
//! 2. with no visible locals, lineage edges ending at the master lead to a
//!    predecessor whose visible locals are used instead;
//! 3. a visible record of truth seeds every field, otherwise each field comes
//!    from the most recently modified local with a value (ties: lowest key);
//! 4. the master's stored shell attributes fill whatever is still empty;
//! 5. relationships are redirected onto the master.

use std::{collections::HashSet, sync::Arc};

use chrono::Utc;
use mdm_core::{
  Error, Result,
  edge::EdgeType,
  privacy::{Principal, PrivacyFilter},
  record::{Fields, Record, RecordClass, RecordShape, SynthesizedRecord, is_empty_value},
  store::{EdgeQuery, RecordAccessor, RelationshipStore},
};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::{EngineConfig, RelationshipRedirector, edges, require_record};

/// Fill every empty field of `seed` from `locals`, preferring the most
/// recently modified local and, on equal times, the lowest key.
pub fn merge_fields<R: RecordShape>(mut seed: Fields, locals: &[R]) -> Fields {
  let mut ordered: Vec<&R> = locals.iter().collect();
  ordered.sort_by(|a, b| {
    b.modified_at()
      .cmp(&a.modified_at())
      .then_with(|| a.key().cmp(&b.key()))
  });
  for local in ordered {
    fill_empty(&mut seed, local.fields());
  }
  seed
}

fn fill_empty(fields: &mut Fields, from: &Fields) {
  for (name, value) in from {
    if is_empty_value(value) {
      continue;
    }
    match fields.get_mut(name) {
      Some(slot) if is_empty_value(slot) => *slot = value.clone(),
      Some(_) => {}
      None => {
        fields.insert(name.clone(), value.clone());
      }
    }
  }
}

pub struct MasterSynthesizer<A, S> {
  accessor:      Arc<A>,
  store:         Arc<S>,
  privacy:       Arc<dyn PrivacyFilter>,
  lineage_depth: usize,
}

impl<A, S> MasterSynthesizer<A, S>
where
  A: RecordAccessor,
  S: RelationshipStore,
{
  pub fn new(accessor: Arc<A>, store: Arc<S>, privacy: Arc<dyn PrivacyFilter>) -> Self {
    Self {
      accessor,
      store,
      privacy,
      lineage_depth: EngineConfig::default().lineage_depth,
    }
  }

  pub fn with_config(mut self, config: &EngineConfig) -> Self {
    self.lineage_depth = config.lineage_depth;
    self
  }

  /// Compute the golden record of `master_key` as `principal` may see it.
  ///
  /// Fails with [`Error::RecordNotFound`] both for unknown masters and for
  /// masters with nothing visible to the caller, so that callers cannot
  /// tell the two apart.
  pub async fn synthesize(
    &self,
    master_key: Uuid,
    principal: &Principal,
  ) -> Result<SynthesizedRecord> {
    self
      .assemble(master_key, principal)
      .await
      .map_err(|e| match e {
        Error::PrivacyDenied(key) => {
          debug!(master = %key, principal = %principal.name, "nothing visible; reporting not found");
          Error::RecordNotFound(key)
        }
        other => other,
      })
  }

  async fn assemble(
    &self,
    master_key: Uuid,
    principal: &Principal,
  ) -> Result<SynthesizedRecord> {
    let master = require_record(&*self.accessor, master_key, RecordClass::Master).await?;

    let mut lineage_source = None;
    let mut visible = self.visible_locals(master_key, principal).await?;
    if visible.is_empty() {
      let (predecessor, locals) = self
        .lineage_fallback(master_key, principal)
        .await?
        .ok_or(Error::PrivacyDenied(master_key))?;
      lineage_source = Some(predecessor);
      visible = locals;
    }

    let record_of_truth = self.record_of_truth(master_key, principal).await?;
    let rot_key = record_of_truth.as_ref().map(|r| r.key);

    let others: Vec<Record> = visible
      .iter()
      .filter(|r| Some(r.key) != rot_key)
      .cloned()
      .collect();
    let seed = record_of_truth
      .as_ref()
      .map(|r| r.fields.clone())
      .unwrap_or_default();
    let mut fields = merge_fields(seed, &others);
    fill_empty(&mut fields, &master.fields);

    let mut contributors: Vec<Uuid> = visible.iter().map(|r| r.key).collect();
    if let Some(key) = rot_key
      && !contributors.contains(&key)
    {
      contributors.push(key);
    }
    contributors.sort();

    let modified_at = record_of_truth
      .as_ref()
      .map(|r| r.modified_at)
      .or_else(|| visible.iter().map(|r| r.modified_at).max())
      .unwrap_or(master.modified_at);

    let relationships = RelationshipRedirector::new(&*self.store)
      .redirect(master_key, &contributors)
      .await?;

    Ok(SynthesizedRecord {
      key: master_key,
      resource_type: master.resource_type,
      is_master: true,
      generated: true,
      record_of_truth: rot_key,
      contributors,
      lineage_source,
      modified_at,
      synthesized_at: Utc::now(),
      fields,
      relationships,
    })
  }

  /// The actively linked locals of `master_key` that `principal` may see,
  /// in key order.
  async fn visible_locals(&self, master_key: Uuid, principal: &Principal) -> Result<Vec<Record>> {
    let links = edges(
      &*self.store,
      EdgeQuery::to_target(master_key).of_type(EdgeType::MasterLink),
    )
    .await?;

    let mut visible = Vec::with_capacity(links.len());
    for link in links {
      match self.accessor.get(link.source).await.map_err(Error::store)? {
        Some(record) => {
          if let Some(seen) = self.privacy.apply(record, principal) {
            visible.push(seen);
          }
        }
        None => {
          warn!(local = %link.source, master = %master_key, "master link points at a missing record");
        }
      }
    }
    visible.sort_by_key(|r| r.key);
    Ok(visible)
  }

  /// Walk lineage edges ending at `master_key`, newest first and breadth
  /// first, until a master with visible locals is found.
  async fn lineage_fallback(
    &self,
    master_key: Uuid,
    principal: &Principal,
  ) -> Result<Option<(Uuid, Vec<Record>)>> {
    let mut seen = HashSet::from([master_key]);
    let mut frontier = vec![master_key];

    for _ in 0..self.lineage_depth {
      let mut next = Vec::new();
      for key in frontier {
        let mut lineage = edges(
          &*self.store,
          EdgeQuery::to_target(key).of_types([EdgeType::Replaces, EdgeType::OriginalMaster]),
        )
        .await?;
        lineage.sort_by(|a, b| b.created_at.cmp(&a.created_at));

        for edge in lineage {
          if !seen.insert(edge.source) {
            continue;
          }
          let locals = self.visible_locals(edge.source, principal).await?;
          if !locals.is_empty() {
            debug!(master = %master_key, predecessor = %edge.source, "synthesizing through lineage");
            return Ok(Some((edge.source, locals)));
          }
          next.push(edge.source);
        }
      }
      if next.is_empty() {
        break;
      }
      frontier = next;
    }
    Ok(None)
  }

  /// The record-of-truth local, if one is set and visible to `principal`.
  async fn record_of_truth(
    &self,
    master_key: Uuid,
    principal: &Principal,
  ) -> Result<Option<Record>> {
    let Some(edge) = edges(
      &*self.store,
      EdgeQuery::from_source(master_key).of_type(EdgeType::RecordOfTruth),
    )
    .await?
    .pop() else {
      return Ok(None);
    };

    let Some(record) = self.accessor.get(edge.target).await.map_err(Error::store)? else {
      warn!(master = %master_key, local = %edge.target, "record of truth points at a missing record");
      return Ok(None);
    };

    let seen = self.privacy.apply(record, principal);
    if seen.is_none() {
      debug!(master = %master_key, "record of truth hidden from caller; merging without it");
    }
    Ok(seen)
  }
}
