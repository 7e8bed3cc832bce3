//! Candidate detection: run the classifier over unresolved locals and turn
//! strong matches into `Automatic` candidate edges.
//!
//! Re-detection may clear what it created before (`Automatic` candidates) but
//! never touches a human decision: `Verified`/`System` candidates and ignored
//! edges stay, and they also keep the classifier from proposing the same
//! pair again.

use std::{collections::HashSet, sync::Arc};

use futures::{StreamExt as _, TryStreamExt as _, stream};
use mdm_core::{
  Error, Result,
  edge::{Classification, EdgeType, RelationshipEdge},
  matching::MatchConfiguration,
  privacy::{AllowAll, Principal},
  record::{Record, RecordClass},
  store::{Classifier, EdgeQuery, RecordAccessor, RecordQuery, RelationshipStore},
  transaction::Transaction,
};
use tracing::{debug, info};
use uuid::Uuid;

use crate::{EngineConfig, MasterSynthesizer, edges};

pub struct CandidateEvaluator<A, S, C> {
  accessor:    Arc<A>,
  store:       Arc<S>,
  classifier:  Arc<C>,
  synthesizer: MasterSynthesizer<A, S>,
  config:      EngineConfig,
}

impl<A, S, C> CandidateEvaluator<A, S, C>
where
  A: RecordAccessor,
  S: RelationshipStore,
  C: Classifier,
{
  pub fn new(accessor: Arc<A>, store: Arc<S>, classifier: Arc<C>, config: EngineConfig) -> Self {
    let synthesizer =
      MasterSynthesizer::new(accessor.clone(), store.clone(), Arc::new(AllowAll)).with_config(&config);
    Self { accessor, store, classifier, synthesizer, config }
  }

  /// Recompute candidates for one record.
  ///
  /// For a local: the local against every live master of its resource type.
  /// For a master: every unresolved local of its resource type against that
  /// master. A linked local has nothing to detect; its transaction at most
  /// clears leftover `Automatic` candidates.
  ///
  /// With `clear_automatic`, `Automatic` candidates in scope are obsoleted
  /// before the new ones are inserted.
  pub async fn detect_candidates(&self, key: Uuid, clear_automatic: bool) -> Result<Transaction> {
    let configuration = self.configuration()?;
    let record = self
      .accessor
      .get(key)
      .await
      .map_err(Error::store)?
      .ok_or(Error::RecordNotFound(key))?;

    match record.class {
      RecordClass::Local => {
        let linked = edges(
          &*self.store,
          EdgeQuery::from_source(key).of_type(EdgeType::MasterLink),
        )
        .await?;
        if !linked.is_empty() {
          debug!(local = %key, "local is linked; nothing to detect");
          let mut tx = Transaction::new();
          if clear_automatic {
            let automatic = edges(
              &*self.store,
              EdgeQuery::from_source(key)
                .of_type(EdgeType::Candidate)
                .classified(Classification::Automatic),
            )
            .await?;
            for edge in automatic {
              tx.obsolete(edge);
            }
          }
          return Ok(tx);
        }
        let masters = self.master_population(&record.resource_type).await?;
        self
          .evaluate(&record, &masters, &configuration, clear_automatic)
          .await
      }
      RecordClass::Master => {
        if self.retired_masters().await?.contains(&key) {
          return Err(Error::InvalidState(format!("master {key} has been retired")));
        }

        let mut tx = Transaction::new();
        if clear_automatic {
          let automatic = edges(
            &*self.store,
            EdgeQuery::to_target(key)
              .of_type(EdgeType::Candidate)
              .classified(Classification::Automatic),
          )
          .await?;
          for edge in automatic {
            tx.obsolete(edge);
          }
        }

        let probes = self.unresolved_locals(&record.resource_type).await?;
        let masters = vec![self.match_view(record).await?];
        for probe in &probes {
          tx.extend(
            self
              .evaluate(probe, &masters, &configuration, clear_automatic)
              .await?,
          );
        }
        Ok(tx)
      }
    }
  }

  /// Recompute candidates for every unresolved local of `resource_type`.
  ///
  /// Locals are evaluated concurrently, up to `batch_concurrency` at a time,
  /// and each gets its own transaction so they can be committed
  /// independently. Locals with nothing to change are omitted.
  pub async fn detect_all(
    &self,
    resource_type: &str,
    clear_automatic: bool,
  ) -> Result<Vec<Transaction>> {
    let configuration = self.configuration()?;
    let masters = self.master_population(resource_type).await?;
    let probes = self.unresolved_locals(resource_type).await?;
    let probe_count = probes.len();

    let (masters_ref, configuration_ref) = (&masters, &configuration);
    let transactions: Vec<Transaction> = stream::iter(probes)
      .map(|probe| async move {
        self
          .evaluate(&probe, masters_ref, configuration_ref, clear_automatic)
          .await
      })
      .buffer_unordered(self.config.batch_concurrency.max(1))
      .try_collect()
      .await?;

    let changed: Vec<Transaction> = transactions.into_iter().filter(|tx| !tx.is_empty()).collect();
    info!(
      resource_type,
      probes = probe_count,
      masters = masters.len(),
      changed = changed.len(),
      "batch candidate detection finished"
    );
    Ok(changed)
  }

  fn configuration(&self) -> Result<MatchConfiguration> {
    let id = &self.config.match_configuration;
    match self.classifier.configuration(id) {
      Some(configuration) if configuration.active => Ok(configuration),
      Some(_) => Err(Error::NotConfigured(format!("matching configuration {id:?} is not active"))),
      None => Err(Error::NotConfigured(format!("no matching configuration {id:?}"))),
    }
  }

  /// Classify `probe` against `masters` and build its candidate changes.
  async fn evaluate(
    &self,
    probe: &Record,
    masters: &[Record],
    configuration: &MatchConfiguration,
    clear_automatic: bool,
  ) -> Result<Transaction> {
    let in_scope: HashSet<Uuid> = masters.iter().map(|m| m.key).collect();
    let mut tx = Transaction::new();

    // Masters the probe already has a standing decision about.
    let mut settled: HashSet<Uuid> = HashSet::new();
    let existing = edges(
      &*self.store,
      EdgeQuery::from_source(probe.key).of_types([EdgeType::Candidate, EdgeType::Ignored]),
    )
    .await?;
    for edge in existing {
      if !in_scope.contains(&edge.target) {
        continue;
      }
      let automatic = edge.edge_type == EdgeType::Candidate
        && edge.classification == Classification::Automatic;
      if automatic && clear_automatic {
        tx.obsolete(edge);
      } else {
        settled.insert(edge.target);
      }
    }

    if masters.is_empty() {
      return Ok(tx);
    }

    let results = self
      .classifier
      .classify(probe, masters, &configuration.id)
      .await
      .map_err(|e| Error::Classifier(Box::new(e)))?;

    for result in results {
      if !configuration.accepts(&result)
        || !in_scope.contains(&result.candidate)
        || !settled.insert(result.candidate)
      {
        continue;
      }
      tx.insert(
        RelationshipEdge::new(
          probe.key,
          result.candidate,
          EdgeType::Candidate,
          Classification::Automatic,
        )
        .with_score(result.score),
      );
    }

    debug!(local = %probe.key, mutations = tx.len(), "evaluated candidates");
    Ok(tx)
  }

  /// Live masters of `resource_type`, each carrying its golden fields so the
  /// classifier compares against the merged identity.
  async fn master_population(&self, resource_type: &str) -> Result<Vec<Record>> {
    let retired = self.retired_masters().await?;
    let masters = self
      .accessor
      .query(&RecordQuery::masters(resource_type))
      .await
      .map_err(Error::store)?;

    let mut population = Vec::with_capacity(masters.len());
    for master in masters {
      if !retired.contains(&master.key) {
        population.push(self.match_view(master).await?);
      }
    }
    Ok(population)
  }

  /// `master` with its synthesized fields, or its shell if it has no locals.
  async fn match_view(&self, master: Record) -> Result<Record> {
    match self.synthesizer.synthesize(master.key, &Principal::system()).await {
      Ok(view) => Ok(Record {
        fields: view.fields,
        modified_at: view.modified_at,
        ..master
      }),
      Err(Error::RecordNotFound(_)) => Ok(master),
      Err(e) => Err(e),
    }
  }

  async fn retired_masters(&self) -> Result<HashSet<Uuid>> {
    let replaced = edges(&*self.store, EdgeQuery::default().of_type(EdgeType::Replaces)).await?;
    Ok(replaced.into_iter().map(|e| e.target).collect())
  }

  async fn unresolved_locals(&self, resource_type: &str) -> Result<Vec<Record>> {
    let linked: HashSet<Uuid> =
      edges(&*self.store, EdgeQuery::default().of_type(EdgeType::MasterLink))
        .await?
        .into_iter()
        .map(|e| e.source)
        .collect();

    let mut locals = self
      .accessor
      .query(&RecordQuery::locals(resource_type))
      .await
      .map_err(Error::store)?;
    locals.retain(|l| !linked.contains(&l.key));
    Ok(locals)
  }
}
