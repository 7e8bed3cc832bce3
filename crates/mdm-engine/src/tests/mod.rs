//! End-to-end tests for the engine against an in-memory `SqliteStore`.


use std::{
  collections::HashMap,
  sync::{Arc, Mutex},
};

use chrono::{DateTime, TimeZone as _, Utc};
use mdm_core::{
  BoxError,
  edge::{EdgeType, RelationshipEdge},
  matching::{MatchConfiguration, MatchLabel, MatchResult},
  privacy::{AllowAll, PrivacyFilter},
  record::Record,
  store::{Classifier, EdgeQuery, NotificationSink, RelationshipStore},
};
use mdm_store_sqlite::SqliteStore;
use uuid::Uuid;

use crate::{CandidateEvaluator, EngineConfig, LinkageCoordinator, MasterSynthesizer};

pub fn at(secs: i64) -> DateTime<Utc> { Utc.timestamp_opt(secs, 0).unwrap() }

pub fn key(n: u128) -> Uuid { Uuid::from_u128(n) }

// ─── Notification sink ───────────────────────────────────────────────────────

#[derive(Default)]
pub struct RecordingSink {
  pub events: Mutex<Vec<(&'static str, Uuid, Uuid)>>,
  pub fail:   bool,
}

impl RecordingSink {
  pub fn count(&self, kind: &str) -> usize {
    self
      .events
      .lock()
      .unwrap()
      .iter()
      .filter(|(k, ..)| *k == kind)
      .count()
  }
}

impl NotificationSink for RecordingSink {
  fn on_link_established(&self, edge: &RelationshipEdge) -> Result<(), BoxError> {
    self
      .events
      .lock()
      .unwrap()
      .push(("established", edge.source, edge.target));
    if self.fail { Err("sink offline".into()) } else { Ok(()) }
  }

  fn on_link_removed(&self, edge: &RelationshipEdge) -> Result<(), BoxError> {
    self
      .events
      .lock()
      .unwrap()
      .push(("removed", edge.source, edge.target));
    if self.fail { Err("sink offline".into()) } else { Ok(()) }
  }
}

// ─── Classifier ──────────────────────────────────────────────────────────────

#[derive(Debug, thiserror::Error)]
#[error("classifier offline")]
pub struct Offline;

/// Returns pre-set scores per (probe, candidate) pair; unknown pairs score 0.
pub struct ScriptedClassifier {
  pub scores:        Mutex<HashMap<(Uuid, Uuid), f64>>,
  pub configuration: Option<MatchConfiguration>,
  pub offline:       bool,
}

impl Default for ScriptedClassifier {
  fn default() -> Self {
    Self {
      scores:        Mutex::new(HashMap::new()),
      configuration: Some(MatchConfiguration {
        id:        "default".into(),
        threshold: 0.5,
        active:    true,
      }),
      offline:       false,
    }
  }
}

impl ScriptedClassifier {
  pub fn score(&self, probe: Uuid, candidate: Uuid, score: f64) {
    self.scores.lock().unwrap().insert((probe, candidate), score);
  }
}

impl Classifier for ScriptedClassifier {
  type Error = Offline;

  fn configuration(&self, id: &str) -> Option<MatchConfiguration> {
    self.configuration.clone().filter(|c| c.id == id)
  }

  async fn classify(
    &self,
    probe: &Record,
    candidates: &[Record],
    _configuration: &str,
  ) -> Result<Vec<MatchResult>, Offline> {
    if self.offline {
      return Err(Offline);
    }
    let scores = self.scores.lock().unwrap();
    Ok(
      candidates
        .iter()
        .map(|c| {
          let score = scores.get(&(probe.key, c.key)).copied().unwrap_or(0.0);
          let label = if score >= 0.8 {
            MatchLabel::Match
          } else if score >= 0.5 {
            MatchLabel::Probable
          } else {
            MatchLabel::NonMatch
          };
          MatchResult { candidate: c.key, score, label }
        })
        .collect(),
    )
  }
}

// ─── Harness ─────────────────────────────────────────────────────────────────

pub struct Harness {
  pub store:   Arc<SqliteStore>,
  pub sink:    Arc<RecordingSink>,
  pub linkage: LinkageCoordinator<SqliteStore, SqliteStore>,
}

pub async fn harness() -> Harness { harness_with_sink(RecordingSink::default()).await }

pub async fn harness_with_sink(sink: RecordingSink) -> Harness {
  let store = Arc::new(SqliteStore::open_in_memory().await.expect("in-memory store"));
  let sink = Arc::new(sink);
  let linkage = LinkageCoordinator::new(store.clone(), store.clone(), sink.clone());
  Harness { store, sink, linkage }
}

impl Harness {
  pub fn synthesizer(&self) -> MasterSynthesizer<SqliteStore, SqliteStore> {
    self.synthesizer_with(Arc::new(AllowAll))
  }

  pub fn synthesizer_with(
    &self,
    privacy: Arc<dyn PrivacyFilter>,
  ) -> MasterSynthesizer<SqliteStore, SqliteStore> {
    MasterSynthesizer::new(self.store.clone(), self.store.clone(), privacy)
  }

  pub fn evaluator(
    &self,
    classifier: Arc<ScriptedClassifier>,
  ) -> CandidateEvaluator<SqliteStore, SqliteStore, ScriptedClassifier> {
    CandidateEvaluator::new(
      self.store.clone(),
      self.store.clone(),
      classifier,
      EngineConfig::default(),
    )
  }

  pub async fn put(&self, record: Record) -> Record {
    self.store.put_record(&record).await.expect("put record");
    record
  }

  pub async fn master(&self) -> Uuid { self.put(Record::master("patient")).await.key }

  /// Link and commit.
  pub async fn linked(&self, master: Uuid, local: Uuid) {
    let tx = self.linkage.link(master, local).await.expect("link");
    self.linkage.commit(tx).await.expect("commit link");
  }

  pub async fn edge(&self, edge: RelationshipEdge) -> RelationshipEdge {
    self.store.insert_edge(edge).await.expect("insert edge")
  }

  pub async fn active(&self, query: EdgeQuery) -> Vec<RelationshipEdge> {
    self.store.query_edges(&query).await.expect("query edges")
  }

  pub async fn master_links_of(&self, local: Uuid) -> Vec<RelationshipEdge> {
    self
      .active(EdgeQuery::from_source(local).of_type(EdgeType::MasterLink))
      .await
  }
}
