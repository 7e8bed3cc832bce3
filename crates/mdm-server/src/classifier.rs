//! A deterministic reference classifier: the score of a pair is the share of
//! configured field weight on which both records agree.

use std::collections::BTreeMap;

use mdm_core::{
  matching::{MatchConfiguration, MatchLabel, MatchResult},
  record::{Record, is_empty_value},
  store::Classifier,
};
use serde::Deserialize;
use serde_json::Value;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ClassifierError {
  #[error("unknown matching configuration: {0}")]
  UnknownConfiguration(String),

  #[error("matching configuration {0} has no positive field weights")]
  NoWeights(String),
}

/// One `[[matching]]` table of the server configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct MatchingConfig {
  pub id:        String,
  pub threshold: f64,
  #[serde(default = "default_active")]
  pub active:    bool,
  /// Field name to weight.
  #[serde(default)]
  pub fields:    BTreeMap<String, f64>,
}

fn default_active() -> bool { true }

pub struct WeightedFieldClassifier {
  configs: Vec<MatchingConfig>,
}

impl WeightedFieldClassifier {
  pub fn new(configs: Vec<MatchingConfig>) -> Self { Self { configs } }

  fn find(&self, id: &str) -> Option<&MatchingConfig> { self.configs.iter().find(|c| c.id == id) }

  fn score(config: &MatchingConfig, probe: &Record, candidate: &Record) -> f64 {
    let total: f64 = config.fields.values().filter(|w| **w > 0.0).sum();
    let agreed: f64 = config
      .fields
      .iter()
      .filter(|(_, w)| **w > 0.0)
      .filter(|(name, _)| match (probe.field(name), candidate.field(name)) {
        (Some(a), Some(b)) if !is_empty_value(a) && !is_empty_value(b) => {
          normalize(a) == normalize(b)
        }
        _ => false,
      })
      .map(|(_, w)| *w)
      .sum();
    agreed / total
  }
}

/// Case- and whitespace-insensitive form of string values.
fn normalize(value: &Value) -> Value {
  match value {
    Value::String(s) => Value::String(
      s.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase(),
    ),
    other => other.clone(),
  }
}

impl Classifier for WeightedFieldClassifier {
  type Error = ClassifierError;

  fn configuration(&self, id: &str) -> Option<MatchConfiguration> {
    self.find(id).map(|c| MatchConfiguration {
      id:        c.id.clone(),
      threshold: c.threshold,
      active:    c.active,
    })
  }

  async fn classify(
    &self,
    probe: &Record,
    candidates: &[Record],
    configuration: &str,
  ) -> Result<Vec<MatchResult>, ClassifierError> {
    let config = self
      .find(configuration)
      .ok_or_else(|| ClassifierError::UnknownConfiguration(configuration.to_owned()))?;
    if !config.fields.values().any(|w| *w > 0.0) {
      return Err(ClassifierError::NoWeights(config.id.clone()));
    }

    Ok(
      candidates
        .iter()
        .map(|candidate| {
          let score = Self::score(config, probe, candidate);
          let label = if score >= 1.0 {
            MatchLabel::Match
          } else if score >= config.threshold {
            MatchLabel::Probable
          } else {
            MatchLabel::NonMatch
          };
          MatchResult { candidate: candidate.key, score, label }
        })
        .collect(),
    )
  }
}
