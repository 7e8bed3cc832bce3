//! The input/output contract of a record-matching classifier.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// The classifier's verdict on one probe/candidate pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchLabel {
  Match,
  Probable,
  NonMatch,
}

/// One scored candidate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchResult {
  pub candidate: Uuid,
  pub score:     f64,
  pub label:     MatchLabel,
}

/// A named matching configuration known to the classifier.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchConfiguration {
  pub id:        String,
  /// Scores at or above this value produce a candidate edge.
  pub threshold: f64,
  pub active:    bool,
}

impl MatchConfiguration {
  pub fn accepts(&self, result: &MatchResult) -> bool { result.score >= self.threshold }
}
