//! Engine configuration.

use serde::{Deserialize, Serialize};

/// Tunables for the engine, usually read from the `[engine]` table of the
/// server configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
  /// Id of the classifier's matching configuration used for candidates.
  pub match_configuration: String,
  /// Number of locals evaluated concurrently in batch detection.
  pub batch_concurrency:   usize,
  /// How many lineage hops synthesis follows when a master has no visible
  /// locals of its own.
  pub lineage_depth:       usize,
}

impl Default for EngineConfig {
  fn default() -> Self {
    Self {
      match_configuration: "default".to_owned(),
      batch_concurrency:   8,
      lineage_depth:       3,
    }
  }
}
