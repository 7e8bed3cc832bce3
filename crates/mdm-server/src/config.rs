//! Server configuration, deserialised from `mdm.toml` and `MDM_*`
//! environment variables.

use std::path::{Path, PathBuf};

use mdm_engine::EngineConfig;
use serde::Deserialize;

use crate::classifier::MatchingConfig;

/// Runtime server configuration.
#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct ServerConfig {
  pub host:       String,
  pub port:       u16,
  pub store_path: PathBuf,
  pub engine:     EngineConfig,
  /// Matching configurations offered by the classifier.
  pub matching:   Vec<MatchingConfig>,
}

impl Default for ServerConfig {
  fn default() -> Self {
    Self {
      host:       "127.0.0.1".to_owned(),
      port:       8080,
      store_path: PathBuf::from("mdm.sqlite3"),
      engine:     EngineConfig::default(),
      matching:   Vec::new(),
    }
  }
}

impl ServerConfig {
  pub fn address(&self) -> String { format!("{}:{}", self.host, self.port) }

  /// The store path with a leading `~` expanded to the home directory.
  pub fn expanded_store_path(&self) -> PathBuf { expand_tilde(&self.store_path) }
}

/// Expand a leading `~` to the user's home directory.
fn expand_tilde(path: &Path) -> PathBuf {
  let s = path.to_string_lossy();
  if let Some(rest) = s.strip_prefix("~/")
    && let Ok(home) = std::env::var("HOME")
  {
    return PathBuf::from(home).join(rest);
  }
  path.to_path_buf()
}
