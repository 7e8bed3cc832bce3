//! Error type for `mdm-store-sqlite`.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
  #[error("database error: {0}")]
  Database(#[from] tokio_rusqlite::Error),

  #[error("json error: {0}")]
  Json(#[from] serde_json::Error),

  #[error("uuid parse error: {0}")]
  Uuid(#[from] uuid::Error),

  #[error("date/time parse error: {0}")]
  DateParse(String),

  #[error("unknown {column} value: {value:?}")]
  UnknownValue {
    column: &'static str,
    value:  String,
  },

  /// An edge to obsolete was already obsolete (or never existed) at commit.
  #[error("edge {0} is no longer active")]
  StaleEdge(uuid::Uuid),

  /// An insertion violated a uniqueness constraint, e.g. a second active
  /// master link for the same local.
  #[error("constraint violated: {0}")]
  Constraint(String),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
