//! Error types for `mdm-core`.
//!
//! Every error raised by the engine carries an [`ErrorKind`] so that outer
//! layers (REST, batch jobs) can translate it into their own status codes
//! without matching on individual variants.

use serde::Serialize;
use thiserror::Error;
use uuid::Uuid;

/// A boxed error from a collaborator (store, classifier, notification sink).
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// The coarse category of an [`Error`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
  /// Matching is not configured or the classifier failed. Never retried.
  NotConfigured,
  /// Unknown master, local or edge.
  NotFound,
  /// The operation would violate a relationship graph invariant.
  InvalidState,
  /// A concurrent mutation won the race at commit.
  Conflict,
  /// The caller may not see any record contributing to a master.
  PrivacyDenied,
  /// A backend read failed.
  Backend,
}

#[derive(Debug, Error)]
pub enum Error {
  #[error("matching is not configured: {0}")]
  NotConfigured(String),

  #[error("classifier failed: {0}")]
  Classifier(#[source] BoxError),

  #[error("record not found: {0}")]
  RecordNotFound(Uuid),

  #[error("edge not found: {0}")]
  EdgeNotFound(String),

  #[error("invalid state: {0}")]
  InvalidState(String),

  #[error("conflict: {0}")]
  Conflict(String),

  #[error("no records visible to the caller for master {0}")]
  PrivacyDenied(Uuid),

  #[error("store error: {0}")]
  Store(#[source] BoxError),
}

impl Error {
  /// Wrap a backend read failure.
  pub fn store(e: impl std::error::Error + Send + Sync + 'static) -> Self {
    Self::Store(Box::new(e))
  }

  pub fn kind(&self) -> ErrorKind {
    match self {
      Self::NotConfigured(_) | Self::Classifier(_) => ErrorKind::NotConfigured,
      Self::RecordNotFound(_) | Self::EdgeNotFound(_) => ErrorKind::NotFound,
      Self::InvalidState(_) => ErrorKind::InvalidState,
      Self::Conflict(_) => ErrorKind::Conflict,
      Self::PrivacyDenied(_) => ErrorKind::PrivacyDenied,
      Self::Store(_) => ErrorKind::Backend,
    }
  }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
