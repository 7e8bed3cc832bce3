//! Handlers for `/candidates` endpoints.
//!
//! | Method | Path | Notes |
//! |--------|------|-------|
//! | `POST` | `/candidates/detect` | Body: [`DetectBody`]; one master or local |
//! | `POST` | `/candidates/detect-all` | Body: [`DetectAllBody`]; every unresolved local of a type |

use axum::{Json, extract::State, response::Response};
use mdm_core::{ErrorKind, store::Classifier};
use serde::{Deserialize, Serialize};
use tracing::warn;
use uuid::Uuid;

use crate::{Backend, Services, error::ApiError, masters::respond};

// ─── Single record ───────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct DetectBody {
  pub key:             Uuid,
  /// Retire earlier automatic candidates in scope first. Default `false`.
  #[serde(default)]
  pub clear_automatic: bool,
  #[serde(default)]
  pub dry_run:         bool,
}

/// `POST /candidates/detect`
pub async fn detect<S, C>(
  State(services): State<Services<S, C>>,
  Json(body): Json<DetectBody>,
) -> Result<Response, ApiError>
where
  S: Backend,
  C: Classifier + 'static,
{
  let tx = services
    .candidates
    .detect_candidates(body.key, body.clear_automatic)
    .await?;
  respond(&services, tx, body.dry_run).await
}

// ─── Batch ───────────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct DetectAllBody {
  pub resource_type:   String,
  #[serde(default)]
  pub clear_automatic: bool,
}

/// Outcome of a batch run.
#[derive(Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct BatchSummary {
  /// Transactions committed, one per local whose candidates changed.
  pub committed: usize,
  /// Transactions that lost a race with a concurrent mutation.
  pub conflicts: usize,
  pub inserted:  usize,
  pub obsoleted: usize,
}

/// `POST /candidates/detect-all`
///
/// Each local's transaction is committed on its own; a conflict on one local
/// is counted and does not stop the batch.
pub async fn detect_all<S, C>(
  State(services): State<Services<S, C>>,
  Json(body): Json<DetectAllBody>,
) -> Result<Json<BatchSummary>, ApiError>
where
  S: Backend,
  C: Classifier + 'static,
{
  let transactions = services
    .candidates
    .detect_all(&body.resource_type, body.clear_automatic)
    .await?;

  let mut summary = BatchSummary::default();
  for tx in transactions {
    match services.linkage.commit(tx).await {
      Ok(committed) => {
        summary.committed += 1;
        summary.inserted += committed.inserted.len();
        summary.obsoleted += committed.obsoleted.len();
      }
      Err(e) if e.kind() == ErrorKind::Conflict => {
        warn!(error = %e, "skipping conflicted candidate transaction");
        summary.conflicts += 1;
      }
      Err(e) => return Err(e.into()),
    }
  }
  Ok(Json(summary))
}
