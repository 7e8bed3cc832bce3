//! Handlers for `/masters` endpoints.
//!
//! | Method   | Path | Notes |
//! |----------|------|-------|
//! | `GET`    | `/masters/:key` | Golden record as the request's principal sees it |
//! | `POST`   | `/masters/:key/links/:local` | Link a local |
//! | `DELETE` | `/masters/:key/links/:local` | Unlink a local |
//! | `POST`   | `/masters/:key/ignored/:local` | Reject a candidate pair |
//! | `DELETE` | `/masters/:key/ignored/:local` | Withdraw a rejection |
//! | `PUT`    | `/masters/:key/record-of-truth/:local` | Set the record of truth |
//! | `DELETE` | `/masters/:key/record-of-truth` | Clear the record of truth |
//! | `POST`   | `/masters/:key/merge/:retired` | Retire another master into this one |
//!
//! Every mutation accepts `?dry_run=true`.

use axum::{
  Json,
  extract::{Path, Query, State},
  http::HeaderMap,
  response::{IntoResponse, Response},
};
use mdm_core::{record::SynthesizedRecord, store::Classifier, transaction::Transaction};
use uuid::Uuid;

use crate::{Backend, MutationParams, Services, error::ApiError, principal_from};

/// Commit `tx`, or return it untouched on a dry run.
pub(crate) async fn respond<S, C>(
  services: &Services<S, C>,
  tx: Transaction,
  dry_run: bool,
) -> Result<Response, ApiError>
where
  S: Backend,
  C: Classifier + 'static,
{
  if dry_run {
    return Ok(Json(tx).into_response());
  }
  let committed = services.linkage.commit(tx).await?;
  Ok(Json(committed).into_response())
}

// ─── Synthesis ───────────────────────────────────────────────────────────────

/// `GET /masters/:key`
pub async fn get_one<S, C>(
  State(services): State<Services<S, C>>,
  Path(key): Path<Uuid>,
  headers: HeaderMap,
) -> Result<Json<SynthesizedRecord>, ApiError>
where
  S: Backend,
  C: Classifier + 'static,
{
  let principal = principal_from(&headers)?;
  let golden = services.synthesizer.synthesize(key, &principal).await?;
  Ok(Json(golden))
}

// ─── Links ───────────────────────────────────────────────────────────────────

/// `POST /masters/:key/links/:local`
pub async fn link<S, C>(
  State(services): State<Services<S, C>>,
  Path((key, local)): Path<(Uuid, Uuid)>,
  Query(params): Query<MutationParams>,
) -> Result<Response, ApiError>
where
  S: Backend,
  C: Classifier + 'static,
{
  let tx = services.linkage.link(key, local).await?;
  respond(&services, tx, params.dry_run).await
}

/// `DELETE /masters/:key/links/:local`
pub async fn unlink<S, C>(
  State(services): State<Services<S, C>>,
  Path((key, local)): Path<(Uuid, Uuid)>,
  Query(params): Query<MutationParams>,
) -> Result<Response, ApiError>
where
  S: Backend,
  C: Classifier + 'static,
{
  let tx = services.linkage.unlink(key, local).await?;
  respond(&services, tx, params.dry_run).await
}

// ─── Ignore ──────────────────────────────────────────────────────────────────

/// `POST /masters/:key/ignored/:local`
pub async fn ignore<S, C>(
  State(services): State<Services<S, C>>,
  Path((key, local)): Path<(Uuid, Uuid)>,
  Query(params): Query<MutationParams>,
) -> Result<Response, ApiError>
where
  S: Backend,
  C: Classifier + 'static,
{
  let tx = services.linkage.ignore(key, local).await?;
  respond(&services, tx, params.dry_run).await
}

/// `DELETE /masters/:key/ignored/:local`
pub async fn unignore<S, C>(
  State(services): State<Services<S, C>>,
  Path((key, local)): Path<(Uuid, Uuid)>,
  Query(params): Query<MutationParams>,
) -> Result<Response, ApiError>
where
  S: Backend,
  C: Classifier + 'static,
{
  let tx = services.linkage.unignore(key, local).await?;
  respond(&services, tx, params.dry_run).await
}

// ─── Record of truth ─────────────────────────────────────────────────────────

/// `PUT /masters/:key/record-of-truth/:local`
pub async fn set_record_of_truth<S, C>(
  State(services): State<Services<S, C>>,
  Path((key, local)): Path<(Uuid, Uuid)>,
  Query(params): Query<MutationParams>,
) -> Result<Response, ApiError>
where
  S: Backend,
  C: Classifier + 'static,
{
  let tx = services.linkage.set_record_of_truth(key, local).await?;
  respond(&services, tx, params.dry_run).await
}

/// `DELETE /masters/:key/record-of-truth`
pub async fn clear_record_of_truth<S, C>(
  State(services): State<Services<S, C>>,
  Path(key): Path<Uuid>,
  Query(params): Query<MutationParams>,
) -> Result<Response, ApiError>
where
  S: Backend,
  C: Classifier + 'static,
{
  let tx = services.linkage.clear_record_of_truth(key).await?;
  respond(&services, tx, params.dry_run).await
}

// ─── Merge ───────────────────────────────────────────────────────────────────

/// `POST /masters/:key/merge/:retired`
pub async fn merge<S, C>(
  State(services): State<Services<S, C>>,
  Path((key, retired)): Path<(Uuid, Uuid)>,
  Query(params): Query<MutationParams>,
) -> Result<Response, ApiError>
where
  S: Backend,
  C: Classifier + 'static,
{
  let tx = services.linkage.merge(key, retired).await?;
  respond(&services, tx, params.dry_run).await
}
