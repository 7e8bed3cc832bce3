//! JSON REST API for the MDM engine.
//!
//! Exposes an axum [`Router`] over a [`Services`] bundle built from any store
//! implementing both [`RecordAccessor`] and [`RelationshipStore`], and any
//! [`Classifier`]. Authentication is the caller's responsibility; the
//! principal a request acts for is taken from the `x-mdm-principal` and
//! `x-mdm-sources` headers set by the fronting proxy.
//!
//! # Mounting
//!
//! ```rust,ignore
//! .nest("/api", mdm_api::api_router(services))
//! ```

pub mod candidates;
pub mod error;
pub mod masters;

use std::sync::Arc;

use axum::{
  Router,
  http::HeaderMap,
  routing::{delete, get, post, put},
};
use mdm_core::{
  privacy::{Principal, PrivacyFilter},
  store::{Classifier, NotificationSink, RecordAccessor, RelationshipStore},
};
use mdm_engine::{CandidateEvaluator, EngineConfig, LinkageCoordinator, MasterSynthesizer};
use serde::Deserialize;

pub use error::ApiError;

/// Header naming the principal a request acts for.
pub const PRINCIPAL_HEADER: &str = "x-mdm-principal";
/// Comma-separated source systems the principal is cleared for.
pub const SOURCES_HEADER: &str = "x-mdm-sources";

/// A store serving both records and relationship edges.
pub trait Backend: RecordAccessor + RelationshipStore + 'static {}

impl<T: RecordAccessor + RelationshipStore + 'static> Backend for T {}

// ─── Services ────────────────────────────────────────────────────────────────

/// The engine components shared by all handlers.
pub struct Services<S, C> {
  pub synthesizer: Arc<MasterSynthesizer<S, S>>,
  pub linkage:     Arc<LinkageCoordinator<S, S>>,
  pub candidates:  Arc<CandidateEvaluator<S, S, C>>,
}

impl<S, C> Clone for Services<S, C> {
  fn clone(&self) -> Self {
    Self {
      synthesizer: self.synthesizer.clone(),
      linkage:     self.linkage.clone(),
      candidates:  self.candidates.clone(),
    }
  }
}

impl<S: Backend, C: Classifier + 'static> Services<S, C> {
  pub fn new(
    store: Arc<S>,
    classifier: Arc<C>,
    privacy: Arc<dyn PrivacyFilter>,
    sink: Arc<dyn NotificationSink>,
    config: &EngineConfig,
  ) -> Self {
    Self {
      synthesizer: Arc::new(
        MasterSynthesizer::new(store.clone(), store.clone(), privacy).with_config(config),
      ),
      linkage:     Arc::new(LinkageCoordinator::new(store.clone(), store.clone(), sink)),
      candidates:  Arc::new(CandidateEvaluator::new(
        store.clone(),
        store,
        classifier,
        config.clone(),
      )),
    }
  }
}

// ─── Request helpers ─────────────────────────────────────────────────────────

/// `?dry_run=true` returns the built transaction instead of committing it.
#[derive(Debug, Default, Deserialize)]
pub struct MutationParams {
  #[serde(default)]
  pub dry_run: bool,
}

/// The principal described by the request headers. Without a principal
/// header the request acts as the unrestricted system principal.
pub fn principal_from(headers: &HeaderMap) -> Result<Principal, ApiError> {
  let Some(name) = header_str(headers, PRINCIPAL_HEADER)? else {
    return Ok(Principal::system());
  };
  match header_str(headers, SOURCES_HEADER)? {
    Some(sources) => Ok(Principal::restricted(
      name,
      sources.split(',').map(str::trim).filter(|s| !s.is_empty()),
    )),
    None => Ok(Principal { name: name.to_owned(), allowed_sources: None }),
  }
}

fn header_str<'h>(headers: &'h HeaderMap, name: &str) -> Result<Option<&'h str>, ApiError> {
  headers
    .get(name)
    .map(|v| {
      v.to_str()
        .map_err(|_| ApiError::BadRequest(format!("{name} is not valid UTF-8")))
    })
    .transpose()
}

// ─── Router ──────────────────────────────────────────────────────────────────

/// Build a fully-materialised API router for `services`.
pub fn api_router<S, C>(services: Services<S, C>) -> Router<()>
where
  S: Backend,
  C: Classifier + 'static,
{
  Router::new()
    // Masters
    .route("/masters/{key}", get(masters::get_one::<S, C>))
    .route(
      "/masters/{key}/links/{local}",
      post(masters::link::<S, C>).delete(masters::unlink::<S, C>),
    )
    .route(
      "/masters/{key}/ignored/{local}",
      post(masters::ignore::<S, C>).delete(masters::unignore::<S, C>),
    )
    .route(
      "/masters/{key}/record-of-truth/{local}",
      put(masters::set_record_of_truth::<S, C>),
    )
    .route(
      "/masters/{key}/record-of-truth",
      delete(masters::clear_record_of_truth::<S, C>),
    )
    .route("/masters/{key}/merge/{retired}", post(masters::merge::<S, C>))
    // Candidates
    .route("/candidates/detect", post(candidates::detect::<S, C>))
    .route("/candidates/detect-all", post(candidates::detect_all::<S, C>))
    .with_state(services)
}
