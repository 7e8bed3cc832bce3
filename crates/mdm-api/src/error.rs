//! API error type and [`axum::response::IntoResponse`] implementation.

use axum::{
  Json,
  http::StatusCode,
  response::{IntoResponse, Response},
};
use mdm_core::ErrorKind;
use serde_json::json;
use thiserror::Error;

/// An error returned by an API handler.
#[derive(Debug, Error)]
pub enum ApiError {
  #[error("bad request: {0}")]
  BadRequest(String),

  #[error(transparent)]
  Engine(#[from] mdm_core::Error),
}

impl ApiError {
  fn status(&self) -> StatusCode {
    match self {
      ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
      ApiError::Engine(e) => match e.kind() {
        // Privacy denials are reported exactly like unknown keys.
        ErrorKind::NotFound | ErrorKind::PrivacyDenied => StatusCode::NOT_FOUND,
        ErrorKind::InvalidState => StatusCode::UNPROCESSABLE_ENTITY,
        ErrorKind::Conflict => StatusCode::CONFLICT,
        ErrorKind::NotConfigured => StatusCode::SERVICE_UNAVAILABLE,
        ErrorKind::Backend => StatusCode::INTERNAL_SERVER_ERROR,
      },
    }
  }

  fn kind(&self) -> &'static str {
    match self {
      ApiError::BadRequest(_) => "bad_request",
      ApiError::Engine(e) => match e.kind() {
        ErrorKind::NotFound | ErrorKind::PrivacyDenied => "not_found",
        ErrorKind::InvalidState => "invalid_state",
        ErrorKind::Conflict => "conflict",
        ErrorKind::NotConfigured => "not_configured",
        ErrorKind::Backend => "backend",
      },
    }
  }
}

impl IntoResponse for ApiError {
  fn into_response(self) -> Response {
    let status = self.status();
    if status.is_server_error() {
      tracing::error!(error = %self, "request failed");
    }
    let message = match &self {
      ApiError::Engine(mdm_core::Error::PrivacyDenied(key)) => format!("record not found: {key}"),
      other => other.to_string(),
    };
    (status, Json(json!({ "error": message, "kind": self.kind() }))).into_response()
  }
}

#[cfg(test)]
mod tests {
  use mdm_core::Error;
  use uuid::Uuid;

  use super::*;

  #[test]
  fn engine_errors_map_to_statuses() {
    let key = Uuid::new_v4();
    let cases = [
      (Error::RecordNotFound(key), StatusCode::NOT_FOUND),
      (Error::PrivacyDenied(key), StatusCode::NOT_FOUND),
      (Error::InvalidState("linked".into()), StatusCode::UNPROCESSABLE_ENTITY),
      (Error::Conflict("raced".into()), StatusCode::CONFLICT),
      (Error::NotConfigured("none".into()), StatusCode::SERVICE_UNAVAILABLE),
      (Error::Store("disk".into()), StatusCode::INTERNAL_SERVER_ERROR),
    ];
    for (err, status) in cases {
      assert_eq!(ApiError::from(err).into_response().status(), status);
    }
  }
}
