//! API error type and [`axum::response::IntoResponse`] implementation.

use axum::{
  Json,
  http::StatusCode,
  response::{IntoResponse, Response},
};
use ladder_core::{Classify, ErrorKind};
use serde_json::json;
use thiserror::Error;

/// An error returned by an API handler.
#[derive(Debug, Error)]
pub enum ApiError {
  #[error("not found: {0}")]
  NotFound(String),

  #[error("bad request: {0}")]
  BadRequest(String),

  #[error("internal error: {0}")]
  Internal(String),

  #[error("{source}")]
  Store {
    kind:   ErrorKind,
    #[source]
    source: Box<dyn std::error::Error + Send + Sync>,
  },
}

impl ApiError {
  /// Wrap a store error, keeping its classification for the status code.
  pub fn store<E>(e: E) -> Self
  where
    E: std::error::Error + Classify + Send + Sync + 'static,
  {
    Self::Store { kind: e.kind(), source: Box::new(e) }
  }

  pub fn kind(&self) -> ErrorKind {
    match self {
      Self::NotFound(_) => ErrorKind::NotFound,
      Self::BadRequest(_) => ErrorKind::Invalid,
      Self::Internal(_) => ErrorKind::Internal,
      Self::Store { kind, .. } => *kind,
    }
  }
}

/// HTTP status for an error class.
pub fn status_for(kind: ErrorKind) -> StatusCode {
  match kind {
    ErrorKind::NotFound => StatusCode::NOT_FOUND,
    ErrorKind::SelfReference
    | ErrorKind::CircularReference
    | ErrorKind::CrossScopeMismatch
    | ErrorKind::Invalid => StatusCode::UNPROCESSABLE_ENTITY,
    ErrorKind::ConcurrentConflict => StatusCode::CONFLICT,
    ErrorKind::PermissionDenied => StatusCode::FORBIDDEN,
    ErrorKind::Internal => StatusCode::INTERNAL_SERVER_ERROR,
  }
}

impl IntoResponse for ApiError {
  fn into_response(self) -> Response {
    let kind = self.kind();
    let status = match &self {
      ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
      _ => status_for(kind),
    };
    if status.is_server_error() {
      tracing::error!(error = %self, "request failed");
    }
    (status, Json(json!({ "error": self.to_string(), "kind": kind }))).into_response()
  }
}
