//! Error type for `ladder-store-sqlite`.

use ladder_core::{Classify, ErrorKind};
use rusqlite::{ErrorCode, ffi};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
  #[error(transparent)]
  Core(#[from] ladder_core::Error),

  #[error("database error: {0}")]
  Database(#[source] tokio_rusqlite::Error),

  /// The database was busy, or a racing writer claimed the same active
  /// assignment slot first. Safe to retry against fresh state.
  #[error("write contention: {0}")]
  Contention(#[source] tokio_rusqlite::Error),

  #[error("json error: {0}")]
  Json(#[from] serde_json::Error),

  #[error("uuid parse error: {0}")]
  Uuid(#[from] uuid::Error),

  #[error("decode error: {0}")]
  Decode(String),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

impl Error {
  pub fn is_contention(&self) -> bool { matches!(self, Self::Contention(_)) }
}

impl From<tokio_rusqlite::Error> for Error {
  fn from(e: tokio_rusqlite::Error) -> Self {
    let contended = match &e {
      tokio_rusqlite::Error::Rusqlite(inner) => is_contention(inner),
      _ => false,
    };
    if contended { Self::Contention(e) } else { Self::Database(e) }
  }
}

impl From<rusqlite::Error> for Error {
  fn from(e: rusqlite::Error) -> Self { tokio_rusqlite::Error::Rusqlite(e).into() }
}

fn is_contention(e: &rusqlite::Error) -> bool {
  match e {
    rusqlite::Error::SqliteFailure(failure, _) => {
      matches!(failure.code, ErrorCode::DatabaseBusy | ErrorCode::DatabaseLocked)
        || failure.extended_code == ffi::SQLITE_CONSTRAINT_UNIQUE
    }
    _ => false,
  }
}

impl Classify for Error {
  fn kind(&self) -> ErrorKind {
    match self {
      Self::Core(e) => e.kind(),
      Self::Contention(_) => ErrorKind::ConcurrentConflict,
      Self::Database(_) | Self::Json(_) | Self::Uuid(_) | Self::Decode(_) => {
        ErrorKind::Internal
      }
    }
  }
}
