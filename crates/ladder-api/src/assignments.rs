//! Handlers for `/assignments` endpoints.
//!
//! | Method   | Path | Notes |
//! |----------|------|-------|
//! | `POST`   | `/assignments` | Body: [`AssignManager`]; returns 201 + the new active row |
//! | `POST`   | `/assignments/validate` | Same body; dry run, never writes |
//! | `GET`    | `/assignments/{person}` | `?scope` required |
//! | `DELETE` | `/assignments/{person}/manager` | `?scope&actor[&reason]`; returns the successor row |
//! | `DELETE` | `/assignments/{person}` | `?scope&actor[&reason]`; returns the audit event |

use std::sync::Arc;

use axum::{
  Json,
  extract::{Path, Query, State},
  http::StatusCode,
  response::IntoResponse,
};
use ladder_core::{
  Classify, ErrorKind,
  assignment::{AssignManager, Assignment, Removal, Verdict},
  audit::HierarchyChangeEvent,
  ids::{PersonId, RoleScope},
  store::HierarchyStore,
};
use serde::{Deserialize, Serialize};

use crate::error::ApiError;

// ─── Assign ───────────────────────────────────────────────────────────────────

/// `POST /assignments`
pub async fn assign<S>(
  State(store): State<Arc<S>>,
  Json(body): Json<AssignManager>,
) -> Result<impl IntoResponse, ApiError>
where
  S: HierarchyStore,
{
  let assignment = store.assign_manager(body).await.map_err(ApiError::store)?;
  Ok((StatusCode::CREATED, Json(assignment)))
}

// ─── Validate ─────────────────────────────────────────────────────────────────

#[derive(Debug, Serialize)]
pub struct ValidationResponse {
  pub valid: bool,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub kind:  Option<ErrorKind>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub error: Option<String>,
}

impl From<Verdict> for ValidationResponse {
  fn from(verdict: Verdict) -> Self {
    match verdict {
      Verdict::Accepted => Self { valid: true, kind: None, error: None },
      Verdict::Rejected(e) => Self {
        valid: false,
        kind:  Some(e.kind()),
        error: Some(e.to_string()),
      },
    }
  }
}

/// `POST /assignments/validate`
///
/// A rejected assignment is still a 200; only storage failures are errors.
pub async fn validate<S>(
  State(store): State<Arc<S>>,
  Json(body): Json<AssignManager>,
) -> Result<Json<ValidationResponse>, ApiError>
where
  S: HierarchyStore,
{
  let verdict = store.validate_assignment(body).await.map_err(ApiError::store)?;
  Ok(Json(verdict.into()))
}

// ─── Get one ──────────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct ScopeParams {
  pub scope: RoleScope,
}

/// `GET /assignments/{person}?scope=...`
pub async fn get_one<S>(
  State(store): State<Arc<S>>,
  Path(person): Path<PersonId>,
  Query(params): Query<ScopeParams>,
) -> Result<Json<Assignment>, ApiError>
where
  S: HierarchyStore,
{
  let assignment = store
    .get_assignment(person, params.scope)
    .await
    .map_err(ApiError::store)?
    .ok_or_else(|| {
      ApiError::NotFound(format!(
        "no active assignment for {person} in scope {}",
        params.scope
      ))
    })?;
  Ok(Json(assignment))
}

// ─── Removal ──────────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct RemovalParams {
  pub scope:  RoleScope,
  pub actor:  PersonId,
  pub reason: Option<String>,
}

impl RemovalParams {
  fn into_removal(self, person: PersonId) -> Removal {
    Removal {
      person_id: person,
      scope:     self.scope,
      actor:     self.actor,
      reason:    self.reason,
    }
  }
}

/// `DELETE /assignments/{person}/manager?scope=...&actor=...`
pub async fn remove_manager<S>(
  State(store): State<Arc<S>>,
  Path(person): Path<PersonId>,
  Query(params): Query<RemovalParams>,
) -> Result<Json<Assignment>, ApiError>
where
  S: HierarchyStore,
{
  let successor = store
    .remove_manager(params.into_removal(person))
    .await
    .map_err(ApiError::store)?;
  Ok(Json(successor))
}

/// `DELETE /assignments/{person}?scope=...&actor=...`
pub async fn release<S>(
  State(store): State<Arc<S>>,
  Path(person): Path<PersonId>,
  Query(params): Query<RemovalParams>,
) -> Result<Json<HierarchyChangeEvent>, ApiError>
where
  S: HierarchyStore,
{
  let event = store
    .release_person(params.into_removal(person))
    .await
    .map_err(ApiError::store)?;
  Ok(Json(event))
}
