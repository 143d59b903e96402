//! Handlers for `/scopes/{scope}` read endpoints.
//!
//! `{scope}` is either the literal `system` or a scope UUID.
//!
//! | Method | Path | Notes |
//! |--------|------|-------|
//! | `GET`  | `/scopes/{scope}/assignments` | Active assignments |
//! | `GET`  | `/scopes/{scope}/managers` | Members holding a manager role |
//! | `GET`  | `/scopes/{scope}/tree` | Reporting forest; `ETag` + `If-None-Match` |
//! | `GET`  | `/scopes/{scope}/managers/{manager}/team` | Transitive team |
//! | `GET`  | `/scopes/{scope}/managers/{manager}/stats` | 404 if not a member |

use std::{collections::BTreeSet, sync::Arc};

use axum::{
  Json,
  extract::{Path, State},
  http::{HeaderMap, HeaderValue, StatusCode, header},
  response::{IntoResponse, Response},
};
use ladder_core::{
  assignment::Assignment,
  ids::{PersonId, RoleScope},
  store::{HierarchyStore, ManagerCandidate},
  tree::TeamStatistics,
};
use serde::Serialize;

use crate::{
  error::ApiError,
  etag::{compute_etag, if_none_match},
};

/// `GET /scopes/{scope}/assignments`
pub async fn assignments<S>(
  State(store): State<Arc<S>>,
  Path(scope): Path<RoleScope>,
) -> Result<Json<Vec<Assignment>>, ApiError>
where
  S: HierarchyStore,
{
  let rows = store.list_assignments(scope).await.map_err(ApiError::store)?;
  Ok(Json(rows))
}

/// `GET /scopes/{scope}/managers`
pub async fn managers<S>(
  State(store): State<Arc<S>>,
  Path(scope): Path<RoleScope>,
) -> Result<Json<Vec<ManagerCandidate>>, ApiError>
where
  S: HierarchyStore,
{
  let candidates =
    store.available_managers(scope).await.map_err(ApiError::store)?;
  Ok(Json(candidates))
}

// ─── Tree ─────────────────────────────────────────────────────────────────────

/// `GET /scopes/{scope}/tree`
pub async fn tree<S>(
  State(store): State<Arc<S>>,
  Path(scope): Path<RoleScope>,
  headers: HeaderMap,
) -> Result<Response, ApiError>
where
  S: HierarchyStore,
{
  let forest = store.build_tree(scope).await.map_err(ApiError::store)?;
  let etag = compute_etag(&forest);

  let fresh = headers
    .get(header::IF_NONE_MATCH)
    .and_then(|v| v.to_str().ok())
    .is_some_and(|v| if_none_match(v, &etag));

  let etag_value = HeaderValue::from_str(&etag)
    .map_err(|e| ApiError::Internal(format!("unrepresentable etag: {e}")))?;

  if fresh {
    return Ok(
      (StatusCode::NOT_MODIFIED, [(header::ETAG, etag_value)]).into_response(),
    );
  }
  Ok(([(header::ETAG, etag_value)], Json(&*forest)).into_response())
}

// ─── Team ─────────────────────────────────────────────────────────────────────

#[derive(Debug, Serialize)]
pub struct TeamResponse {
  pub manager_id: PersonId,
  pub scope:      RoleScope,
  pub members:    BTreeSet<PersonId>,
}

/// `GET /scopes/{scope}/managers/{manager}/team`
///
/// Empty when the person holds no manager role in the scope.
pub async fn team<S>(
  State(store): State<Arc<S>>,
  Path((scope, manager)): Path<(RoleScope, PersonId)>,
) -> Result<Json<TeamResponse>, ApiError>
where
  S: HierarchyStore,
{
  let members = store
    .compute_visible_set(manager, scope)
    .await
    .map_err(ApiError::store)?;
  Ok(Json(TeamResponse { manager_id: manager, scope, members }))
}

/// `GET /scopes/{scope}/managers/{manager}/stats`
pub async fn stats<S>(
  State(store): State<Arc<S>>,
  Path((scope, manager)): Path<(RoleScope, PersonId)>,
) -> Result<Json<TeamStatistics>, ApiError>
where
  S: HierarchyStore,
{
  let stats = store
    .team_statistics(manager, scope)
    .await
    .map_err(ApiError::store)?
    .ok_or_else(|| {
      ApiError::NotFound(format!("{manager} is not a member of scope {scope}"))
    })?;
  Ok(Json(stats))
}
