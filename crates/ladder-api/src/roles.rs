//! Handlers for `/roles` endpoints.
//!
//! | Method   | Path | Notes |
//! |----------|------|-------|
//! | `GET`    | `/roles` | Optional `?kind=system\|scope`; retired roles are omitted |
//! | `POST`   | `/roles` | Body: [`NewRole`]; returns 201 + stored role |
//! | `DELETE` | `/roles/{id}` | Retires the role; returns the retired row |

use std::sync::Arc;

use axum::{
  Json,
  extract::{Path, Query, State},
  http::StatusCode,
  response::IntoResponse,
};
use ladder_core::{
  ids::RoleId,
  role::{HierarchicalRole, NewRole, RoleTypeKind},
  store::HierarchyStore,
};
use serde::Deserialize;

use crate::error::ApiError;

#[derive(Debug, Deserialize)]
pub struct ListParams {
  pub kind: Option<RoleTypeKind>,
}

/// `GET /roles[?kind=...]`
pub async fn list<S>(
  State(store): State<Arc<S>>,
  Query(params): Query<ListParams>,
) -> Result<Json<Vec<HierarchicalRole>>, ApiError>
where
  S: HierarchyStore,
{
  let roles = store.list_roles(params.kind).await.map_err(ApiError::store)?;
  Ok(Json(roles))
}

/// `POST /roles`
pub async fn create<S>(
  State(store): State<Arc<S>>,
  Json(body): Json<NewRole>,
) -> Result<impl IntoResponse, ApiError>
where
  S: HierarchyStore,
{
  if body.code.trim().is_empty() || body.name.trim().is_empty() {
    return Err(ApiError::BadRequest("role name and code are required".into()));
  }
  let role = store.create_role(body).await.map_err(ApiError::store)?;
  Ok((StatusCode::CREATED, Json(role)))
}

/// `DELETE /roles/{id}`
pub async fn retire<S>(
  State(store): State<Arc<S>>,
  Path(id): Path<RoleId>,
) -> Result<Json<HierarchicalRole>, ApiError>
where
  S: HierarchyStore,
{
  let role = store.retire_role(id).await.map_err(ApiError::store)?;
  Ok(Json(role))
}
