//! Handlers for dashboard access under `/scopes/{scope}/managers/{manager}`.
//!
//! | Method | Path | Notes |
//! |--------|------|-------|
//! | `GET`  | `.../access` | 404 when no row exists |
//! | `PUT`  | `.../access` | Body: [`DashboardFlags`]; upsert |
//! | `GET`  | `.../can-view/{capability}` | Default deny |

use std::sync::Arc;

use axum::{
  Json,
  extract::{Path, State},
};
use ladder_core::{
  access::{DashboardAccess, DashboardCapability, DashboardFlags},
  ids::{PersonId, RoleScope},
  store::HierarchyStore,
};
use serde::Serialize;

use crate::error::ApiError;

/// `GET /scopes/{scope}/managers/{manager}/access`
pub async fn get_access<S>(
  State(store): State<Arc<S>>,
  Path((scope, manager)): Path<(RoleScope, PersonId)>,
) -> Result<Json<DashboardAccess>, ApiError>
where
  S: HierarchyStore,
{
  let access = store
    .get_dashboard_access(manager, scope)
    .await
    .map_err(ApiError::store)?
    .ok_or_else(|| {
      ApiError::NotFound(format!(
        "no dashboard access for {manager} in scope {scope}"
      ))
    })?;
  Ok(Json(access))
}

/// `PUT /scopes/{scope}/managers/{manager}/access`
pub async fn put_access<S>(
  State(store): State<Arc<S>>,
  Path((scope, manager)): Path<(RoleScope, PersonId)>,
  Json(flags): Json<DashboardFlags>,
) -> Result<Json<DashboardAccess>, ApiError>
where
  S: HierarchyStore,
{
  let access = store
    .set_dashboard_access(manager, scope, flags)
    .await
    .map_err(ApiError::store)?;
  Ok(Json(access))
}

#[derive(Debug, Serialize)]
pub struct CanViewResponse {
  pub capability: DashboardCapability,
  pub allowed:    bool,
}

/// `GET /scopes/{scope}/managers/{manager}/can-view/{capability}`
pub async fn can_view<S>(
  State(store): State<Arc<S>>,
  Path((scope, manager, capability)): Path<(
    RoleScope,
    PersonId,
    DashboardCapability,
  )>,
) -> Result<Json<CanViewResponse>, ApiError>
where
  S: HierarchyStore,
{
  let allowed = store
    .can_view(manager, scope, capability)
    .await
    .map_err(ApiError::store)?;
  Ok(Json(CanViewResponse { capability, allowed }))
}
